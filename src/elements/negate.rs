//! Per-pixel negation.

use crate::element::{Filter, FilterContext, Output};
use crate::error::{Error, Result};
use crate::frame::PlanarFrame;
use crate::pipeline::parser::FilterOptions;

/// Replace every sample `v` with `255 - v`.
///
/// The `planes` option is a bitmask selecting which planes are negated
/// (bit 0 is plane 0). By default every plane is negated.
#[derive(Debug, Clone)]
pub struct Negate {
    planes: u8,
}

impl Negate {
    /// Negate every plane.
    pub fn new() -> Self {
        Self { planes: 0xF }
    }

    /// Negate only the planes set in `mask`.
    pub fn with_planes(mask: u8) -> Self {
        Self { planes: mask }
    }

    /// Create from descriptor options.
    pub fn from_options(options: &FilterOptions) -> Result<Self> {
        options.ensure_known("negate", &["planes"])?;
        match options.get_u64("negate", "planes")? {
            None => Ok(Self::new()),
            Some(mask) if mask <= 0xF => Ok(Self::with_planes(mask as u8)),
            Some(mask) => Err(Error::InvalidOption {
                filter: "negate".to_string(),
                key: "planes".to_string(),
                reason: format!("mask {mask} selects planes beyond 3"),
            }),
        }
    }

    /// The plane mask.
    pub fn planes(&self) -> u8 {
        self.planes
    }
}

impl Default for Negate {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Negate {
    fn name(&self) -> &str {
        "negate"
    }

    fn process(&mut self, mut frame: PlanarFrame, _ctx: &mut FilterContext<'_>) -> Result<Output> {
        for (index, plane) in frame.planes_mut().iter_mut().enumerate() {
            if self.planes & (1 << index) == 0 {
                continue;
            }
            for row in plane.rows_mut() {
                row.iter_mut().for_each(|v| *v = 255 - *v);
            }
        }
        Ok(Output::single(frame))
    }
}
