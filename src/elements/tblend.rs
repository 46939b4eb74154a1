//! Temporal blend.

use crate::element::{Filter, FilterContext, Output};
use crate::error::{Error, Result};
use crate::frame::PlanarFrame;
use crate::pipeline::parser::FilterOptions;
use tracing::trace;

/// Default batch size.
const DEFAULT_FRAMES: usize = 2;

/// Upper bound on the batch storage reserved up front.
const MAX_PREALLOC: usize = 16;

/// Averages consecutive batches of frames.
///
/// Every `frames` inputs produce one output whose samples are the rounded
/// mean of the batch. The output carries the metadata of the oldest frame in
/// the batch. At end of stream a partial batch is averaged the same way.
#[derive(Debug)]
pub struct TemporalBlend {
    frames: usize,
    pending: Vec<PlanarFrame>,
    accumulator: Vec<u64>,
}

impl TemporalBlend {
    /// Blend batches of `frames` frames (at least one).
    pub fn new(frames: usize) -> Result<Self> {
        if frames == 0 {
            return Err(invalid_frames("batch size must be at least 1".to_string()));
        }
        Ok(Self {
            frames,
            pending: Vec::with_capacity(frames.min(MAX_PREALLOC)),
            accumulator: Vec::new(),
        })
    }

    /// Create from descriptor options.
    pub fn from_options(options: &FilterOptions) -> Result<Self> {
        options.ensure_known("tblend", &["frames"])?;
        let frames = options
            .get_u64("tblend", "frames")?
            .map_or(Ok(DEFAULT_FRAMES), |n| {
                usize::try_from(n).map_err(|e| invalid_frames(e.to_string()))
            })?;
        Self::new(frames)
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.frames
    }

    /// Frames waiting for the batch to fill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn blend(&mut self, ctx: &mut FilterContext<'_>) -> Result<PlanarFrame> {
        let count = self.pending.len() as u64;
        let mut out = ctx.acquire()?;
        if let Some(oldest) = self.pending.first() {
            *out.metadata_mut() = *oldest.metadata();
        }

        for (index, plane) in out.planes_mut().iter_mut().enumerate() {
            for (y, row) in plane.rows_mut().enumerate() {
                self.accumulator.clear();
                self.accumulator.resize(row.len(), 0);
                for frame in &self.pending {
                    let Some(src) = frame.plane(index) else {
                        continue;
                    };
                    for (acc, &v) in self.accumulator.iter_mut().zip(src.row(y)) {
                        *acc += u64::from(v);
                    }
                }
                for (dst, &sum) in row.iter_mut().zip(&self.accumulator) {
                    *dst = ((sum + count / 2) / count) as u8;
                }
            }
        }

        for frame in self.pending.drain(..) {
            ctx.release(frame);
        }
        trace!(node = ctx.name(), frames = count, "blended batch");
        Ok(out)
    }
}

fn invalid_frames(reason: String) -> Error {
    Error::InvalidOption {
        filter: "tblend".to_string(),
        key: "frames".to_string(),
        reason,
    }
}

impl Filter for TemporalBlend {
    fn name(&self) -> &str {
        "tblend"
    }

    fn process(&mut self, frame: PlanarFrame, ctx: &mut FilterContext<'_>) -> Result<Output> {
        self.pending.push(frame);
        if self.pending.len() < self.frames {
            return Ok(Output::None);
        }
        Ok(Output::single(self.blend(ctx)?))
    }

    fn flush(&mut self, ctx: &mut FilterContext<'_>) -> Result<Output> {
        if self.pending.is_empty() {
            return Ok(Output::None);
        }
        Ok(Output::single(self.blend(ctx)?))
    }
}
