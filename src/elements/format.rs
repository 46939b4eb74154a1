//! Pixel format constraint.

use crate::element::{Filter, FilterContext, Output};
use crate::error::{Error, Result};
use crate::format::{FormatCaps, PixelFormat};
use crate::frame::PlanarFrame;
use crate::pipeline::parser::FilterOptions;

/// Pass-through filter that restricts the formats allowed on its input.
///
/// `format=pix_fmts=yuv420p|nv12` fails negotiation unless the upstream
/// format is one of the listed ones. No conversion is performed.
#[derive(Debug, Clone)]
pub struct FormatFilter {
    caps: FormatCaps,
}

impl FormatFilter {
    /// Accept only the given formats.
    pub fn new(formats: impl Into<FormatCaps>) -> Self {
        Self {
            caps: formats.into(),
        }
    }

    /// Create from descriptor options. `pix_fmts` is required.
    pub fn from_options(options: &FilterOptions) -> Result<Self> {
        options.ensure_known("format", &["pix_fmts"])?;
        let invalid = |reason: String| Error::InvalidOption {
            filter: "format".to_string(),
            key: "pix_fmts".to_string(),
            reason,
        };

        let raw = options
            .get("pix_fmts")
            .ok_or_else(|| invalid("required option is missing".to_string()))?;
        let caps = FormatCaps::parse_list(raw).map_err(invalid)?;
        Ok(Self { caps })
    }

    /// Accepted formats.
    pub fn caps(&self) -> &FormatCaps {
        &self.caps
    }
}

impl From<PixelFormat> for FormatFilter {
    fn from(format: PixelFormat) -> Self {
        Self::new(format)
    }
}

impl Filter for FormatFilter {
    fn name(&self) -> &str {
        "format"
    }

    fn process(&mut self, frame: PlanarFrame, _ctx: &mut FilterContext<'_>) -> Result<Output> {
        Ok(Output::single(frame))
    }

    fn input_caps(&self) -> FormatCaps {
        self.caps.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pix_fmts: &str) -> FilterOptions {
        let mut options = FilterOptions::new();
        options.insert("pix_fmts", pix_fmts);
        options
    }

    #[test]
    fn test_format_from_options() {
        let filter = FormatFilter::from_options(&options("yuv420p|nv12")).unwrap();
        assert!(filter.input_caps().accepts(PixelFormat::Nv12));
        assert!(filter.input_caps().accepts(PixelFormat::Yuv420p));
        assert!(!filter.input_caps().accepts(PixelFormat::Yuv444p));
    }

    #[test]
    fn test_format_requires_pix_fmts() {
        let err = FormatFilter::from_options(&FilterOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { ref key, .. } if key == "pix_fmts"));
    }

    #[test]
    fn test_format_rejects_unknown_format() {
        assert!(FormatFilter::from_options(&options("yuv420p|rgb24")).is_err());
    }
}
