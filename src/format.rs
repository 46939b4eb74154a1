//! Pixel formats, plane geometry and format capabilities.
//!
//! This module describes what a raw frame looks like in memory and what a
//! pad is willing to accept:
//!
//! - [`PixelFormat`]: a planar layout with a fixed plane count and
//!   per-plane subsampling table
//! - [`PlaneLayout`]: subsampling shifts and sample width of one plane
//! - [`VideoFormat`]: pixel format + geometry + frame rate of a stream
//! - [`FormatCaps`]: the set of pixel formats an input pad accepts
//!
//! ```rust
//! use planefilter::format::{FormatCaps, PixelFormat};
//!
//! // 4:2:0 planar, 4x2: 8 luma bytes + 2 + 2 chroma bytes
//! assert_eq!(PixelFormat::Yuv420p.frame_size(4, 2), 12);
//!
//! let caps = FormatCaps::from(vec![PixelFormat::Yuv420p, PixelFormat::Nv12]);
//! assert!(caps.accepts(PixelFormat::Nv12));
//! assert!(!caps.accepts(PixelFormat::Yuv444p));
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Pixel formats
// ============================================================================

/// Planar pixel formats.
///
/// Every variant fixes its plane count and the subsampling of each plane;
/// see [`PixelFormat::plane_layout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(u8)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (Y plane, then U plane, then V plane).
    /// Chroma planes are half width and half height.
    #[default]
    Yuv420p = 0,
    /// YUV 4:2:2 planar. Chroma planes are half width, full height.
    Yuv422p,
    /// YUV 4:4:4 planar. All planes at full resolution.
    Yuv444p,
    /// YUV 4:2:0 semi-planar (Y plane, then interleaved UV plane).
    Nv12,
    /// 8-bit grayscale, a single luma plane.
    Gray8,
}

/// Geometry of one plane relative to the frame.
///
/// A plane of a `W`x`H` frame is `(W >> shift_x) * components` bytes wide
/// and `H >> shift_y` rows tall.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneLayout {
    /// Horizontal subsampling as a right shift.
    pub shift_x: u8,
    /// Vertical subsampling as a right shift.
    pub shift_y: u8,
    /// Interleaved samples per subsampled pixel (2 for NV12's UV plane).
    pub components: u8,
}

impl PlaneLayout {
    const fn new(shift_x: u8, shift_y: u8, components: u8) -> Self {
        Self {
            shift_x,
            shift_y,
            components,
        }
    }

    /// Logical row length in bytes for a frame of the given width.
    #[inline]
    pub const fn row_bytes(&self, width: u32) -> usize {
        (width >> self.shift_x) as usize * self.components as usize
    }

    /// Number of rows for a frame of the given height.
    #[inline]
    pub const fn rows(&self, height: u32) -> usize {
        (height >> self.shift_y) as usize
    }
}

const FULL: PlaneLayout = PlaneLayout::new(0, 0, 1);

const HALF: PlaneLayout = PlaneLayout::new(1, 1, 1);
const HALF_WIDTH: PlaneLayout = PlaneLayout::new(1, 0, 1);

const YUV420P_PLANES: [PlaneLayout; 3] = [FULL, HALF, HALF];
const YUV422P_PLANES: [PlaneLayout; 3] = [FULL, HALF_WIDTH, HALF_WIDTH];
const YUV444P_PLANES: [PlaneLayout; 3] = [FULL, FULL, FULL];
const NV12_PLANES: [PlaneLayout; 2] = [FULL, PlaneLayout::new(1, 1, 2)];
const GRAY8_PLANES: [PlaneLayout; 1] = [FULL];

impl PixelFormat {
    /// All supported formats, in preference order.
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::Yuv420p,
        PixelFormat::Yuv422p,
        PixelFormat::Yuv444p,
        PixelFormat::Nv12,
        PixelFormat::Gray8,
    ];

    /// The subsampling table for this format, one entry per plane.
    pub const fn planes(&self) -> &'static [PlaneLayout] {
        match self {
            PixelFormat::Yuv420p => &YUV420P_PLANES,
            PixelFormat::Yuv422p => &YUV422P_PLANES,
            PixelFormat::Yuv444p => &YUV444P_PLANES,
            PixelFormat::Nv12 => &NV12_PLANES,
            PixelFormat::Gray8 => &GRAY8_PLANES,
        }
    }

    /// Number of planes.
    #[inline]
    pub const fn plane_count(&self) -> usize {
        self.planes().len()
    }

    /// Layout of plane `index`, if the format has that many planes.
    pub fn plane_layout(&self, index: usize) -> Option<PlaneLayout> {
        self.planes().get(index).copied()
    }

    /// Required (horizontal, vertical) multiple for frame dimensions.
    ///
    /// Subsampled planes need the luma dimensions to divide evenly, so
    /// 4:2:0 requires even width and height.
    pub fn alignment(&self) -> (u32, u32) {
        self.planes().iter().fold((1, 1), |(ax, ay), p| {
            (ax.max(1 << p.shift_x), ay.max(1 << p.shift_y))
        })
    }

    /// Byte size of plane `index` for a `width`x`height` frame.
    ///
    /// Returns 0 for a plane index the format does not have.
    pub fn plane_size(&self, index: usize, width: u32, height: u32) -> usize {
        self.plane_layout(index)
            .map(|p| p.row_bytes(width) * p.rows(height))
            .unwrap_or(0)
    }

    /// Total byte size of a tightly packed frame: the sum of all plane sizes.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        self.planes()
            .iter()
            .map(|p| p.row_bytes(width) * p.rows(height))
            .sum()
    }

    /// Lowercase name used in descriptors (e.g. `yuv420p`).
    pub const fn name(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Gray8 => "gray",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yuv420p" | "i420" => Ok(PixelFormat::Yuv420p),
            "yuv422p" | "i422" => Ok(PixelFormat::Yuv422p),
            "yuv444p" | "i444" => Ok(PixelFormat::Yuv444p),
            "nv12" => Ok(PixelFormat::Nv12),
            "gray" | "gray8" => Ok(PixelFormat::Gray8),
            other => Err(format!("unknown pixel format '{other}'")),
        }
    }
}

// ============================================================================
// Frame rate
// ============================================================================

/// Frame rate as numerator/denominator.
///
/// Using a fraction allows exact representation of common framerates
/// like 29.97 fps (30000/1001).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Framerate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (time units).
    pub den: u32,
}

impl Framerate {
    /// Create a new framerate.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 25 fps (PAL).
    pub const FPS_25: Self = Self::new(25, 1);
    /// 30 fps.
    pub const FPS_30: Self = Self::new(30, 1);
    /// 29.97 fps (NTSC).
    pub const FPS_29_97: Self = Self::new(30000, 1001);

    /// Presentation time of frame number `sequence`.
    ///
    /// Computed from the exact fraction so long streams do not drift.
    /// A zero numerator yields zero for every frame.
    pub fn timestamp(&self, sequence: u64) -> Duration {
        if self.num == 0 {
            return Duration::ZERO;
        }
        let nanos = sequence as u128 * self.den as u128 * 1_000_000_000 / self.num as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_25
    }
}

impl fmt::Display for Framerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

// ============================================================================
// Video format
// ============================================================================

/// Raw video format of a stream: geometry, pixel format and frame rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct VideoFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub pixel_format: PixelFormat,
    /// Frame rate.
    pub framerate: Framerate,
}

impl VideoFormat {
    /// Create a new video format.
    pub const fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        framerate: Framerate,
    ) -> Self {
        Self {
            width,
            height,
            pixel_format,
            framerate,
        }
    }

    /// Frame size in bytes in the external byte stream.
    pub fn frame_size(&self) -> usize {
        self.pixel_format.frame_size(self.width, self.height)
    }

    /// Same geometry and frame rate with a different pixel format.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// True if frames of `other` can be stored in frames of `self`
    /// (identical geometry and pixel format).
    pub fn same_layout(&self, other: &VideoFormat) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.pixel_format == other.pixel_format
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}",
            self.pixel_format, self.width, self.height, self.framerate
        )
    }
}

// ============================================================================
// FormatCaps - accepted format set for negotiation
// ============================================================================

/// The set of pixel formats a pad accepts.
///
/// An empty list given through `From<Vec<_>>` means any format.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum FormatCaps {
    /// Exactly one format.
    Fixed(PixelFormat),
    /// Any format in the list (ordered by preference, first is best).
    List(Vec<PixelFormat>),
    /// Any format accepted (unconstrained).
    #[default]
    Any,
}

impl FormatCaps {
    /// Check if a format is accepted.
    pub fn accepts(&self, format: PixelFormat) -> bool {
        match self {
            Self::Fixed(f) => *f == format,
            Self::List(list) => list.contains(&format),
            Self::Any => true,
        }
    }

    /// Parse a `|`-separated list of format names (e.g. `yuv420p|nv12`).
    pub fn parse_list(s: &str) -> std::result::Result<Self, String> {
        let formats = s
            .split('|')
            .map(|name| name.trim().parse::<PixelFormat>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::from(formats))
    }
}

impl From<PixelFormat> for FormatCaps {
    fn from(format: PixelFormat) -> Self {
        Self::Fixed(format)
    }
}

impl From<Vec<PixelFormat>> for FormatCaps {
    fn from(mut formats: Vec<PixelFormat>) -> Self {
        match formats.len() {
            0 => Self::Any,
            1 => Self::Fixed(formats.remove(0)),
            _ => Self::List(formats),
        }
    }
}

impl From<&[PixelFormat]> for FormatCaps {
    fn from(formats: &[PixelFormat]) -> Self {
        formats.to_vec().into()
    }
}

impl fmt::Display for FormatCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(format) => write!(f, "[{format}]"),
            Self::List(list) => {
                f.write_str("[")?;
                for (i, format) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{format}")?;
                }
                f.write_str("]")
            }
            Self::Any => f.write_str("any"),
        }
    }
}
