//! Planar frame buffers.
//!
//! A [`PlanarFrame`] owns one [`Plane`] per component of its
//! [`PixelFormat`]. Each plane has a logical row width (what appears in the
//! external byte stream) and a stride (how far apart rows are in memory),
//! which may be larger when the frame was allocated with an alignment.
//!
//! Frames are allocated once and then refilled in place with
//! [`PlanarFrame::fill_from`]; [`PlanarFrame::write_to`] is its exact inverse.
//!
//! ```rust
//! use planefilter::format::PixelFormat;
//! use planefilter::frame::PlanarFrame;
//!
//! let mut frame = PlanarFrame::allocate(4, 2, PixelFormat::Yuv420p).unwrap();
//! let bytes: Vec<u8> = (0..12).collect();
//! frame.fill_from(&bytes).unwrap();
//!
//! let mut out = Vec::new();
//! frame.write_to(&mut out).unwrap();
//! assert_eq!(out, bytes);
//! ```

use crate::error::{Error, Result};
use crate::format::{PixelFormat, VideoFormat};
use crate::io::ByteSink;
use crate::metadata::Metadata;
use smallvec::SmallVec;

/// One plane of a frame.
#[derive(Clone, Debug)]
pub struct Plane {
    data: Vec<u8>,
    /// Logical row length in bytes.
    width: usize,
    height: usize,
    stride: usize,
}

impl Plane {
    fn new(width: usize, height: usize, stride: usize) -> Self {
        debug_assert!(stride >= width);
        Self {
            data: vec![0; stride * height],
            width,
            height,
            stride,
        }
    }

    /// Logical row length in bytes.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Distance in bytes between the starts of consecutive rows.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Logical size in bytes (`width * height`, excluding stride padding).
    #[inline]
    pub fn size(&self) -> usize {
        self.width * self.height
    }

    /// Raw backing storage, including stride padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Row `y`, trimmed to the logical width.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Mutable row `y`, trimmed to the logical width.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Iterate rows top to bottom, each trimmed to the logical width.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let width = self.width;
        self.data
            .chunks_exact(self.stride)
            .map(move |row| &row[..width])
    }

    /// Iterate mutable rows top to bottom, each trimmed to the logical width.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        let width = self.width;
        self.data
            .chunks_exact_mut(self.stride)
            .map(move |row| &mut row[..width])
    }

    /// Copy `bytes` (exactly `size()` long) into the rows.
    fn copy_packed(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.size());
        let width = self.width;
        for (row, src) in self.rows_mut().zip(bytes.chunks_exact(width)) {
            row.copy_from_slice(src);
        }
    }

    fn copy_rows_from(&mut self, other: &Plane) {
        for (dst, src) in self.rows_mut().zip(other.rows()) {
            dst.copy_from_slice(src);
        }
    }
}

/// A raw video frame stored as separate planes.
///
/// Equality compares geometry, pixel format and the logical bytes of every
/// plane; stride padding and metadata are ignored.
#[derive(Clone, Debug)]
pub struct PlanarFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: SmallVec<[Plane; 3]>,
    metadata: Metadata,
}

impl PlanarFrame {
    /// Allocate a tightly packed frame (stride equals row width).
    ///
    /// Fails with [`Error::InvalidGeometry`] if either dimension is zero or
    /// not a multiple of the format's alignment (4:2:0 needs even sizes).
    pub fn allocate(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        Self::allocate_aligned(width, height, format, 1)
    }

    /// Allocate a frame whose plane strides are rounded up to `align` bytes.
    ///
    /// `align` must be a power of two.
    pub fn allocate_aligned(
        width: u32,
        height: u32,
        format: PixelFormat,
        align: usize,
    ) -> Result<Self> {
        validate_geometry(width, height, format)?;
        if !align.is_power_of_two() {
            return Err(Error::InvalidGeometry {
                width,
                height,
                format,
                reason: format!("stride alignment {align} is not a power of two"),
            });
        }

        let planes = format
            .planes()
            .iter()
            .map(|layout| {
                let row = layout.row_bytes(width);
                Plane::new(row, layout.rows(height), row.next_multiple_of(align))
            })
            .collect();

        Ok(Self {
            width,
            height,
            format,
            planes,
            metadata: Metadata::default(),
        })
    }

    /// Allocate a tightly packed frame for a stream format.
    pub fn for_format(format: &VideoFormat) -> Result<Self> {
        Self::allocate(format.width, format.height, format.pixel_format)
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// All planes in order.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Mutable access to all planes.
    pub fn planes_mut(&mut self) -> &mut [Plane] {
        &mut self.planes
    }

    /// Plane `index`, if present.
    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    /// Mutable plane `index`, if present.
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut Plane> {
        self.planes.get_mut(index)
    }

    /// Logical byte size of plane `index` (0 if absent).
    pub fn plane_size(&self, index: usize) -> usize {
        self.planes.get(index).map(Plane::size).unwrap_or(0)
    }

    /// Bytes this frame occupies in the external byte stream.
    pub fn total_bytes(&self) -> usize {
        self.planes.iter().map(Plane::size).sum()
    }

    /// Frame metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable frame metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// True if this frame has the geometry and pixel format of `format`.
    pub fn matches(&self, format: &VideoFormat) -> bool {
        self.width == format.width
            && self.height == format.height
            && self.format == format.pixel_format
    }

    /// Overwrite the planes from a packed byte sequence in plane order.
    ///
    /// Exactly [`total_bytes`](Self::total_bytes) bytes are consumed; extra
    /// bytes are ignored. Fails with [`Error::ShortRead`] if fewer are given,
    /// leaving the frame unchanged.
    pub fn fill_from(&mut self, bytes: &[u8]) -> Result<()> {
        let expected = self.total_bytes();
        if bytes.len() < expected {
            return Err(Error::ShortRead {
                expected,
                got: bytes.len(),
            });
        }

        let mut offset = 0;
        for plane in self.planes.iter_mut() {
            let size = plane.size();
            plane.copy_packed(&bytes[offset..offset + size]);
            offset += size;
        }
        Ok(())
    }

    /// Emit every plane row by row, in plane order, using the logical row
    /// width. Inverse of [`fill_from`](Self::fill_from).
    pub fn write_to<S: ByteSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        for plane in &self.planes {
            for row in plane.rows() {
                sink.write(row)?;
            }
        }
        Ok(())
    }

    /// The packed byte representation of this frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes());
        for plane in &self.planes {
            for row in plane.rows() {
                out.extend_from_slice(row);
            }
        }
        out
    }

    /// Overwrite this frame with the contents and metadata of `other`.
    ///
    /// Reuses the existing planes when the layout matches, otherwise the
    /// frame is reallocated to `other`'s layout.
    pub fn copy_from(&mut self, other: &PlanarFrame) {
        if self.width != other.width || self.height != other.height || self.format != other.format
        {
            *self = other.clone();
            return;
        }
        for (dst, src) in self.planes.iter_mut().zip(other.planes.iter()) {
            dst.copy_rows_from(src);
        }
        self.metadata = other.metadata;
    }
}

impl PartialEq for PlanarFrame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && self
                .planes
                .iter()
                .zip(other.planes.iter())
                .all(|(a, b)| a.rows().eq(b.rows()))
    }
}

impl Eq for PlanarFrame {}

/// Check that `width`x`height` is usable with `format`.
pub fn validate_geometry(width: u32, height: u32, format: PixelFormat) -> Result<()> {
    let invalid = |reason: String| Error::InvalidGeometry {
        width,
        height,
        format,
        reason,
    };

    if width == 0 || height == 0 {
        return Err(invalid("dimensions must be non-zero".to_string()));
    }
    let (align_x, align_y) = format.alignment();
    if width % align_x != 0 {
        return Err(invalid(format!("width must be a multiple of {align_x}")));
    }
    if height % align_y != 0 {
        return Err(invalid(format!("height must be a multiple of {align_y}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_allocate_yuv420p_sizes() {
        for (w, h) in [(2u32, 2u32), (4, 2), (480, 272), (64, 36)] {
            let frame = PlanarFrame::allocate(w, h, PixelFormat::Yuv420p).unwrap();
            assert_eq!(frame.planes().len(), 3);
            assert_eq!(
                frame.total_bytes(),
                (w * h + 2 * (w / 2) * (h / 2)) as usize
            );
            assert_eq!(frame.plane_size(0), (w * h) as usize);
            assert_eq!(frame.plane_size(1), ((w / 2) * (h / 2)) as usize);
        }
    }

    #[test]
    fn test_allocate_rejects_bad_geometry() {
        for (w, h) in [(0, 2), (4, 0), (3, 2), (4, 3)] {
            let err = PlanarFrame::allocate(w, h, PixelFormat::Yuv420p).unwrap_err();
            assert!(matches!(err, Error::InvalidGeometry { .. }), "{w}x{h}");
        }
        // Odd sizes are fine without subsampling
        assert!(PlanarFrame::allocate(3, 3, PixelFormat::Yuv444p).is_ok());
        assert!(PlanarFrame::allocate(3, 3, PixelFormat::Yuv422p).is_err());
        assert!(PlanarFrame::allocate(4, 3, PixelFormat::Yuv422p).is_ok());
    }

    #[test]
    fn test_allocate_aligned_strides() {
        let frame = PlanarFrame::allocate_aligned(6, 4, PixelFormat::Yuv420p, 16).unwrap();
        assert_eq!(frame.plane(0).unwrap().stride(), 16);
        assert_eq!(frame.plane(0).unwrap().width(), 6);
        assert_eq!(frame.plane(1).unwrap().stride(), 16);
        assert_eq!(frame.plane(1).unwrap().width(), 3);
        assert_eq!(frame.total_bytes(), 36);

        let err = PlanarFrame::allocate_aligned(6, 4, PixelFormat::Yuv420p, 12).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { .. }));
    }

    #[test]
    fn test_fill_write_round_trip_with_padding() {
        let bytes = ramp(PixelFormat::Yuv420p.frame_size(6, 4));
        let mut frame = PlanarFrame::allocate_aligned(6, 4, PixelFormat::Yuv420p, 32).unwrap();
        frame.fill_from(&bytes).unwrap();

        let mut out = Vec::new();
        frame.write_to(&mut out).unwrap();
        assert_eq!(out, bytes);
        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn test_fill_plane_order() {
        let bytes: Vec<u8> = (0..12).collect();
        let mut frame = PlanarFrame::allocate(4, 2, PixelFormat::Yuv420p).unwrap();
        frame.fill_from(&bytes).unwrap();

        assert_eq!(frame.plane(0).unwrap().row(0), &[0, 1, 2, 3]);
        assert_eq!(frame.plane(0).unwrap().row(1), &[4, 5, 6, 7]);
        assert_eq!(frame.plane(1).unwrap().row(0), &[8, 9]);
        assert_eq!(frame.plane(2).unwrap().row(0), &[10, 11]);
    }

    #[test]
    fn test_fill_short_read() {
        let mut frame = PlanarFrame::allocate(4, 2, PixelFormat::Yuv420p).unwrap();
        let err = frame.fill_from(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::ShortRead { expected: 12, got: 3 }));
        assert!(frame.to_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_ignores_trailing_bytes() {
        let mut frame = PlanarFrame::allocate(2, 2, PixelFormat::Gray8).unwrap();
        frame.fill_from(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.to_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_nv12_layout() {
        let bytes = ramp(PixelFormat::Nv12.frame_size(4, 4));
        let mut frame = PlanarFrame::allocate(4, 4, PixelFormat::Nv12).unwrap();
        frame.fill_from(&bytes).unwrap();

        assert_eq!(frame.planes().len(), 2);
        let uv = frame.plane(1).unwrap();
        assert_eq!(uv.width(), 4);
        assert_eq!(uv.height(), 2);
        assert_eq!(uv.row(0), &bytes[16..20]);
    }

    #[test]
    fn test_copy_from_reuses_or_reallocates() {
        let mut src = PlanarFrame::allocate(4, 2, PixelFormat::Yuv420p).unwrap();
        src.fill_from(&ramp(12)).unwrap();
        src.metadata_mut().sequence = 9;

        let mut dst = PlanarFrame::allocate_aligned(4, 2, PixelFormat::Yuv420p, 16).unwrap();
        dst.copy_from(&src);
        assert_eq!(dst, src);
        assert_eq!(dst.metadata().sequence, 9);
        assert_eq!(dst.plane(0).unwrap().stride(), 16);

        let mut other = PlanarFrame::allocate(2, 2, PixelFormat::Gray8).unwrap();
        other.copy_from(&src);
        assert_eq!(other, src);
        assert_eq!(other.format(), PixelFormat::Yuv420p);
    }

    #[test]
    fn test_equality_ignores_stride() {
        let bytes = ramp(12);
        let mut a = PlanarFrame::allocate(4, 2, PixelFormat::Yuv420p).unwrap();
        let mut b = PlanarFrame::allocate_aligned(4, 2, PixelFormat::Yuv420p, 64).unwrap();
        a.fill_from(&bytes).unwrap();
        b.fill_from(&bytes).unwrap();
        assert_eq!(a, b);

        b.plane_mut(2).unwrap().row_mut(0)[1] ^= 0xff;
        assert_ne!(a, b);
    }
}
