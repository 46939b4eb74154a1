//! Filter runtime context.
//!
//! The context gives a filter access to services owned by the graph while
//! it processes a frame: its node name, the negotiated formats, and the
//! frame pool for allocating output frames.

use crate::error::Result;
use crate::format::VideoFormat;
use crate::frame::PlanarFrame;
use crate::pipeline::FramePool;

/// Runtime context passed to [`Filter`](crate::element::Filter) calls.
pub struct FilterContext<'a> {
    name: &'a str,
    input: VideoFormat,
    output: VideoFormat,
    pool: &'a mut FramePool,
}

impl<'a> FilterContext<'a> {
    /// Create a new filter context.
    pub fn new(
        name: &'a str,
        input: VideoFormat,
        output: VideoFormat,
        pool: &'a mut FramePool,
    ) -> Self {
        Self {
            name,
            input,
            output,
            pool,
        }
    }

    /// Get the node's name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Negotiated input format.
    pub fn input_format(&self) -> &VideoFormat {
        &self.input
    }

    /// Negotiated output format.
    pub fn output_format(&self) -> &VideoFormat {
        &self.output
    }

    /// Get a frame laid out in the output format. Contents are unspecified.
    pub fn acquire(&mut self) -> Result<PlanarFrame> {
        self.pool.acquire(&self.output)
    }

    /// Give a frame the filter no longer needs back to the pool.
    pub fn release(&mut self, frame: PlanarFrame) {
        self.pool.release(frame);
    }
}

impl std::fmt::Debug for FilterContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("idle_frames", &self.pool.idle())
            .finish()
    }
}
