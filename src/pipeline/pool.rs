//! Graph-level frame pool.
//!
//! Frames travelling through the graph are taken from this pool and given
//! back once they have been copied out at the sink, so steady-state
//! streaming reuses the same few plane buffers instead of allocating one
//! frame per push.
//!
//! The pool is single-threaded and owned by the graph; a frame that is never
//! released is simply dropped and its memory freed.

use crate::error::Result;
use crate::format::VideoFormat;
use crate::frame::PlanarFrame;
use crate::metadata::Metadata;

/// Default number of idle frames kept for reuse.
const DEFAULT_MAX_IDLE: usize = 8;

/// Statistics about pool usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Frames that had to be freshly allocated.
    pub allocations: u64,
    /// Acquisitions served from an idle frame.
    pub reuses: u64,
    /// Frames currently idle in the pool.
    pub idle: usize,
}

/// A recycling pool of [`PlanarFrame`]s keyed by layout.
#[derive(Debug)]
pub struct FramePool {
    idle: Vec<PlanarFrame>,
    max_idle: usize,
    allocations: u64,
    reuses: u64,
}

impl FramePool {
    /// Create a pool keeping up to 8 idle frames.
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Create a pool keeping up to `max_idle` idle frames.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            idle: Vec::with_capacity(max_idle),
            max_idle,
            allocations: 0,
            reuses: 0,
        }
    }

    /// Get a frame laid out for `format`.
    ///
    /// An idle frame with matching geometry is reused (contents are stale,
    /// metadata is reset); otherwise a new frame is allocated.
    pub fn acquire(&mut self, format: &VideoFormat) -> Result<PlanarFrame> {
        if let Some(pos) = self.idle.iter().position(|f| f.matches(format)) {
            self.reuses += 1;
            let mut frame = self.idle.swap_remove(pos);
            *frame.metadata_mut() = Metadata::default();
            return Ok(frame);
        }

        self.allocations += 1;
        PlanarFrame::for_format(format)
    }

    /// Return a frame for later reuse. Dropped if the pool is full.
    pub fn release(&mut self, frame: PlanarFrame) {
        if self.idle.len() < self.max_idle {
            self.idle.push(frame);
        }
    }

    /// Number of idle frames.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Drop all idle frames.
    pub fn clear(&mut self) {
        self.idle.clear();
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations,
            reuses: self.reuses,
            idle: self.idle.len(),
        }
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}
