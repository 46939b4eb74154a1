//! Frame metadata types.

use std::time::Duration;

/// Metadata carried alongside a frame through the graph.
///
/// The graph stamps every frame entering at the buffer source; filters that
/// emit a frame built from several inputs keep the oldest input's metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Presentation timestamp derived from the source frame rate.
    pub pts: Option<Duration>,

    /// Monotonic sequence number assigned at the buffer source.
    pub sequence: u64,
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn with_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }
}
