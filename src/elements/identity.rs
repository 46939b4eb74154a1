//! Identity filter with counters for debugging.
//!
//! A pass-through filter that allows inspection of frames via callbacks.
//! Registered as both `identity` and `null`.

use crate::element::{Filter, FilterContext, Output};
use crate::error::Result;
use crate::frame::PlanarFrame;
use crate::pipeline::parser::FilterOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback type for frame inspection.
pub type FrameCallback = Box<dyn Fn(&PlanarFrame) + Send + Sync>;

/// A filter that passes frames through unchanged while counting them and
/// optionally calling a callback for inspection.
///
/// The counters are shared, so a [`IdentityCounters`] handle taken before
/// the filter is boxed into a graph keeps observing it.
///
/// # Example
///
/// ```rust
/// use planefilter::elements::Identity;
///
/// let identity = Identity::new().on_frame(|frame| {
///     println!("frame seq={}", frame.metadata().sequence);
/// });
/// let counters = identity.counters();
/// assert_eq!(counters.stats().frame_count, 0);
/// ```
pub struct Identity {
    name: String,
    callback: Option<Arc<FrameCallback>>,
    counters: IdentityCounters,
}

impl Identity {
    /// Create a new identity filter.
    pub fn new() -> Self {
        Self {
            name: "identity".to_string(),
            callback: None,
            counters: IdentityCounters::default(),
        }
    }

    /// Create from descriptor options. Identity takes none.
    pub fn from_options(options: &FilterOptions) -> Result<Self> {
        options.ensure_known("identity", &[])?;
        Ok(Self::new())
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set a callback to be called for each frame.
    pub fn on_frame<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PlanarFrame) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Get a shared handle to the counters.
    pub fn counters(&self) -> IdentityCounters {
        self.counters.clone()
    }

    /// Get statistics.
    pub fn stats(&self) -> IdentityStats {
        self.counters.stats()
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Identity {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, frame: PlanarFrame, _ctx: &mut FilterContext<'_>) -> Result<Output> {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(frame.total_bytes() as u64, Ordering::Relaxed);

        if let Some(ref cb) = self.callback {
            cb(&frame);
        }

        Ok(Output::single(frame))
    }
}

/// Shared frame/byte counters of an [`Identity`] filter.
#[derive(Debug, Clone, Default)]
pub struct IdentityCounters {
    frames: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
}

impl IdentityCounters {
    /// Get statistics.
    pub fn stats(&self) -> IdentityStats {
        IdentityStats {
            frame_count: self.frames.load(Ordering::Relaxed),
            byte_count: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Reset statistics.
    pub fn reset(&self) {
        self.frames.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}

/// Statistics for the Identity filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityStats {
    /// Number of frames processed.
    pub frame_count: u64,
    /// Total plane bytes processed.
    pub byte_count: u64,
}
