//! Core filter traits.

use crate::element::FilterContext;
use crate::error::Result;
use crate::format::{FormatCaps, VideoFormat};
use crate::frame::PlanarFrame;

// ============================================================================
// Output Type
// ============================================================================

/// Output of filter processing.
///
/// - `None`: no output yet (the frame was buffered or dropped)
/// - `Single`: one output frame (pass-through arity)
/// - `Multiple`: several output frames, in delivery order
#[derive(Debug, Default)]
pub enum Output {
    /// No output.
    #[default]
    None,
    /// Single output frame.
    Single(PlanarFrame),
    /// Multiple output frames.
    Multiple(Vec<PlanarFrame>),
}

impl Output {
    /// Create a single frame output.
    #[inline]
    pub fn single(frame: PlanarFrame) -> Self {
        Self::Single(frame)
    }

    /// Create an empty output.
    #[inline]
    pub fn none() -> Self {
        Self::None
    }

    /// Get the number of output frames.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Multiple(v) => v.len(),
        }
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to a Vec of frames.
    pub fn into_vec(self) -> Vec<PlanarFrame> {
        match self {
            Self::None => vec![],
            Self::Single(f) => vec![f],
            Self::Multiple(v) => v,
        }
    }
}

impl From<PlanarFrame> for Output {
    #[inline]
    fn from(frame: PlanarFrame) -> Self {
        Self::Single(frame)
    }
}

impl From<Option<PlanarFrame>> for Output {
    fn from(opt: Option<PlanarFrame>) -> Self {
        match opt {
            Some(f) => Self::Single(f),
            None => Self::None,
        }
    }
}

impl From<Vec<PlanarFrame>> for Output {
    fn from(mut v: Vec<PlanarFrame>) -> Self {
        match v.len() {
            0 => Self::None,
            1 => Self::Single(v.remove(0)),
            _ => Self::Multiple(v),
        }
    }
}

impl IntoIterator for Output {
    type Item = PlanarFrame;
    type IntoIter = std::vec::IntoIter<PlanarFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

// ============================================================================
// Filter Trait
// ============================================================================

/// A processing stage in a filter graph.
///
/// Filters are synchronous: [`process`](Filter::process) runs to completion
/// for one frame and returns whatever output is ready. A filter that needs
/// lookahead keeps frames internally, returns [`Output::None`], and gives
/// them back from [`flush`](Filter::flush) at end of stream.
///
/// Configuration arrives as string options when the filter is constructed
/// (see [`FilterFactory`](crate::pipeline::FilterFactory)); each filter
/// interprets its own keys.
///
/// # Example
///
/// ```rust
/// use planefilter::element::{Filter, FilterContext, Output};
/// use planefilter::frame::PlanarFrame;
/// use planefilter::Result;
///
/// struct Brighten;
///
/// impl Filter for Brighten {
///     fn name(&self) -> &str {
///         "brighten"
///     }
///
///     fn process(&mut self, mut frame: PlanarFrame, _ctx: &mut FilterContext<'_>) -> Result<Output> {
///         if let Some(luma) = frame.plane_mut(0) {
///             for row in luma.rows_mut() {
///                 row.iter_mut().for_each(|v| *v = v.saturating_add(16));
///             }
///         }
///         Ok(Output::single(frame))
///     }
/// }
/// ```
pub trait Filter: Send {
    /// Filter kind name (for logging and diagnostics).
    fn name(&self) -> &str;

    /// Process one input frame.
    fn process(&mut self, frame: PlanarFrame, ctx: &mut FilterContext<'_>) -> Result<Output>;

    /// Drain any frames held back at end of stream.
    fn flush(&mut self, _ctx: &mut FilterContext<'_>) -> Result<Output> {
        Ok(Output::None)
    }

    /// Number of input pads.
    fn input_count(&self) -> usize {
        1
    }

    /// Number of output pads.
    fn output_count(&self) -> usize {
        1
    }

    /// Formats accepted on the input pads.
    fn input_caps(&self) -> FormatCaps {
        FormatCaps::Any
    }

    /// Decide the output format given the negotiated input format.
    ///
    /// The default inherits the upstream format unchanged.
    fn negotiate(&mut self, input: &VideoFormat) -> Result<VideoFormat> {
        Ok(*input)
    }
}

/// The role of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// The buffer source (injection point for raw frames).
    Source,
    /// The buffer sink (extraction point for filtered frames).
    Sink,
    /// A processing filter.
    Filter,
}

/// Lifecycle state of a node.
///
/// States only move forward, except that any state may jump to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum NodeState {
    /// Created, pads not all linked yet.
    #[default]
    Unconfigured,
    /// Every pad the node needs is linked.
    Linked,
    /// Formats on all links are fixed.
    Negotiated,
    /// Frames have been pushed.
    Streaming,
    /// End of input has been signalled; buffered frames are draining.
    Flushing,
    /// No further traffic is accepted.
    Closed,
}

impl NodeState {
    /// True once negotiation has completed and before the node closes.
    pub fn accepts_traffic(&self) -> bool {
        matches!(
            self,
            NodeState::Negotiated | NodeState::Streaming | NodeState::Flushing
        )
    }
}
