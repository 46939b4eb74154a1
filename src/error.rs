//! Error types for planefilter.

use crate::element::NodeState;
use crate::format::PixelFormat;
use thiserror::Error;

/// Result type alias using planefilter's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for graph construction and streaming.
#[derive(Error, Debug)]
pub enum Error {
    /// Frame dimensions are zero or violate the format's alignment.
    #[error("invalid geometry {width}x{height} for {format}: {reason}")]
    InvalidGeometry {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
        /// Pixel format the geometry was checked against.
        format: PixelFormat,
        /// What was wrong with it.
        reason: String,
    },

    /// The filter-chain description could not be parsed.
    #[error("malformed descriptor at offset {offset}: {reason}")]
    MalformedDescriptor {
        /// Byte offset into the descriptor where parsing stopped.
        offset: usize,
        /// Parser diagnostic.
        reason: String,
    },

    /// Pads could not be linked, or the graph topology is incomplete.
    #[error("link error: {reason}")]
    LinkError {
        /// Description of the offending link.
        reason: String,
    },

    /// Format negotiation failed on a link.
    #[error("format mismatch at '{node}': expected {expected}, got {got}")]
    FormatMismatch {
        /// Node whose input rejected the format.
        node: String,
        /// Formats the node accepts.
        expected: String,
        /// Format offered by upstream.
        got: PixelFormat,
    },

    /// The graph has been closed (after a drain, a failure or `close()`).
    #[error("filter graph is closed")]
    GraphClosed,

    /// An operation was attempted in the wrong lifecycle state.
    #[error("cannot {operation} '{node}' in state {state:?}")]
    InvalidState {
        /// Node (or graph endpoint) that rejected the call.
        node: String,
        /// State it was in.
        state: NodeState,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// The byte source ran dry before the requested amount was read.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Bytes requested.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// The byte stream ended in the middle of a frame.
    #[error("truncated frame {frame}: expected {expected} bytes, got {got}")]
    TruncatedFrame {
        /// Zero-based index of the incomplete frame.
        frame: u64,
        /// Bytes in a complete frame.
        expected: usize,
        /// Bytes that were read.
        got: usize,
    },

    /// No filter is registered under this name.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// A filter rejected one of its options.
    #[error("invalid option '{key}' for '{filter}': {reason}")]
    InvalidOption {
        /// Filter kind name.
        filter: String,
        /// Offending option key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// I/O error from a byte source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error is a clean end of stream, i.e. a short
    /// read that happened before the first byte of a frame.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::ShortRead { got: 0, .. })
    }

    pub(crate) fn link(reason: impl Into<String>) -> Self {
        Error::LinkError {
            reason: reason.into(),
        }
    }
}
