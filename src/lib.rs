//! # planefilter
//!
//! A streaming planar-video filter pipeline.
//!
//! planefilter parses a textual filter chain into an owned graph of filter
//! nodes, streams raw planar frames (yuv420p and friends) through it one at
//! a time, and manages the plane buffers and chroma-subsampled geometry
//! along the way.
//!
//! ## Features
//!
//! - **Descriptor parsing**: `negate=planes=1,delay=frames=2` style chains
//! - **Typed pads**: links are handle pairs, validated for direction,
//!   duplicates and cycles
//! - **Format negotiation**: every input pad states which pixel formats it
//!   accepts; mismatches are reported with the node name
//! - **Buffer reuse**: frames come from a recycling pool, and the driver's
//!   in/out frames are refilled in place
//! - **Lookahead filters**: nodes may buffer frames and release them at
//!   end of stream through a lazy flush
//!
//! ## Quick Start
//!
//! ```rust
//! use planefilter::prelude::*;
//!
//! let config = DriverConfig::new(4, 2).with_descriptor("identity");
//! let mut driver = StreamingDriver::new(config)?;
//!
//! let input: Vec<u8> = (0..36).collect();
//! let mut output = Vec::new();
//! let result = driver.run(&mut input.as_slice(), &mut output)?;
//!
//! assert_eq!(result.frames_processed, 3);
//! assert_eq!(output, input);
//! # Ok::<(), planefilter::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod element;
pub mod elements;
pub mod error;
pub mod format;
pub mod frame;
pub mod io;
pub mod metadata;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::element::{Filter, FilterContext, NodeState, Output, PadRef};
    pub use crate::error::{Error, Result};
    pub use crate::format::{FormatCaps, Framerate, PixelFormat, VideoFormat};
    pub use crate::frame::PlanarFrame;
    pub use crate::io::{ByteSink, ByteSource, ReadSource, WriteSink};
    pub use crate::metadata::Metadata;
    pub use crate::pipeline::{
        DriverConfig, FilterFactory, FilterGraph, PipelineResult, StreamingDriver,
    };
}

pub use error::{Error, Result};
