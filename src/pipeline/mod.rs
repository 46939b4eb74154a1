//! Filter graph construction and streaming.
//!
//! This module provides the core pipeline infrastructure:
//!
//! - [`parse_descriptor`]: turns a textual filter chain into [`FilterSpec`]s
//! - [`FilterFactory`]: maps filter names to constructors
//! - [`FilterGraph`]: owns the nodes, links pads, negotiates formats and
//!   runs frames from the buffer source to the buffer sink
//! - [`StreamingDriver`]: reads raw frames from a byte source, runs them
//!   through a graph and writes the results to a byte sink
//!
//! # Example
//!
//! ```rust
//! use planefilter::element::PadRef;
//! use planefilter::format::{Framerate, PixelFormat};
//! use planefilter::frame::PlanarFrame;
//! use planefilter::pipeline::FilterGraph;
//!
//! let mut graph = FilterGraph::new();
//! let src = graph.create_source(PixelFormat::Yuv420p, 4, 2, Framerate::FPS_25)?;
//! let sink = graph.create_sink(PixelFormat::Yuv420p)?;
//! graph.parse_and_link("delay=frames=1", PadRef::output(src, 0), PadRef::input(sink, 0))?;
//! graph.configure()?;
//!
//! let frame = PlanarFrame::allocate(4, 2, PixelFormat::Yuv420p)?;
//! graph.push(&frame)?;
//! assert!(graph.pull()?.is_none());
//!
//! let drained: Vec<_> = graph.flush()?.collect::<planefilter::Result<_>>()?;
//! assert_eq!(drained.len(), 1);
//! # Ok::<(), planefilter::Error>(())
//! ```

mod driver;
pub mod factory;
mod graph;
pub mod parser;
mod pool;

pub use driver::{DriverConfig, PipelineResult, StreamingDriver};
pub use factory::{FilterConstructor, FilterFactory};
pub use graph::{FilterGraph, Flush, Link, Node, NodeId, SINK_NAME, SOURCE_NAME};
pub use parser::{FilterOptions, FilterSpec, parse_descriptor};
pub use pool::{FramePool, PoolStats};
