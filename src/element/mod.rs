//! Filter system for planefilter graphs.
//!
//! This module defines the core traits and types for graph nodes:
//!
//! - [`Filter`]: a processing stage (pass-through, buffering, or converting)
//! - [`Output`]: zero, one or many frames produced by one call
//! - [`FilterContext`]: graph services available while processing
//! - [`Pad`]: a typed, directional connection point on a node
//!
//! # Design
//!
//! Filters are synchronous and single-threaded. A push into the graph runs
//! every filter on the path to the sink to completion before returning, so
//! filters never need interior locking.
//!
//! ```rust,ignore
//! use planefilter::element::{Filter, FilterContext, Output};
//!
//! struct Passthrough;
//!
//! impl Filter for Passthrough {
//!     fn name(&self) -> &str { "passthrough" }
//!
//!     fn process(&mut self, frame: PlanarFrame, _ctx: &mut FilterContext<'_>) -> Result<Output> {
//!         Ok(Output::single(frame))
//!     }
//! }
//! ```

mod context;
mod pad;
mod traits;

pub use context::FilterContext;
pub use pad::{Pad, PadDirection, PadRef};
pub use traits::{Filter, FilterKind, NodeState, Output};
