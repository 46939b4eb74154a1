//! Built-in filters.
//!
//! Every filter here is registered with the default
//! [`FilterFactory`](crate::pipeline::FilterFactory):
//!
//! | Name | Type | Behaviour |
//! |------|------|-----------|
//! | `null`, `identity` | [`Identity`] | pass-through with counters |
//! | `negate` | [`Negate`] | `255 - v` on selected planes |
//! | `format` | [`FormatFilter`] | restricts accepted input formats |
//! | `tblend` | [`TemporalBlend`] | mean of each batch of N frames |
//! | `delay` | [`Delay`] | FIFO lookahead of N frames |

mod delay;
mod format;
mod identity;
mod negate;
mod tblend;

pub use delay::Delay;
pub use format::FormatFilter;
pub use identity::{FrameCallback, Identity, IdentityCounters, IdentityStats};
pub use negate::Negate;
pub use tblend::TemporalBlend;
