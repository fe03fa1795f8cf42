#![forbid(unsafe_code)]

//! Test fixtures and instrumentation for the fuselink workspace: probes for
//! ordering assertions, a channel-backed publication sink, and reference
//! owners exercising cross-hook validation and completion.

pub mod arith;
pub mod probe;
pub mod selection;
pub mod sink;

pub use arith::SumOwner;
pub use probe::{Counter, EventLog};
pub use selection::{selection_values, SelectionOwner};
pub use sink::ChannelSink;
