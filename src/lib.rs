//! # serial-dispatch
//!
//! In-process sequential work dispatcher.
//!
//! Any number of producers submit items with an async handler; a single,
//! lazily-started worker loop invokes them one at a time in enqueue order.
//! Enqueue is lock-free; worker start is gated by a compare-and-set on an
//! instance-owned running flag.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod telemetry;

pub use config::{CompletionMode, DispatcherConfig};
pub use dispatcher::{Dispatcher, HandlerOutcome};
pub use error::{Error, Result};
