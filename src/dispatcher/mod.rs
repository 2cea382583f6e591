//! Sequential work dispatch.
//!
//! Producers hand a [`Dispatcher`] an item plus the async action that
//! processes it. Items are invoked one at a time, in the order they were
//! enqueued, by a single lazily-started worker loop on the tokio blocking
//! pool. No locks are taken on the hot path.
//!
//! ```no_run
//! use serial_dispatch::dispatcher::Dispatcher;
//!
//! # #[tokio::main]
//! # async fn main() -> serial_dispatch::error::Result<()> {
//! let dispatcher = Dispatcher::new()?;
//! dispatcher.dispatch("hello".to_string(), |msg| async move {
//!     tracing::info!(%msg, "processed");
//! });
//! # Ok(())
//! # }
//! ```

mod engine;
mod handler;
mod state;

pub use engine::Dispatcher;
pub use handler::HandlerOutcome;
