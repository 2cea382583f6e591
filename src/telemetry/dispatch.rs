//! Worker-loop span helpers.
//!
//! Provides span creation and outcome recording for the dispatcher's
//! worker loop and the handler tasks it spawns.

use tracing::Span;
use uuid::Uuid;

/// Start a span covering one worker loop activation.
///
/// The `worker.processed` field is declared empty and filled in by
/// [`record_worker_idle`] when the loop hands control back.
pub fn start_worker_span(dispatcher: &str, dispatcher_id: &Uuid) -> Span {
    tracing::info_span!(
        "dispatch.worker",
        "dispatcher.name" = dispatcher,
        "dispatcher.id" = %dispatcher_id,
        "worker.processed" = tracing::field::Empty,
    )
}

/// Start a span for a spawned handler future.
pub fn start_handler_span(dispatcher: &str, sequence: u64) -> Span {
    tracing::debug_span!(
        "dispatch.handler",
        "dispatcher.name" = dispatcher,
        "handler.seq" = sequence,
    )
}

/// Record how many items the loop processed before going idle.
pub fn record_worker_idle(span: &Span, processed: u64) {
    span.record("worker.processed", processed);
    span.in_scope(|| {
        tracing::debug!(processed, "worker loop idle");
    });
}

/// Record a handler that resolved to an error.
pub fn record_handler_error(span: &Span, error: &str) {
    span.in_scope(|| {
        tracing::warn!(%error, "handler failed");
    });
}

/// Record a handler that panicked, either when called or while polled.
pub fn record_handler_panic(span: &Span, message: &str) {
    span.in_scope(|| {
        tracing::warn!(panic = message, "handler panicked");
    });
}
