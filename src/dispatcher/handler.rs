//! Queued work items and handler outcomes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// What a handler future resolves to, reduced to "failed, and why".
///
/// Implemented for `()` (never fails) and `Result<(), E>` for any
/// displayable `E`, so `anyhow::Result<()>` handlers work as-is.
pub trait HandlerOutcome: Send + 'static {
    fn into_failure(self) -> Option<String>;
}

impl HandlerOutcome for () {
    fn into_failure(self) -> Option<String> {
        None
    }
}

impl<E> HandlerOutcome for Result<(), E>
where
    E: fmt::Display + Send + 'static,
{
    fn into_failure(self) -> Option<String> {
        self.err().map(|e| e.to_string())
    }
}

pub(crate) type HandlerFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

type BoxedHandler<T> = Box<dyn FnOnce(T) -> HandlerFuture + Send>;

/// An item paired with the action that processes it. Owned by the queue
/// until the worker pops it, dropped right after invocation.
pub(crate) struct QueuedWorkItem<T> {
    item: T,
    handler: BoxedHandler<T>,
}

impl<T: Send + 'static> QueuedWorkItem<T> {
    pub(crate) fn new<F, Fut>(item: T, handler: F) -> Self
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandlerOutcome,
    {
        // The closure body runs when the worker invokes it; the returned
        // future's body only runs once polled.
        let handler: BoxedHandler<T> = Box::new(move |item: T| -> HandlerFuture {
            let fut = handler(item);
            Box::pin(async move { fut.await.into_failure() })
        });
        Self { item, handler }
    }

    /// Call the handler with the item, yielding its unpolled future.
    pub(crate) fn invoke(self) -> HandlerFuture {
        (self.handler)(self.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_outcome_never_fails() {
        assert_eq!(().into_failure(), None);
    }

    #[test]
    fn err_outcome_carries_message() {
        let outcome: Result<(), String> = Err("disk full".to_string());
        assert_eq!(outcome.into_failure().as_deref(), Some("disk full"));
        let ok: Result<(), String> = Ok(());
        assert_eq!(ok.into_failure(), None);
    }

    #[test]
    fn invoke_runs_handler_body_eagerly() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let seen = Arc::new(AtomicU32::new(0));
        let s = Arc::clone(&seen);
        let work = QueuedWorkItem::new(7u32, move |n| {
            s.store(n, Ordering::SeqCst);
            async {}
        });

        let _pending = work.invoke();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
