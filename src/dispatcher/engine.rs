//! The dispatcher: lock-free enqueue, CAS-gated worker start, drain loop.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::future::poll_fn;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::Poll;

use crossbeam::queue::SegQueue;
use crossbeam::utils::Backoff;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, trace, warn};
use uuid::Uuid;

use crate::config::{CompletionMode, DispatcherConfig};
use crate::error::Result;
use crate::telemetry::dispatch::{
    record_handler_error, record_handler_panic, record_worker_idle, start_handler_span,
    start_worker_span,
};
use crate::telemetry::metrics::DispatchMetrics;

use super::handler::{HandlerFuture, HandlerOutcome, QueuedWorkItem};
use super::state::RunningFlag;

/// Processes dispatched items one at a time, in enqueue order, on at most
/// one worker loop.
///
/// Cloning yields another handle to the same queue and worker; separately
/// constructed dispatchers share nothing.
pub struct Dispatcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    id: Uuid,
    config: DispatcherConfig,
    runtime: Handle,
    queue: SegQueue<QueuedWorkItem<T>>,
    running: RunningFlag,
    pending: AtomicUsize,
    sequence: AtomicU64,
    metrics: DispatchMetrics,
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Create a dispatcher with default settings on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`Error::NoRuntime`](crate::error::Error::NoRuntime) when called
    /// outside a runtime.
    pub fn new() -> Result<Self> {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Result<Self> {
        Ok(Self::with_runtime(Handle::try_current()?, config))
    }

    /// Create a dispatcher whose worker loops and handler tasks run on
    /// `runtime`.
    ///
    /// The dispatcher must not outlive the runtime. Once it has shut down,
    /// worker loops can no longer be started: the refusal is logged at
    /// `warn`, the flag drops back to idle, and dispatched items stay queued
    /// (counted by [`dispatcher_count`](Self::dispatcher_count)).
    pub fn with_runtime(runtime: Handle, config: DispatcherConfig) -> Self {
        let metrics = DispatchMetrics::new(&config.name);
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                runtime,
                queue: SegQueue::new(),
                running: RunningFlag::new(),
                pending: AtomicUsize::new(0),
                sequence: AtomicU64::new(0),
                metrics,
            }),
        }
    }

    /// Enqueue `item` for processing by `handler`.
    ///
    /// Never blocks and never fails. Starts a worker loop if none is active;
    /// otherwise the running loop picks the item up. Handler errors and
    /// panics are logged and counted, never returned here.
    ///
    /// After the push the running flag is moved to active under a fresh
    /// epoch. That compare-and-set starts from the flag read before the push
    /// and retries from whatever value beat it until its epoch bump lands,
    /// so a worker deciding to go idle concurrently always sees the change.
    /// Only the call that replaces an idle flag starts a loop.
    pub fn dispatch<F, Fut>(&self, item: T, handler: F)
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandlerOutcome,
    {
        let inner = &self.inner;
        let observed = inner.running.observe();

        inner.pending.fetch_add(1, Ordering::AcqRel);
        inner.queue.push(QueuedWorkItem::new(item, handler));
        inner.metrics.dispatched();

        if inner.running.activate(observed) {
            Inner::start_worker(Arc::clone(inner));
        }
    }
}

impl<T> Dispatcher<T> {
    /// Items dispatched but not yet invoked. Advisory: not synchronized
    /// with the queue contents.
    pub fn dispatcher_count(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Whether a worker loop is active right now.
    pub fn is_working(&self) -> bool {
        self.inner.running.is_active()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn completion(&self) -> CompletionMode {
        self.inner.config.completion
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name())
            .field("id", &self.inner.id)
            .field("completion", &self.inner.config.completion)
            .field("pending", &self.dispatcher_count())
            .field("working", &self.is_working())
            .finish()
    }
}

impl<T: Send + 'static> Inner<T> {
    fn start_worker(inner: Arc<Self>) {
        inner.metrics.worker_started();
        let span = start_worker_span(&inner.config.name, &inner.id);
        span.in_scope(|| debug!("worker loop started"));

        let runtime = inner.runtime.clone();
        let launch = WorkerLaunch {
            inner: Some(inner),
            span,
        };
        runtime.spawn_blocking(move || {
            let mut launch = launch;
            if let Some(inner) = launch.inner.take() {
                let processed = launch.span.in_scope(|| inner.run_worker());
                record_worker_idle(&launch.span, processed);
            }
        });
    }

    /// Drain the queue until it is observed empty with no dispatch racing
    /// the exit. The only place the flag returns to idle.
    fn run_worker(&self) -> u64 {
        let backoff = Backoff::new();
        let mut processed = 0;

        loop {
            // Observed before the pop: any push this pop can miss is
            // followed by an epoch bump that fails the release below.
            let token = self.running.observe();

            match self.queue.pop() {
                Some(work) => {
                    self.invoke(work);
                    processed += 1;
                    backoff.snooze();
                }
                None => {
                    if self.running.release(token) {
                        return processed;
                    }
                    trace!("dispatch raced idle exit, re-checking queue");
                }
            }
        }
    }

    fn invoke(&self, work: QueuedWorkItem<T>) {
        let _pending = PendingGuard(&self.pending);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let span = start_handler_span(&self.config.name, seq);
        self.metrics.invoked();

        // Call the handler and poll its future once, here on the worker, so
        // everything up to its first suspension runs in dispatch order.
        let started = span.in_scope(|| {
            trace!(seq, "invoking handler");
            panic::catch_unwind(AssertUnwindSafe(|| self.first_poll(work)))
        });
        let fut = match started {
            Ok(FirstPoll::Finished(None)) => return,
            Ok(FirstPoll::Finished(Some(error))) => {
                self.metrics.handler_failed("error");
                record_handler_error(&span, &error);
                return;
            }
            Ok(FirstPoll::Suspended(fut)) => fut,
            Err(payload) => {
                self.metrics.handler_failed("panic");
                record_handler_panic(&span, &panic_message(payload.as_ref()));
                return;
            }
        };

        let task = self.runtime.spawn(fut.instrument(span.clone()));
        let report = report_outcome(task, span, self.metrics.clone());
        match self.config.completion {
            CompletionMode::FireAndForget => {
                self.runtime.spawn(report);
            }
            CompletionMode::AwaitCompletion => self.runtime.block_on(report),
        }
    }

    fn first_poll(&self, work: QueuedWorkItem<T>) -> FirstPoll {
        let mut fut = work.invoke();
        let polled = self
            .runtime
            .block_on(poll_fn(|cx| Poll::Ready(fut.as_mut().poll(cx))));
        match polled {
            Poll::Ready(outcome) => FirstPoll::Finished(outcome),
            Poll::Pending => FirstPoll::Suspended(fut),
        }
    }
}

enum FirstPoll {
    Finished(Option<String>),
    Suspended(HandlerFuture),
}

/// Moved into the blocking-pool closure. If the runtime drops the closure
/// without running it, no loop owns the active flag, so hand it back.
struct WorkerLaunch<T> {
    inner: Option<Arc<Inner<T>>>,
    span: Span,
}

impl<T> Drop for WorkerLaunch<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.running.abandon();
            self.span.in_scope(|| {
                warn!(
                    queued = inner.queue.len(),
                    "runtime refused the worker loop, items stay queued"
                );
            });
        }
    }
}

/// Decrements the pending count when the invocation scope ends, however it
/// ends.
struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn report_outcome(task: JoinHandle<Option<String>>, span: Span, metrics: DispatchMetrics) {
    match task.await {
        Ok(None) => {}
        Ok(Some(error)) => {
            metrics.handler_failed("error");
            record_handler_error(&span, &error);
        }
        Err(e) if e.is_panic() => {
            metrics.handler_failed("panic");
            record_handler_panic(&span, &panic_message(e.into_panic().as_ref()));
        }
        Err(_) => span.in_scope(|| debug!("handler task cancelled")),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
