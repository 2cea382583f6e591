//! Metric instruments for serial-dispatch.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider the global meter is a no-op, so dispatchers can
//! always record.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for serial-dispatch instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("serial-dispatch")
}

/// Counter: items accepted by `dispatch`.
/// Labels: `dispatcher`.
pub fn items_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.items.dispatched")
        .with_description("Number of items enqueued")
        .build()
}

/// Counter: handlers invoked by a worker loop.
/// Labels: `dispatcher`.
pub fn items_invoked() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.items.invoked")
        .with_description("Number of handlers invoked")
        .build()
}

/// Counter: worker loops started (idle -> active transitions).
/// Labels: `dispatcher`.
pub fn worker_started() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.worker.started")
        .with_description("Number of worker loops started")
        .build()
}

/// Counter: handlers that returned an error or panicked.
/// Labels: `dispatcher`, `kind` ("error" | "panic").
pub fn handler_failures() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.handler.failures")
        .with_description("Number of failed handler invocations")
        .build()
}

/// Instruments bound to one dispatcher instance.
#[derive(Clone)]
pub(crate) struct DispatchMetrics {
    label: KeyValue,
    dispatched: Counter<u64>,
    invoked: Counter<u64>,
    started: Counter<u64>,
    failures: Counter<u64>,
}

impl DispatchMetrics {
    pub(crate) fn new(dispatcher: &str) -> Self {
        Self {
            label: KeyValue::new("dispatcher", dispatcher.to_string()),
            dispatched: items_dispatched(),
            invoked: items_invoked(),
            started: worker_started(),
            failures: handler_failures(),
        }
    }

    pub(crate) fn dispatched(&self) {
        self.dispatched.add(1, std::slice::from_ref(&self.label));
    }

    pub(crate) fn invoked(&self) {
        self.invoked.add(1, std::slice::from_ref(&self.label));
    }

    pub(crate) fn worker_started(&self) {
        self.started.add(1, std::slice::from_ref(&self.label));
    }

    pub(crate) fn handler_failed(&self, kind: &'static str) {
        self.failures
            .add(1, &[self.label.clone(), KeyValue::new("kind", kind)]);
    }
}
