//! Integration tests for telemetry initialization and span helpers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serial_dispatch::config::DispatcherConfig;
use serial_dispatch::dispatcher::Dispatcher;
use serial_dispatch::telemetry::{TelemetryConfig, dispatch, init_telemetry, metrics};
use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; a second
    // init in the same binary returns Err, which is acceptable here.
    if let Ok(guard) = init_telemetry(TelemetryConfig::local("serial-dispatch-test")) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn worker_span_records_processed_count() {
    let id = Uuid::new_v4();
    let span = dispatch::start_worker_span("test-dispatcher", &id);
    dispatch::record_worker_idle(&span, 42);
}

#[test]
fn handler_span_records_failures() {
    let span = dispatch::start_handler_span("test-dispatcher", 7);
    dispatch::record_handler_error(&span, "connection refused");
    dispatch::record_handler_panic(&span, "index out of bounds");
}

#[test]
fn metric_instruments_build_against_noop_provider() {
    metrics::items_dispatched().add(1, &[]);
    metrics::items_invoked().add(1, &[]);
    metrics::worker_started().add(1, &[]);
    metrics::handler_failures().add(1, &[opentelemetry::KeyValue::new("kind", "error")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatcher_runs_under_an_installed_subscriber() {
    let _guard = init_telemetry(TelemetryConfig::local("serial-dispatch-test"));

    let dispatcher: Dispatcher<u32> =
        Dispatcher::with_config(DispatcherConfig::named("traced")).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for n in 0..3 {
        let seen = Arc::clone(&seen);
        dispatcher.dispatch(n, move |n| async move {
            seen.lock().unwrap().push(n);
            if n == 1 {
                return Err("odd one out");
            }
            Ok(())
        });
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while seen.lock().unwrap().len() < 3 || dispatcher.is_working() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(dispatcher.dispatcher_count(), 0);
}
