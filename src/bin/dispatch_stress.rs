//! dispatch-stress — hammer a dispatcher from many producer threads and
//! verify every item was invoked exactly once, one at a time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use clap::Parser;
use serde::Serialize;
use serial_dispatch::config::{CompletionMode, Config, DispatcherConfig};
use serial_dispatch::dispatcher::Dispatcher;
use serial_dispatch::telemetry::{TelemetryConfig, init_telemetry};
use tracing::info;

#[derive(Parser)]
#[command(name = "dispatch-stress", about = "Concurrency stress test for the sequential dispatcher")]
struct Cli {
    /// Number of concurrent producer threads
    #[arg(long, default_value_t = 8)]
    producers: usize,
    /// Items dispatched by each producer
    #[arg(long, default_value_t = 100)]
    items: usize,
    /// Completion mode (fire_and_forget | await_completion); overrides DISPATCHER_COMPLETION
    #[arg(long, value_parser = parse_completion)]
    completion: Option<CompletionMode>,
    /// Give up waiting for quiescence after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_completion(s: &str) -> Result<CompletionMode, String> {
    s.parse().map_err(|e: serial_dispatch::Error| e.to_string())
}

/// Shared instrumentation touched from inside every handler.
#[derive(Default)]
struct Tally {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<u64>>,
}

impl Tally {
    fn observe(&self, tag: u64) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(tag);
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn count(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
struct StressReport {
    dispatcher: String,
    completion: String,
    producers: usize,
    items_per_producer: usize,
    expected: usize,
    processed: usize,
    duplicates: usize,
    missing: usize,
    max_concurrent_invocations: usize,
    final_pending: usize,
    elapsed_ms: u128,
}

impl StressReport {
    fn passed(&self) -> bool {
        self.processed == self.expected
            && self.duplicates == 0
            && self.missing == 0
            && self.max_concurrent_invocations <= 1
            && self.final_pending == 0
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "dispatch-stress".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let mut dispatcher_config = config.dispatcher;
    if let Some(mode) = cli.completion {
        dispatcher_config.completion = mode;
    }

    let report = run(&cli, dispatcher_config).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.passed() {
        anyhow::bail!("stress run failed: {report:?}");
    }
    Ok(())
}

async fn run(cli: &Cli, config: DispatcherConfig) -> anyhow::Result<StressReport> {
    let dispatcher: Dispatcher<u64> = Dispatcher::with_config(config)?;
    let tally = Arc::new(Tally::default());
    let expected = cli.producers * cli.items;

    info!(
        dispatcher = dispatcher.name(),
        producers = cli.producers,
        items = cli.items,
        completion = %dispatcher.completion(),
        "starting stress run"
    );
    let started = Instant::now();

    let mut producers = Vec::with_capacity(cli.producers);
    for p in 0..cli.producers {
        let dispatcher = dispatcher.clone();
        let tally = Arc::clone(&tally);
        let items = cli.items;
        producers.push(tokio::task::spawn_blocking(move || {
            for i in 0..items {
                let tag = (p * items + i) as u64;
                let tally = Arc::clone(&tally);
                dispatcher.dispatch(tag, move |tag| {
                    tally.observe(tag);
                    std::future::ready(())
                });
            }
        }));
    }
    for producer in producers {
        producer.await.context("producer thread panicked")?;
    }

    let deadline = Duration::from_secs(cli.timeout_secs);
    tokio::time::timeout(deadline, async {
        while tally.count() < expected || dispatcher.is_working() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| {
        anyhow!(
            "no quiescence after {}s: {} of {expected} processed",
            cli.timeout_secs,
            tally.count()
        )
    })?;
    let elapsed_ms = started.elapsed().as_millis();

    let mut seen = tally
        .seen
        .lock()
        .map_err(|_| anyhow!("tally lock poisoned"))?
        .clone();
    let processed = seen.len();
    seen.sort_unstable();
    seen.dedup();
    let unique = seen.len();

    Ok(StressReport {
        dispatcher: dispatcher.name().to_string(),
        completion: dispatcher.completion().to_string(),
        producers: cli.producers,
        items_per_producer: cli.items,
        expected,
        processed,
        duplicates: processed - unique,
        missing: expected.saturating_sub(unique),
        max_concurrent_invocations: tally.max_in_flight.load(Ordering::Acquire),
        final_pending: dispatcher.dispatcher_count(),
        elapsed_ms,
    })
}

fn print_report(report: &StressReport) {
    println!("Dispatcher:   {} ({})", report.dispatcher, report.completion);
    println!(
        "Producers:    {} x {} items",
        report.producers, report.items_per_producer
    );
    println!("Processed:    {}/{}", report.processed, report.expected);
    println!("Duplicates:   {}", report.duplicates);
    println!("Missing:      {}", report.missing);
    println!("Max parallel: {}", report.max_concurrent_invocations);
    println!("Pending:      {}", report.final_pending);
    println!("Elapsed:      {}ms", report.elapsed_ms);
    println!(
        "Result:       {}",
        if report.passed() { "PASS" } else { "FAIL" }
    );
}
