use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::Args;
use ferry_stage::{BatchOptions, BatchStage, StageError, StatsSnapshot, WorkerPool};
use log::{debug, error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use crate::{commands::SettingsArgs, event::Event, printer::BatchPrinter};

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Total events to produce, split across producers
    #[arg(long, default_value_t = 100)]
    pub items: u64,

    /// Producer threads posting events concurrently
    #[arg(long, default_value_t = 4)]
    pub producers: usize,

    /// Milliseconds the downstream printer sleeps per batch
    #[arg(long, default_value_t = 0)]
    pub delivery_delay_ms: u64,

    /// How long stopping may spend flushing buffered batches
    #[arg(long, default_value_t = 5000)]
    pub stop_timeout_ms: u64,
}

pub fn run(args: RunArgs) -> ExitCode {
    match execute(args) {
        Ok(code) => code,
        Err(e) => {
            error!("[error] {e:#}");
            eprintln!("[run] {e:#}");
            ExitCode::from(2)
        }
    }
}

fn execute(args: RunArgs) -> Result<ExitCode> {
    if args.producers == 0 {
        bail!("--producers must be at least 1");
    }

    let settings = args.settings.resolve()?;
    debug!("Effective settings: {settings:?}");

    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        flag::register(sig, Arc::clone(&shutdown))
            .with_context(|| format!("Failed to register handler for signal {sig}"))?;
    }

    let pool = Arc::new(
        WorkerPool::new("ferry-dispatch", settings.workers, settings.queue_capacity)
            .context("Failed to start dispatch workers")?,
    );
    let options = BatchOptions::from_settings(&settings, pool.clone());
    let printer = BatchPrinter::stdout(Duration::from_millis(args.delivery_delay_ms));
    let stage = BatchStage::new(options, printer).context("Invalid batching settings")?;
    debug!("Stage options: {:?}", stage.options());

    info!(
        "Producing {} events from {} producers",
        args.items, args.producers
    );

    let started = Instant::now();
    let refused = AtomicUsize::new(0);
    thread::scope(|scope| {
        for producer in 0..args.producers {
            let stage = &stage;
            let shutdown = &shutdown;
            let refused = &refused;
            let count = share(args.items, args.producers, producer);
            scope.spawn(move || produce(stage, producer, count, shutdown, refused));
        }
    });

    if shutdown.load(Ordering::Relaxed) {
        warn!("Interrupted; stopping producers early");
    }

    let drained = stage.stop(Duration::from_millis(args.stop_timeout_ms));
    let counters = stage.shared_stats();

    // Dropping the stage closes any batch left open so the workers can run
    // out; deliveries still queued finish before shutdown returns.
    drop(stage);
    pool.shutdown();

    let stats = counters.snapshot();
    print_summary(&stats, started.elapsed(), refused.load(Ordering::Relaxed));

    if !drained {
        eprintln!("[run] stop timed out before every batch was delivered");
        return Ok(ExitCode::from(1));
    }
    if stats.items_lost > 0 || stats.delivery_failures > 0 {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

/// Events producer `index` of `producers` is responsible for. The first
/// `total % producers` producers take one extra.
fn share(total: u64, producers: usize, index: usize) -> u64 {
    let producers = producers as u64;
    let index = index as u64;
    total / producers + u64::from(index < total % producers)
}

fn produce(
    stage: &BatchStage<Event>,
    producer: usize,
    count: u64,
    shutdown: &AtomicBool,
    refused: &AtomicUsize,
) {
    for seq in 0..count {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Producer {producer} stopping after {seq} events");
            return;
        }

        match stage.post(Event { producer, seq }) {
            Ok(()) => {}
            Err(StageError::Stopped) => return,
            Err(e) => {
                warn!("Producer {producer} could not post event {seq}: {e}");
                refused.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn print_summary(stats: &StatsSnapshot, elapsed: Duration, refused: usize) {
    eprintln!(
        "[run] {} events accepted, {} delivered in {} batches ({:.2?})",
        stats.items_accepted, stats.items_delivered, stats.batches_delivered, elapsed
    );
    if refused > 0 {
        eprintln!("[run] {refused} events refused at post");
    }
    if stats.items_lost > 0 || stats.items_discarded > 0 {
        eprintln!(
            "[run] {} events lost, {} discarded",
            stats.items_lost, stats.items_discarded
        );
    }
    if stats.dispatch_rejected > 0 || stats.delivery_failures > 0 {
        eprintln!(
            "[run] {} dispatches rejected, {} deliveries failed",
            stats.dispatch_rejected, stats.delivery_failures
        );
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
