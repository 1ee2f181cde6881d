pub mod config;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ferry_runtime::StageSettings;

use config::ConfigArgs;
use run::RunArgs;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Produce events from several threads and print the resulting batches.
    ///
    /// Example:
    ///   ferry run --items 1000 --producers 8 --max-batch-size 50
    ///   ferry run --max-in-flight 2 --delivery-delay-ms 100
    Run(RunArgs),

    /// Show the effective batching settings.
    Config(ConfigArgs),
}

/// Batching settings, layered: file, then `FERRY_*` env, then these flags.
#[derive(Debug, Args)]
pub struct SettingsArgs {
    /// Settings file (defaults to the ferry config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Items per batch; 0 for no size limit
    #[arg(long)]
    pub max_batch_size: Option<usize>,

    /// Batch age in milliseconds; 0 or negative disables age closing
    #[arg(long, allow_negative_numbers = true)]
    pub max_batch_age_ms: Option<i64>,

    /// Batches allowed in flight at once; 0 for no limit
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Leave buffered items undelivered when stopping
    #[arg(long)]
    pub no_flush_on_stop: bool,

    /// Dispatch worker threads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Bound on queued dispatch units
    #[arg(long)]
    pub queue_capacity: Option<usize>,
}

impl SettingsArgs {
    pub fn resolve(&self) -> Result<StageSettings> {
        let mut settings = StageSettings::resolve(self.config.as_deref())
            .context("Failed to load batching settings")?;

        if let Some(n) = self.max_batch_size {
            settings.max_batch_size = Some(n).filter(|&n| n > 0);
        }
        if let Some(ms) = self.max_batch_age_ms {
            settings.max_batch_age_ms = ms;
        }
        if let Some(n) = self.max_in_flight {
            settings.max_in_flight = Some(n).filter(|&n| n > 0);
        }
        if self.no_flush_on_stop {
            settings.flush_on_stop = false;
        }
        if let Some(n) = self.workers {
            settings.workers = n;
        }
        if let Some(n) = self.queue_capacity {
            settings.queue_capacity = Some(n);
        }

        Ok(settings)
    }
}
