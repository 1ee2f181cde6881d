use std::{fmt, sync::Arc, time::Duration};

use ferry_runtime::{DEFAULT_MAX_BATCH_AGE_MS, DEFAULT_MAX_BATCH_SIZE, StageSettings};

use crate::{error::StageError, executor::Executor};

/// Per-stage configuration, fixed at construction.
#[derive(Clone)]
pub struct BatchOptions {
    max_batch_size: Option<usize>,
    max_batch_age: Duration,
    max_in_flight: Option<usize>,
    flush_on_stop: bool,
    executor: Arc<dyn Executor>,
}

impl BatchOptions {
    /// Defaults: 10 items, 250ms, unbounded in-flight, flush on stop.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            max_batch_size: Some(DEFAULT_MAX_BATCH_SIZE),
            max_batch_age: Duration::from_millis(DEFAULT_MAX_BATCH_AGE_MS as u64),
            max_in_flight: None,
            flush_on_stop: true,
            executor,
        }
    }

    pub fn from_settings(settings: &StageSettings, executor: Arc<dyn Executor>) -> Self {
        Self::new(executor)
            .with_max_batch_size(settings.max_batch_size)
            .with_max_batch_age(settings.max_batch_age())
            .with_max_in_flight(settings.max_in_flight)
            .with_flush_on_stop(settings.flush_on_stop)
    }

    /// `None` or `Some(0)` leaves batches unbounded by size.
    pub fn with_max_batch_size(mut self, max_batch_size: Option<usize>) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// `Duration::ZERO` disables age-based closing.
    pub fn with_max_batch_age(mut self, max_batch_age: Duration) -> Self {
        self.max_batch_age = max_batch_age;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_flush_on_stop(mut self, flush_on_stop: bool) -> Self {
        self.flush_on_stop = flush_on_stop;
        self
    }

    pub fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    pub fn max_batch_age(&self) -> Duration {
        self.max_batch_age
    }

    pub fn max_in_flight(&self) -> Option<usize> {
        self.max_in_flight
    }

    pub fn flush_on_stop(&self) -> bool {
        self.flush_on_stop
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Size limit as the accumulator sees it: positive or absent.
    pub(crate) fn size_limit(&self) -> Option<usize> {
        self.max_batch_size.filter(|&n| n > 0)
    }

    /// Age limit as the accumulator sees it: non-zero or absent.
    pub(crate) fn age_limit(&self) -> Option<Duration> {
        Some(self.max_batch_age).filter(|age| !age.is_zero())
    }

    pub(crate) fn validate(&self) -> Result<(), StageError> {
        if self.max_in_flight == Some(0) {
            return Err(StageError::InvalidOptions(
                "max_in_flight must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("max_batch_size", &self.max_batch_size)
            .field("max_batch_age", &self.max_batch_age)
            .field("max_in_flight", &self.max_in_flight)
            .field("flush_on_stop", &self.flush_on_stop)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
