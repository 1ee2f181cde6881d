//! Counting permit pool that bounds in-flight batches.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::{
    cancel::{CancelToken, POLL_INTERVAL},
    error::StageError,
};

/// Bounds how many batches may be dispatched but not yet delivered.
///
/// An unbounded controller (`limit == None`) hands out permits for free.
#[derive(Debug)]
pub struct AdmissionController {
    limit: Option<usize>,
    available: Mutex<usize>,
    released: Condvar,
}

/// One unit of in-flight capacity. Dropping it releases the permit.
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub struct Permit {
    controller: Option<Arc<AdmissionController>>,
}

impl AdmissionController {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            available: Mutex::new(limit.unwrap_or(0)),
            released: Condvar::new(),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Permits currently free, or `None` when unbounded.
    pub fn available(&self) -> Option<usize> {
        self.limit.map(|_| *self.lock())
    }

    /// Permits currently held, or `None` when unbounded.
    pub fn in_flight(&self) -> Option<usize> {
        self.limit.map(|limit| limit - *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is free.
    ///
    /// Fails with [`StageError::Cancelled`] if `cancel` fires while waiting;
    /// no permit is consumed in that case.
    pub fn acquire(self: &Arc<Self>, cancel: &CancelToken) -> Result<Permit, StageError> {
        if self.limit.is_none() {
            return Ok(Permit { controller: None });
        }

        self.acquire_n(1, cancel)?;
        Ok(Permit {
            controller: Some(Arc::clone(self)),
        })
    }

    /// Wait until every outstanding permit has come back, without keeping
    /// any of them.
    pub fn drain_and_restore(&self, cancel: &CancelToken) -> Result<(), StageError> {
        let Some(limit) = self.limit else {
            return Ok(());
        };

        self.acquire_n(limit, cancel)?;
        self.release_n(limit);
        Ok(())
    }

    /// Takes `n` permits at once, never a partial amount.
    fn acquire_n(&self, n: usize, cancel: &CancelToken) -> Result<(), StageError> {
        let mut available = self.lock();
        loop {
            if *available >= n {
                *available -= n;
                return Ok(());
            }

            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }

            available = self
                .released
                .wait_timeout(available, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn release_n(&self, n: usize) {
        let Some(limit) = self.limit else {
            return;
        };

        let mut available = self.lock();
        *available = (*available + n).min(limit);
        self.released.notify_all();
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.release_n(1);
        }
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
