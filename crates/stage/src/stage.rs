use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::{
    accumulator::{Accumulator, CloseReason, Offer},
    admission::{AdmissionController, Permit},
    cancel::{self, CancelToken},
    error::StageError,
    executor::Task,
    link::Target,
    options::BatchOptions,
    stats::{StageStats, StatsSnapshot},
    timer::AgeTimer,
};

/// Lifecycle of a stage. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Running,
    Stopping,
    Stopped,
}


/// Turns a stream of items into a stream of batches.
///
/// Producers call [`post`](Self::post) from any thread. Items collect in the
/// current accumulator until it fills, ages out, or is flushed; each batch is
/// then delivered to the downstream [`Target`] on the executor. At most
/// `max_in_flight` batches are between "opened" and "delivered" at a time,
/// and producers block while that limit is reached.
pub struct BatchStage<T: Send + 'static> {
    options: BatchOptions,
    target: Arc<dyn Target<T>>,
    admission: Arc<AdmissionController>,
    timer: Option<AgeTimer<T>>,
    stats: Arc<StageStats>,
    /// The only accumulator that may still be open. Producers hold this
    /// lock while they wait for a permit.
    current: Mutex<Option<Arc<Accumulator<T>>>>,
    /// Never held across a blocking wait.
    state: Mutex<StageState>,
}

impl<T: Send + 'static> BatchStage<T> {
    pub fn new<D>(options: BatchOptions, target: D) -> Result<Self, StageError>
    where
        D: Target<T> + 'static,
    {
        options.validate()?;

        let timer = match options.age_limit() {
            Some(_) => Some(
                AgeTimer::spawn("ferry-age-timer".into()).map_err(|e| {
                    StageError::InvalidOptions(format!("cannot start age timer: {e}"))
                })?,
            ),
            None => None,
        };

        debug!("Creating batching stage with {options:?}");

        Ok(Self {
            admission: Arc::new(AdmissionController::new(options.max_in_flight())),
            target: Arc::new(target),
            timer,
            stats: Arc::new(StageStats::default()),
            current: Mutex::new(None),
            state: Mutex::new(StageState::Running),
            options,
        })
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn state(&self) -> StageState {
        *self.lock_state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The live counters, shared with dispatch units that may outlive the
    /// stage.
    pub fn shared_stats(&self) -> Arc<StageStats> {
        Arc::clone(&self.stats)
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Arc<Accumulator<T>>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, StageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn post(&self, item: T) -> Result<(), StageError> {
        self.post_with(item, &CancelToken::new())
    }

    /// Add one item, opening a new batch if needed.
    ///
    /// Blocks while the in-flight limit is reached; `cancel` aborts that wait.
    pub fn post_with(&self, item: T, cancel: &CancelToken) -> Result<(), StageError> {
        let mut current = self.lock_current();
        self.collect(&mut current, item, cancel)
    }

    pub fn post_batch(&self, items: Vec<T>) -> Result<(), StageError> {
        self.post_batch_with(items, &CancelToken::new())
    }

    /// Add items in order without other producers interleaving.
    ///
    /// Stops at the first error; the remaining items are not admitted.
    pub fn post_batch_with(
        &self,
        items: Vec<T>,
        cancel: &CancelToken,
    ) -> Result<(), StageError> {
        let mut current = self.lock_current();
        for item in items {
            self.collect(&mut current, item, cancel)?;
        }
        Ok(())
    }

    /// Close the open batch and wait until every dispatched batch has been
    /// delivered.
    ///
    /// With unbounded in-flight there is nothing to wait on and this returns
    /// once the open batch is closed.
    pub fn flush(&self) -> Result<(), StageError> {
        self.flush_with(&CancelToken::new())
    }

    /// Like [`flush`](Self::flush). `cancel` also bounds the wait for a
    /// producer that holds the stage while blocked on a permit. An
    /// interrupted flush leaves closed batches queued for delivery.
    pub fn flush_with(&self, cancel: &CancelToken) -> Result<(), StageError> {
        let mut current = cancel::lock_with(&self.current, cancel)?;

        if let Some(current) = current.take()
            && current.close(CloseReason::Explicit)
        {
            debug!("Flush closed the open batch");
        }

        debug!("Flush started");
        self.admission.drain_and_restore(cancel)?;
        debug!("Flush complete");
        Ok(())
    }

    /// Stop accepting items and, if configured, flush what is buffered.
    ///
    /// A flush that fails or runs past `timeout` is logged, not returned; the
    /// result says whether it completed. Stopping twice is a no-op.
    pub fn stop(&self, timeout: Duration) -> bool {
        {
            let mut state = self.lock_state();
            if *state != StageState::Running {
                return true;
            }
            *state = StageState::Stopping;
        }

        info!("Stopping batching stage");

        let mut completed = true;
        if self.options.flush_on_stop()
            && let Err(e) = self.flush_with(&CancelToken::with_timeout(timeout))
        {
            warn!("Flush before stop did not complete: {e}");
            completed = false;
        }

        *self.lock_state() = StageState::Stopped;
        info!("Batching stage stopped");
        completed
    }

    /// Offer `item` to the current batch, opening a successor when there is
    /// none or it is closed. Caller holds the stage lock.
    fn collect(
        &self,
        current: &mut Option<Arc<Accumulator<T>>>,
        item: T,
        cancel: &CancelToken,
    ) -> Result<(), StageError> {
        self.ensure_running()?;

        let item = match current.as_deref() {
            None => item,
            Some(current) => match current.offer(item) {
                Offer::Accepted => {
                    self.stats.record_accepted();
                    return Ok(());
                }
                Offer::Filled => {
                    self.stats.record_accepted();
                    debug!("Batch filled at {:?} items", current.size_limit());
                    return Ok(());
                }
                Offer::Rejected(item) => item,
            },
        };

        self.open_batch(current, item, cancel)
    }

    fn ensure_running(&self) -> Result<(), StageError> {
        let state = *self.lock_state();
        if state != StageState::Running {
            debug!("Refusing item: stage is {state:?}");
            return Err(StageError::Stopped);
        }
        Ok(())
    }

    /// Acquire an in-flight permit, start a fresh batch holding `item`,
    /// install it as current and submit its dispatch unit.
    fn open_batch(
        &self,
        current: &mut Option<Arc<Accumulator<T>>>,
        item: T,
        cancel: &CancelToken,
    ) -> Result<(), StageError> {
        let permit = self.admission.acquire(cancel).inspect_err(|_| {
            debug!("Interrupted while waiting for in-flight batch permit");
        })?;

        if let Some(available) = self.admission.available() {
            debug!("Acquired in-flight permit (available: {available})");
        }

        // The stage may have stopped while this producer waited.
        self.ensure_running()?;

        let batch = Arc::new(Accumulator::new(
            self.options.size_limit(),
            self.options.age_limit(),
        ));

        seed_batch(&batch, item, &self.stats);

        *current = Some(Arc::clone(&batch));
        self.stats.record_opened();

        self.submit(&batch, permit)?;

        if let Some(timer) = &self.timer {
            timer.schedule(&batch);
        }
        Ok(())
    }

    /// Hand the batch's dispatch unit to the executor. The unit owns the
    /// permit, so a refused unit gives it back when the executor drops it.
    fn submit(&self, batch: &Arc<Accumulator<T>>, permit: Permit) -> Result<(), StageError> {
        let task: Task = {
            let batch = Arc::clone(batch);
            let target = Arc::clone(&self.target);
            let stats = Arc::clone(&self.stats);
            Box::new(move || {
                let _permit = permit;
                let (reason, items) = batch.wait_closed();
                deliver(target.as_ref(), &stats, reason, items);
            })
        };

        if let Err(reason) = self.options.executor().execute(task) {
            batch.close(CloseReason::Rejected);
            let (_, lost) = batch.wait_closed();
            error!(
                "Unable to start batch dispatch ({reason}); dropping {} items",
                lost.len()
            );
            self.stats.record_dispatch_rejected(lost.len());
            return Err(StageError::DispatchRejected(reason));
        }

        Ok(())
    }
}

/// Offer the first item to a batch that was just opened. A fresh batch is
/// open, so the discard branch only runs if that stops holding.
fn seed_batch<T>(batch: &Accumulator<T>, item: T, stats: &StageStats) {
    match batch.offer(item) {
        Offer::Accepted | Offer::Filled => stats.record_accepted(),
        Offer::Rejected(item) => {
            drop(item);
            warn!("Discarding item rejected by a fresh batch");
            stats.record_discarded();
        }
    }
}

/// Forward a closed batch downstream. Empty batches (a flush with nothing
/// buffered) are not delivered.
fn deliver<T>(target: &dyn Target<T>, stats: &StageStats, reason: CloseReason, items: Vec<T>) {
    if items.is_empty() {
        debug!("Batch closed ({reason:?}) without any items");
        return;
    }

    let len = items.len();
    debug!("Batch closed ({reason:?}) with {len} items");

    match target.post_batch(items) {
        Ok(()) => stats.record_delivered(len),
        Err(e) => {
            error!("Downstream refused batch of {len} items: {e}");
            stats.record_delivery_failure(len);
        }
    }
}

impl<T: Send + 'static> Target<T> for BatchStage<T> {
    fn post(&self, item: T) -> Result<(), StageError> {
        BatchStage::post(self, item)
    }

    fn post_batch(&self, items: Vec<T>) -> Result<(), StageError> {
        BatchStage::post_batch(self, items)
    }
}

impl<T: Send + 'static> Drop for BatchStage<T> {
    /// Close the open batch so its dispatch unit does not wait forever.
    /// Nothing is drained.
    fn drop(&mut self) {
        let current = self.current.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = current.take()
            && current.close(CloseReason::Explicit)
        {
            debug!("Stage dropped with an open batch; closing it");
        }
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
