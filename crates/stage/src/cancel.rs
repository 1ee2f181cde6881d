use std::{
    sync::{
        Arc, Mutex, MutexGuard, TryLockError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::error::StageError;

/// How long blocking waits sleep between cancellation checks.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cancellation signal for blocking stage operations.
///
/// Clones share the same flag. A token may also carry a deadline, after
/// which it reports itself cancelled without anyone calling [`cancel`].
///
/// [`cancel`]: CancelToken::cancel
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that fires only when [`CancelToken::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// A token that fires once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Lock `mutex`, giving up with [`StageError::Cancelled`] once `cancel`
/// fires. A poisoned lock is taken as is.
pub(crate) fn lock_with<'a, T>(
    mutex: &'a Mutex<T>,
    cancel: &CancelToken,
) -> Result<MutexGuard<'a, T>, StageError> {
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
