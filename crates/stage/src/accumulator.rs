//! A single open batch and its close gate.
//!
//! Three parties race to close an accumulator: the producer whose append
//! fills it, the age timer, and an explicit flush/stop. All of them go
//! through the accumulator's own mutex, never the stage lock, and only the
//! first one wins.

use std::{
    mem,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Why an accumulator stopped accepting items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The append that reached the size limit.
    Size,
    /// The age deadline passed.
    Age,
    /// Flush, stop or stage teardown.
    Explicit,
    /// The executor refused the batch's dispatch unit.
    Rejected,
}

/// Outcome of [`Accumulator::offer`].
#[derive(Debug, PartialEq, Eq)]
pub enum Offer<T> {
    /// Appended; the batch is still open.
    Accepted,
    /// Appended, and the append filled the batch, which is now closed.
    Filled,
    /// The batch was already closed. The item is handed back untouched.
    Rejected(T),
}

struct Slot<T> {
    buffer: Vec<T>,
    closed: Option<CloseReason>,
}

/// Holds one batch while it is open.
pub struct Accumulator<T> {
    slot: Mutex<Slot<T>>,
    closed: Condvar,
    size_limit: Option<usize>,
    age_limit: Option<Duration>,
    opened_at: Instant,
}

impl<T> Accumulator<T> {
    /// A zero size limit or zero age limit means "no limit".
    pub fn new(size_limit: Option<usize>, age_limit: Option<Duration>) -> Self {
        let size_limit = size_limit.filter(|&n| n > 0);
        let age_limit = age_limit.filter(|age| !age.is_zero());

        Self {
            slot: Mutex::new(Slot {
                buffer: size_limit.map(Vec::with_capacity).unwrap_or_default(),
                closed: None,
            }),
            closed: Condvar::new(),
            size_limit,
            age_limit,
            opened_at: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item` unless the batch is already closed.
    ///
    /// The size limit is checked after the append, so a full batch contains
    /// the item that filled it.
    pub fn offer(&self, item: T) -> Offer<T> {
        let mut slot = self.lock();
        if slot.closed.is_some() {
            return Offer::Rejected(item);
        }

        slot.buffer.push(item);

        match self.size_limit {
            Some(limit) if slot.buffer.len() >= limit => {
                self.close_locked(&mut slot, CloseReason::Size);
                Offer::Filled
            }
            _ => Offer::Accepted,
        }
    }

    /// Close the batch. Returns `true` only for the call that closed it.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut slot = self.lock();
        self.close_locked(&mut slot, reason)
    }

    /// Age-triggered close, used by the timer. No-op once closed.
    pub fn expire(&self) -> bool {
        self.close(CloseReason::Age)
    }

    fn close_locked(&self, slot: &mut Slot<T>, reason: CloseReason) -> bool {
        if slot.closed.is_some() {
            return false;
        }
        slot.closed = Some(reason);
        self.closed.notify_all();
        true
    }

    /// Block until the batch is closed, then take its contents.
    ///
    /// Meant for the batch's single dispatch unit: a second call returns an
    /// empty buffer.
    pub fn wait_closed(&self) -> (CloseReason, Vec<T>) {
        let mut slot = self
            .closed
            .wait_while(self.lock(), |slot| slot.closed.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        let reason = slot.closed.unwrap_or(CloseReason::Explicit);
        (reason, mem::take(&mut slot.buffer))
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn size_limit(&self) -> Option<usize> {
        self.size_limit
    }

    pub fn age_limit(&self) -> Option<Duration> {
        self.age_limit
    }

    /// When the age timer should close this batch, if it has an age limit.
    pub fn deadline(&self) -> Option<Instant> {
        self.age_limit.and_then(|age| self.opened_at.checked_add(age))
    }
}

#[cfg(test)]
#[path = "accumulator_tests.rs"]
mod tests;
