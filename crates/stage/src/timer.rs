use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Weak},
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, error};

use crate::accumulator::Accumulator;

/// Pending deadlines kept before the first sweep for settled batches.
const PRUNE_FLOOR: usize = 64;

struct Deadline<T> {
    at: Instant,
    batch: Weak<Accumulator<T>>,
}

/// Closes accumulators when their age deadline passes.
///
/// One thread per stage. It only touches an accumulator through the
/// accumulator's own lock, never the stage lock. Deadlines hold a `Weak`:
/// a batch already delivered and dropped is skipped, and one that closed for
/// another reason ignores the expiry.
pub(crate) struct AgeTimer<T> {
    tx: Option<Sender<Deadline<T>>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> AgeTimer<T> {
    pub(crate) fn spawn(name: String) -> io::Result<Self> {
        let (tx, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || timer_loop(rx))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Arrange for `batch` to expire at its deadline. Batches without an age
    /// limit are ignored.
    pub(crate) fn schedule(&self, batch: &Arc<Accumulator<T>>) {
        let Some(at) = batch.deadline() else {
            return;
        };

        let Some(tx) = &self.tx else {
            return;
        };

        if tx
            .send(Deadline {
                at,
                batch: Arc::downgrade(batch),
            })
            .is_err()
        {
            error!("Age timer thread is gone; batch will close only on size or flush");
        }
    }
}

impl<T> Drop for AgeTimer<T> {
    fn drop(&mut self) {
        // Disconnecting wakes the timer thread so it can exit.
        self.tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Age timer thread panicked");
        }
    }
}

fn timer_loop<T>(rx: Receiver<Deadline<T>>) {
    let mut pending: VecDeque<Deadline<T>> = VecDeque::new();
    let mut prune_at = PRUNE_FLOOR;

    loop {
        expire_due(&mut pending, Instant::now());

        let received = match pending.front() {
            Some(next) => rx.recv_deadline(next.at),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(deadline) => {
                // Deadlines normally arrive in order; keep the queue sorted anyway.
                let pos = pending.partition_point(|d| d.at <= deadline.at);
                pending.insert(pos, deadline);

                if pending.len() >= prune_at {
                    prune_settled(&mut pending);
                    prune_at = (pending.len() * 2).max(PRUNE_FLOOR);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Age timer exiting with {} pending deadlines", pending.len());
}

/// Drop deadlines whose batch is gone or already closed.
fn prune_settled<T>(pending: &mut VecDeque<Deadline<T>>) {
    pending.retain(|d| d.batch.upgrade().is_some_and(|batch| !batch.is_closed()));
}

fn expire_due<T>(pending: &mut VecDeque<Deadline<T>>, now: Instant) {
    while pending.front().is_some_and(|d| d.at <= now) {
        if let Some(due) = pending.pop_front()
            && let Some(batch) = due.batch.upgrade()
            && batch.expire()
        {
            debug!("Batch closed by age");
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
