//! Downstream end of `ferry run`: one JSON line per delivered batch.

use std::{
    io::{self, Stdout, Write},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use ferry_stage::{StageError, Target};
use serde::Serialize;

use crate::event::Event;

#[derive(Serialize)]
struct BatchLine<'a> {
    batch: u64,
    size: usize,
    events: &'a [Event],
}

pub struct BatchPrinter<W: Write + Send> {
    out: Mutex<W>,
    delay: Duration,
    batches: AtomicU64,
}

impl BatchPrinter<Stdout> {
    pub fn stdout(delay: Duration) -> Self {
        Self::new(io::stdout(), delay)
    }
}

impl<W: Write + Send> BatchPrinter<W> {
    /// `delay` is slept before each batch is written, to stand in for a slow
    /// consumer.
    pub fn new(out: W, delay: Duration) -> Self {
        Self {
            out: Mutex::new(out),
            delay,
            batches: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_batch(&self, events: &[Event]) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let line = BatchLine {
            batch: self.batches.fetch_add(1, Ordering::Relaxed) + 1,
            size: events.len(),
            events,
        };
        serde_json::to_writer(&mut *out, &line)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

impl<W: Write + Send> Target<Event> for BatchPrinter<W> {
    fn post_batch(&self, items: Vec<Event>) -> Result<(), StageError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.write_batch(&items)
            .map_err(|e| StageError::Delivery(format!("cannot write batch: {e}")))
    }
}

#[cfg(test)]
#[path = "printer_tests.rs"]
mod tests;
