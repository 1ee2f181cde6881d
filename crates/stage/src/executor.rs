//! Where batch deliveries run.
//!
//! The stage only needs something that accepts a boxed closure or refuses
//! it. [`WorkerPool`] is the stock implementation: a fixed set of named
//! threads fed by a crossbeam channel.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, PoisonError, RwLock},
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, error};

use crate::error::ExecuteError;

/// A unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks off the caller's thread.
///
/// On refusal the task must be dropped without running; the stage relies on
/// that drop to give back the task's in-flight permit. Tasks must not run on
/// the calling thread: a dispatch unit blocks until its batch closes, and the
/// caller is the one still filling it.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task) -> Result<(), ExecuteError>;
}

/// Fixed-size thread pool backed by a crossbeam channel.
pub struct WorkerPool {
    name: String,
    sender: RwLock<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one). With a `queue_capacity`, tasks
    /// beyond that many waiting are refused as [`ExecuteError::Saturated`].
    pub fn new(name: &str, threads: usize, queue_capacity: Option<usize>) -> io::Result<Self> {
        let (tx, rx) = match queue_capacity {
            Some(cap) => channel::bounded::<Task>(cap),
            None => channel::unbounded::<Task>(),
        };

        let threads = threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || worker_loop(rx))?;
            workers.push(handle);
        }

        debug!("[{name}] started {threads} workers");

        Ok(Self {
            name: name.to_string(),
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    pub fn threads(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop accepting tasks, let the workers finish what is queued, and join
    /// them.
    ///
    /// Queued dispatch units wait for their batch to close, so stop the stage
    /// feeding this pool first.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("[{}] worker thread panicked", self.name);
            }
        }

        debug!("[{}] shut down", self.name);
    }
}

impl Executor for WorkerPool {
    fn execute(&self, task: Task) -> Result<(), ExecuteError> {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(ExecuteError::Shutdown);
        };

        tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => ExecuteError::Saturated,
            TrySendError::Disconnected(_) => ExecuteError::Shutdown,
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Receiver<Task>) {
    while let Ok(task) = rx.recv() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("Dispatch task panicked; worker continues");
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
