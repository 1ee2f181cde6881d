use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one stage.
///
/// These double as the signaling channel for dropped items: anything that is
/// neither delivered nor handed back to a caller as an error shows up here.
#[derive(Debug, Default)]
pub struct StageStats {
    items_accepted: AtomicU64,
    items_discarded: AtomicU64,
    items_lost: AtomicU64,
    batches_opened: AtomicU64,
    batches_delivered: AtomicU64,
    items_delivered: AtomicU64,
    dispatch_rejected: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`StageStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Items appended to some batch.
    pub items_accepted: u64,
    /// Items a fresh batch refused; dropped with a warning.
    pub items_discarded: u64,
    /// Items in batches whose dispatch or delivery failed.
    pub items_lost: u64,
    pub batches_opened: u64,
    pub batches_delivered: u64,
    pub items_delivered: u64,
    pub dispatch_rejected: u64,
    pub delivery_failures: u64,
}

impl StageStats {
    pub(crate) fn record_accepted(&self) {
        self.items_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.items_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_opened(&self) {
        self.batches_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, items: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.items_delivered.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_rejected(&self, items: usize) {
        self.dispatch_rejected.fetch_add(1, Ordering::Relaxed);
        self.items_lost.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery_failure(&self, items: usize) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        self.items_lost.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items_accepted: self.items_accepted.load(Ordering::Relaxed),
            items_discarded: self.items_discarded.load(Ordering::Relaxed),
            items_lost: self.items_lost.load(Ordering::Relaxed),
            batches_opened: self.batches_opened.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            items_delivered: self.items_delivered.load(Ordering::Relaxed),
            dispatch_rejected: self.dispatch_rejected.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
