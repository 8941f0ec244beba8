//! Reconfiguration lock
//!
//! Single-slot exclusive token guarding graph rebuilds. Built on
//! `tokio::sync::Mutex`, whose waiters are served in arrival order, so
//! concurrent reconfigurations run one after another in the order they were
//! requested. Each acquisition bumps a generation counter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// FIFO lock with a monotonically increasing generation
#[derive(Debug, Clone, Default)]
pub struct ReconfigureLock {
    generation: Arc<Mutex<u64>>,
    waiting: Arc<AtomicUsize>,
}

/// Proof of exclusive access; dropping it releases the lock
#[derive(Debug)]
pub struct ReconfigureGuard {
    generation: u64,
    _slot: OwnedMutexGuard<u64>,
}

impl ReconfigureGuard {
    /// Generation assigned to this holder
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Release explicitly
    pub fn release(self) {
        trace!(generation = self.generation, "reconfigure lock released");
    }
}

impl ReconfigureLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock, queueing behind earlier callers
    pub async fn acquire(&self) -> ReconfigureGuard {
        self.waiting.fetch_add(1, Ordering::AcqRel);
        let mut slot = self.generation.clone().lock_owned().await;
        self.waiting.fetch_sub(1, Ordering::AcqRel);

        *slot += 1;
        let generation = *slot;
        trace!(generation, "reconfigure lock acquired");
        ReconfigureGuard {
            generation,
            _slot: slot,
        }
    }

    /// Callers currently queued in [`ReconfigureLock::acquire`]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}
