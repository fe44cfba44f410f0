//! Persisted auto-bump registry.
//!
//! All reads and writes go through one async critical section: a caller
//! opens a `RegistryTxn` with `begin()`, which loads the entries from the
//! store while holding the lock, mutates them, and `commit()`s. Dropping a
//! transaction without committing discards its changes. The scheduler tick
//! and user commands both use this, so their mutations never interleave.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{DocumentStore, MemoryStore};
use crate::types::BumpScheduleEntry;

pub struct BumpRegistry {
    store: Arc<dyn DocumentStore<Vec<BumpScheduleEntry>>>,
    lock: Mutex<()>,
}

/// Exclusive view of the registry. Entries keep registry (insertion) order.
pub struct RegistryTxn<'a> {
    _guard: MutexGuard<'a, ()>,
    store: &'a dyn DocumentStore<Vec<BumpScheduleEntry>>,
    pub entries: Vec<BumpScheduleEntry>,
}

impl BumpRegistry {
    pub fn new(store: Arc<dyn DocumentStore<Vec<BumpScheduleEntry>>>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::<Vec<BumpScheduleEntry>>::default()))
    }

    /// Wait for exclusive access and load the current entries.
    pub async fn begin(&self) -> Result<RegistryTxn<'_>> {
        let guard = self.lock.lock().await;
        let entries = self.store.load()?.unwrap_or_default();
        Ok(RegistryTxn {
            _guard: guard,
            store: self.store.as_ref(),
            entries,
        })
    }

    /// Consistent copy of the entries.
    pub async fn snapshot(&self) -> Result<Vec<BumpScheduleEntry>> {
        Ok(self.begin().await?.entries)
    }
}

impl RegistryTxn<'_> {
    pub fn get_mut(&mut self, thread_id: u64) -> Option<&mut BumpScheduleEntry> {
        self.entries.iter_mut().find(|e| e.thread_id == thread_id)
    }

    /// Remove by id. Returns whether an entry was removed.
    pub fn remove(&mut self, thread_id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.thread_id != thread_id);
        self.entries.len() != before
    }

    /// Persist and release the lock.
    pub fn commit(self) -> Result<()> {
        self.store.save(&self.entries)?;
        debug!(entries = self.entries.len(), "Bump registry saved");
        Ok(())
    }
}
