//! Per-record write serialization.
//!
//! The sweep, the evaluator and the HTTP API all do read-modify-write on
//! whole records. Holding the record's lock across the fresh read and the
//! `save` keeps one writer from overwriting a sibling field another writer
//! just changed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// Registry of per-record async mutexes, keyed by record id.
#[derive(Default, Clone)]
pub struct RecordLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Held while a record is being modified. Dropping it releases the record.
pub struct RecordGuard {
    _guard: OwnedMutexGuard<()>,
    id: String,
    locks: RecordLocks,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one record.
    pub async fn acquire(&self, id: &str) -> RecordGuard {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        RecordGuard {
            _guard: lock.lock_owned().await,
            id: id.to_string(),
            locks: self.clone(),
        }
    }

    /// Number of records with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        // Forget the entry once nobody else holds or waits on it.
        if let Ok(mut map) = self.locks.inner.lock() {
            if let Some(lock) = map.get(&self.id) {
                // map entry + our guard's owned Arc
                if Arc::strong_count(lock) <= 2 {
                    map.remove(&self.id);
                }
            }
        }
    }
}
