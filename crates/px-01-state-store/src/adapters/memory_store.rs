use crate::domain::{StateError, StateUpdate};
use crate::ports::{StateStore, Trx, TrxMode};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

type Table = BTreeMap<String, Vec<u8>>;

/// In-memory implementation of StateStore.
///
/// Many read-only transactions may run at once. Write transactions buffer
/// their changes and apply them under the table's write lock on commit, so
/// two commits touching the same object are serialized by that lock.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    table: Arc<RwLock<Table>>,
    commits: Arc<AtomicU64>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of read-write commits applied so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Copy of the committed table.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Vec<u8>>, StateError> {
        let table = self.table.read().map_err(|_| StateError::LockPoisoned)?;
        Ok(table.clone())
    }
}

impl StateStore for InMemoryStateStore {
    fn begin(&self, mode: TrxMode) -> Result<Box<dyn Trx>, StateError> {
        Ok(Box::new(InMemoryTrx {
            table: Arc::clone(&self.table),
            commits: Arc::clone(&self.commits),
            mode,
            writes: BTreeMap::new(),
            closed: false,
        }))
    }
}

struct InMemoryTrx {
    table: Arc<RwLock<Table>>,
    commits: Arc<AtomicU64>,
    mode: TrxMode,
    /// `None` marks a pending delete.
    writes: BTreeMap<String, Option<Vec<u8>>>,
    closed: bool,
}

impl InMemoryTrx {
    fn ensure_writable(&self, operation: &'static str) -> Result<(), StateError> {
        if self.mode == TrxMode::ReadOnly {
            return Err(StateError::ReadOnly { operation });
        }
        Ok(())
    }
}

impl Trx for InMemoryTrx {
    fn mode(&self) -> TrxMode {
        self.mode
    }

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        let table = self.table.read().map_err(|_| StateError::LockPoisoned)?;
        Ok(table.get(key).cloned())
    }

    fn put_bytes(&mut self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        self.ensure_writable("put_bytes")?;
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StateError> {
        self.ensure_writable("delete")?;
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StateError> {
        let mut merged: BTreeMap<String, Vec<u8>> = {
            let table = self.table.read().map_err(|_| StateError::LockPoisoned)?;
            table
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        };

        for (key, pending) in self
            .writes
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    fn updates(&self) -> Vec<StateUpdate> {
        self.writes
            .iter()
            .map(|(key, pending)| match pending {
                Some(value) => StateUpdate::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                None => StateUpdate::Delete { key: key.clone() },
            })
            .collect()
    }

    fn commit(mut self: Box<Self>) -> Result<(), StateError> {
        self.closed = true;
        if self.mode == TrxMode::ReadOnly || self.writes.is_empty() {
            return Ok(());
        }

        let writes = std::mem::take(&mut self.writes);
        let mut table = self.table.write().map_err(|_| StateError::LockPoisoned)?;
        let applied = writes.len();
        for (key, pending) in writes {
            match pending {
                Some(value) => {
                    table.insert(key, value);
                }
                None => {
                    table.remove(&key);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!(writes = applied, "Committed transaction");
        Ok(())
    }

    fn discard(mut self: Box<Self>) {
        self.closed = true;
        if !self.writes.is_empty() {
            debug!(writes = self.writes.len(), "Discarded transaction");
        }
    }
}

impl Drop for InMemoryTrx {
    fn drop(&mut self) {
        if !self.closed && !self.writes.is_empty() {
            debug!(
                writes = self.writes.len(),
                "Transaction dropped without commit, writes discarded"
            );
        }
    }
}
