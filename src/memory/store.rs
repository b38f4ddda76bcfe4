use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::config::MemoryConfig;
use crate::error::StoreError;
use crate::memory::types::{AggregateDelta, PersistentUserRecord, UserBaseline};

/// Layer 5 persistence boundary.
///
/// Touched exactly twice per session: one baseline read at start, one
/// aggregate write at end. Implementations only need whole-record load and
/// save; decay and delta folding live in the provided methods so every
/// backend behaves the same.
pub trait UserStore: Send + Sync {
    fn load_record(&self, user_id: &str) -> Result<Option<PersistentUserRecord>, StoreError>;

    /// Replace the user's record. Must land whole or not at all.
    fn save_record(&self, record: &PersistentUserRecord) -> Result<(), StoreError>;

    /// Decay is applied to the returned copy only; the stored counters catch
    /// up on the next write.
    fn read_baseline(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        config: &MemoryConfig,
    ) -> Result<UserBaseline, StoreError> {
        let record = self
            .load_record(user_id)?
            .unwrap_or_else(|| PersistentUserRecord::new(user_id, now));
        Ok(record.baseline(now, config))
    }

    fn write_delta(
        &self,
        delta: &AggregateDelta,
        now: DateTime<Utc>,
        config: &MemoryConfig,
    ) -> Result<(), StoreError> {
        let mut record = self
            .load_record(&delta.user_id)?
            .unwrap_or_else(|| PersistentUserRecord::new(delta.user_id.clone(), now));
        record.apply(delta, now, config);
        self.save_record(&record)
    }
}

/// Process-local store. `fail_next_reads` / `fail_next_writes` make the next
/// N calls return `Unavailable`, for exercising degraded paths.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    records: Mutex<HashMap<String, PersistentUserRecord>>,
    failing_reads: AtomicU32,
    failing_writes: AtomicU32,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn insert(&self, record: PersistentUserRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(record.user_id.clone(), record);
        Ok(())
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl UserStore for InMemoryUserStore {
    fn load_record(&self, user_id: &str) -> Result<Option<PersistentUserRecord>, StoreError> {
        if Self::take_failure(&self.failing_reads) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(user_id).cloned())
    }

    fn save_record(&self, record: &PersistentUserRecord) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.records
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }
}

/// All users in one JSON document. Saves go through a sibling temp file and
/// a rename, so a crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileUserStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    guard: Mutex<()>,
}

impl JsonFileUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, PersistentUserRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_all(&self, records: &HashMap<String, PersistentUserRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!("[UserStore] Wrote {} record(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}

impl UserStore for JsonFileUserStore {
    fn load_record(&self, user_id: &str) -> Result<Option<PersistentUserRecord>, StoreError> {
        let _g = self.guard.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_all()?.remove(user_id))
    }

    fn save_record(&self, record: &PersistentUserRecord) -> Result<(), StoreError> {
        let _g = self.guard.lock().map_err(|_| StoreError::Poisoned)?;
        let mut all = self.read_all()?;
        all.insert(record.user_id.clone(), record.clone());
        self.write_all(&all)
    }
}
