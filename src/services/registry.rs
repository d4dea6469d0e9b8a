use crate::models::UploadRecord;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// In-memory table of every accepted upload, shared by intake and the
/// broadcaster. Records live for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct RecordRegistry {
    records: Arc<DashMap<String, UploadRecord>>,
    last_id: Arc<AtomicI64>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond timestamp id, bumped past the previous one so two
    /// uploads in the same millisecond still get distinct ids.
    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_id.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last_id.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate.to_string(),
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn insert(&self, record: UploadRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<UploadRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// Snapshot of every record, oldest first.
    pub fn list(&self) -> Vec<UploadRecord> {
        let mut records: Vec<UploadRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.id.parse::<i64>().unwrap_or(i64::MAX));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Applies one tick under the entry lock and returns the resulting
    /// snapshot. `None` for unknown ids and for records already safe.
    pub fn advance(&self, id: &str, step: u8) -> Option<UploadRecord> {
        let mut entry = self.records.get_mut(id)?;
        if entry.advance(step) {
            Some(entry.value().clone())
        } else {
            None
        }
    }
}
