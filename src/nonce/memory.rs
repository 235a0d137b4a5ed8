//! Process-local nonce backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StoreError;

use super::traits::NonceBackend;
use super::types::NonceRecord;

/// nonce → record, behind one mutex.
///
/// `consume` does its check and its mark inside a single lock acquisition,
/// which is what makes it atomic for in-process callers.
#[derive(Default)]
pub struct MemoryNonceBackend {
    records: Mutex<HashMap<String, NonceRecord>>,
}

impl MemoryNonceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl NonceBackend for MemoryNonceBackend {
    fn insert(&self, record: &NonceRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.nonce) {
            return Err(StoreError::Corrupt("duplicate nonce".into()));
        }
        records.insert(record.nonce.clone(), record.clone());
        Ok(())
    }

    fn consume(&self, doc_id: &str, nonce: &str) -> Result<Option<String>, StoreError> {
        let mut records = self.records.lock();
        match records.get_mut(nonce) {
            Some(record) if record.doc_id == doc_id && !record.used => {
                record.used = true;
                Ok(Some(record.session_id.clone()))
            }
            _ => Ok(None),
        }
    }

    fn get(&self, nonce: &str) -> Result<Option<NonceRecord>, StoreError> {
        Ok(self.records.lock().get(nonce).cloned())
    }

    fn has_session(&self, doc_id: &str, session_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .lock()
            .values()
            .any(|r| r.doc_id == doc_id && r.session_id == session_id))
    }

    fn delete_issued_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, StoreError> {
        // The snapshot is a read-only scan under the lock. Nothing is mutated
        // until the per-record pass below.
        let candidates: Vec<String> = self
            .records
            .lock()
            .values()
            .filter(|r| r.issued_at < cutoff)
            .take(limit)
            .map(|r| r.nonce.clone())
            .collect();

        // One lock per removal so request handlers interleave with the sweep.
        let mut deleted = 0;
        for nonce in candidates {
            let mut records = self.records.lock();
            if records.get(&nonce).is_some_and(|r| r.issued_at < cutoff) {
                records.remove(&nonce);
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
