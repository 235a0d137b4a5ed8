//! Process-local audit backend.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StoreError;

use super::traits::AuditBackend;
use super::types::{AuditAction, AuditEvent, AuditQuery, SuspiciousClient};

#[derive(Default)]
pub struct MemoryAuditBackend {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditBackend for MemoryAuditBackend {
    fn append(&self, event: &AuditEvent) -> Result<i64, StoreError> {
        let mut events = self.events.lock();
        let id = events.len() as i64 + 1;
        events.push(AuditEvent {
            id: Some(id),
            ..event.clone()
        });
        Ok(id)
    }

    fn query(&self, doc_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>, StoreError> {
        let mut matched: Vec<AuditEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.doc_id == doc_id)
            .filter(|e| query.action.map_or(true, |a| e.action == a))
            .cloned()
            .collect();
        matched.sort_by_key(|e| Reverse((e.created_at, e.id)));
        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    fn by_session(&self, session_id: &str) -> Result<Vec<AuditEvent>, StoreError> {
        let mut matched: Vec<AuditEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| e.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect();
        matched.sort_by_key(|e| (e.created_at, e.id));
        Ok(matched)
    }

    fn count_by_client(
        &self,
        actions: &[AuditAction],
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<SuspiciousClient>, StoreError> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in self.events.lock().iter() {
            if event.created_at < since || !actions.contains(&event.action) {
                continue;
            }
            if let Some(client) = &event.client {
                *counts.entry(client.clone()).or_default() += 1;
            }
        }

        let mut clients: Vec<SuspiciousClient> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_count)
            .map(|(client, count)| SuspiciousClient { client, count })
            .collect();
        clients.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.client.cmp(&b.client)));
        Ok(clients)
    }
}
