use chrono::{DateTime, Utc};

use crate::error::StoreError;

use super::types::{AuditAction, AuditEvent, AuditQuery, SuspiciousClient};

/// Append-only persistence for audit events.
pub trait AuditBackend: Send + Sync {
    /// Store the event and return its assigned id. `event.id` is ignored.
    fn append(&self, event: &AuditEvent) -> Result<i64, StoreError>;

    /// Events of one document, newest first (ties broken by id, descending).
    fn query(&self, doc_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>, StoreError>;

    /// Every event of one session, oldest first.
    fn by_session(&self, session_id: &str) -> Result<Vec<AuditEvent>, StoreError>;

    /// Per-client counts of `actions` at or after `since`, keeping clients
    /// with at least `min_count` events. Events without a client are ignored.
    /// Sorted by count descending, then client.
    fn count_by_client(
        &self,
        actions: &[AuditAction],
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<SuspiciousClient>, StoreError>;
}
