//! Append-only access audit log.
//!
//! Writes are best-effort: a failed append never changes the access decision
//! already taken by the caller. Failures are logged at `error` and counted so
//! monitoring can alert on them.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::error::Result;
use crate::nonce::session_prefix;

pub use memory::MemoryAuditBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAuditBackend;
pub use traits::AuditBackend;
pub use types::{AuditAction, AuditContext, AuditEvent, AuditQuery, SuspiciousClient, UnknownAction};

pub struct AccessAuditLog {
    backend: Arc<dyn AuditBackend>,
    clock: Arc<dyn Clock>,
    failed_writes: AtomicU64,
}

impl AccessAuditLog {
    pub fn new(backend: Arc<dyn AuditBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            failed_writes: AtomicU64::new(0),
        }
    }

    /// Append one event. Returns the stored id, or `None` if the write failed.
    pub fn record(&self, doc_id: &str, action: AuditAction, context: AuditContext) -> Option<i64> {
        let event = AuditEvent {
            id: None,
            doc_id: doc_id.to_string(),
            session_id: context.session_id,
            client: context.client,
            user_agent: context.user_agent,
            action,
            metadata: context.metadata,
            created_at: self.clock.now(),
        };

        match self.backend.append(&event) {
            Ok(id) => Some(id),
            Err(e) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    doc_id,
                    action = action.as_str(),
                    session = event.session_id.as_deref().map(session_prefix),
                    error = %e,
                    "audit write failed"
                );
                None
            }
        }
    }

    /// Audit writes that have failed since construction.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    pub fn query(&self, doc_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        Ok(self.backend.query(doc_id, query)?)
    }

    pub fn by_session(&self, session_id: &str) -> Result<Vec<AuditEvent>> {
        Ok(self.backend.by_session(session_id)?)
    }

    /// Clients with at least `min_failures` rejected accesses in the last
    /// `since_minutes` minutes, most active first.
    pub fn suspicious_clients(
        &self,
        since_minutes: u32,
        min_failures: u64,
    ) -> Result<Vec<SuspiciousClient>> {
        let since = self.clock.now() - Duration::minutes(i64::from(since_minutes));
        Ok(self
            .backend
            .count_by_client(&AuditAction::REJECTIONS, since, min_failures)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;

    fn log_over(backend: Arc<dyn AuditBackend>) -> (AccessAuditLog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (AccessAuditLog::new(backend, clock.clone()), clock)
    }

    fn client(ip: &str) -> AuditContext {
        AuditContext::default().with_client(Some(ip), Some("test-agent"))
    }

    fn exercise_ordering(backend: Arc<dyn AuditBackend>) {
        let (log, clock) = log_over(backend);
        let ctx = AuditContext::default().with_session("session-a");

        log.record("doc-1", AuditAction::NonceMint, ctx.clone());
        log.record("doc-1", AuditAction::NonceConsume, ctx.clone());
        clock.advance(Duration::seconds(1));
        log.record(
            "doc-1",
            AuditAction::PageRequest,
            ctx.clone().with_metadata(json!({ "page": 1 })),
        );
        log.record("doc-2", AuditAction::NonceMint, AuditContext::default());

        let newest_first: Vec<_> = log
            .query("doc-1", &AuditQuery::default())
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            newest_first,
            vec![
                AuditAction::PageRequest,
                AuditAction::NonceConsume,
                AuditAction::NonceMint
            ]
        );

        let page = log
            .query(
                "doc-1",
                &AuditQuery {
                    action: None,
                    limit: 1,
                    offset: 1,
                },
            )
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].action, AuditAction::NonceConsume);

        let mints = log
            .query("doc-1", &AuditQuery::action(AuditAction::NonceMint))
            .unwrap();
        assert_eq!(mints.len(), 1);

        let session: Vec<_> = log
            .by_session("session-a")
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            session,
            vec![
                AuditAction::NonceMint,
                AuditAction::NonceConsume,
                AuditAction::PageRequest
            ]
        );
    }

    fn exercise_suspicious(backend: Arc<dyn AuditBackend>) {
        let (log, clock) = log_over(backend);

        // Outside the trailing window once the clock moves on.
        for _ in 0..10 {
            log.record("doc-1", AuditAction::InvalidNonce, client("9.9.9.9"));
        }
        clock.advance(Duration::minutes(90));

        for _ in 0..4 {
            log.record("doc-1", AuditAction::InvalidNonce, client("1.1.1.1"));
        }
        log.record("doc-1", AuditAction::AuthFail, client("1.1.1.1"));
        for _ in 0..7 {
            log.record("doc-2", AuditAction::InvalidNonce, client("2.2.2.2"));
        }
        for _ in 0..3 {
            log.record("doc-1", AuditAction::InvalidNonce, client("3.3.3.3"));
        }
        for _ in 0..6 {
            log.record("doc-1", AuditAction::PageRequest, client("4.4.4.4"));
            log.record("doc-1", AuditAction::InvalidNonce, AuditContext::default());
        }

        let clients = log.suspicious_clients(60, 5).unwrap();
        assert_eq!(
            clients,
            vec![
                SuspiciousClient {
                    client: "2.2.2.2".into(),
                    count: 7
                },
                SuspiciousClient {
                    client: "1.1.1.1".into(),
                    count: 5
                },
            ]
        );
    }

    #[test]
    fn memory_backend_orders_events() {
        exercise_ordering(Arc::new(MemoryAuditBackend::new()));
    }

    #[test]
    fn memory_backend_aggregates_suspicious_clients() {
        exercise_suspicious(Arc::new(MemoryAuditBackend::new()));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_backend_orders_events() {
        let db = crate::storage::SqliteDatabase::open_in_memory().unwrap();
        exercise_ordering(Arc::new(SqliteAuditBackend::new(Arc::new(db))));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_backend_aggregates_suspicious_clients() {
        let db = crate::storage::SqliteDatabase::open_in_memory().unwrap();
        exercise_suspicious(Arc::new(SqliteAuditBackend::new(Arc::new(db))));
    }

    struct UnavailableBackend;

    impl AuditBackend for UnavailableBackend {
        fn append(&self, _: &AuditEvent) -> std::result::Result<i64, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        fn query(
            &self,
            _: &str,
            _: &AuditQuery,
        ) -> std::result::Result<Vec<AuditEvent>, StoreError> {
            Ok(Vec::new())
        }

        fn by_session(&self, _: &str) -> std::result::Result<Vec<AuditEvent>, StoreError> {
            Ok(Vec::new())
        }

        fn count_by_client(
            &self,
            _: &[AuditAction],
            _: DateTime<Utc>,
            _: u64,
        ) -> std::result::Result<Vec<SuspiciousClient>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn failed_writes_are_counted_not_raised() {
        let (log, _) = log_over(Arc::new(UnavailableBackend));
        assert_eq!(log.record("doc-1", AuditAction::View, client("1.2.3.4")), None);
        assert_eq!(log.record("doc-1", AuditAction::View, client("1.2.3.4")), None);
        assert_eq!(log.failed_writes(), 2);
    }
}
