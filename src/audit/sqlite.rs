//! SQLite audit backend over the `access_logs` table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Row};

use crate::error::StoreError;
use crate::storage::{from_millis, to_millis, SqliteDatabase};

use super::traits::AuditBackend;
use super::types::{AuditAction, AuditEvent, AuditQuery, SuspiciousClient};

const COLUMNS: &str = "id, doc_id, session_id, client, user_agent, action, metadata, created_at";

pub struct SqliteAuditBackend {
    db: Arc<SqliteDatabase>,
}

impl SqliteAuditBackend {
    pub fn new(db: Arc<SqliteDatabase>) -> Self {
        Self { db }
    }

    fn select(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, AuditRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(AuditRow::into_event).collect()
    }
}

struct AuditRow {
    id: i64,
    doc_id: String,
    session_id: Option<String>,
    client: Option<String>,
    user_agent: Option<String>,
    action: String,
    metadata: Option<String>,
    created_at_ms: i64,
}

impl AuditRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            doc_id: row.get("doc_id")?,
            session_id: row.get("session_id")?,
            client: row.get("client")?,
            user_agent: row.get("user_agent")?,
            action: row.get("action")?,
            metadata: row.get("metadata")?,
            created_at_ms: row.get("created_at")?,
        })
    }

    fn into_event(self) -> Result<AuditEvent, StoreError> {
        let action = self
            .action
            .parse::<AuditAction>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(AuditEvent {
            id: Some(self.id),
            doc_id: self.doc_id,
            session_id: self.session_id,
            client: self.client,
            user_agent: self.user_agent,
            action,
            metadata,
            created_at: from_millis(self.created_at_ms)?,
        })
    }
}

impl AuditBackend for SqliteAuditBackend {
    fn append(&self, event: &AuditEvent) -> Result<i64, StoreError> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO access_logs
                    (doc_id, session_id, client, user_agent, action, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.doc_id,
                    event.session_id,
                    event.client,
                    event.user_agent,
                    event.action.as_str(),
                    metadata,
                    to_millis(event.created_at)
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn query(&self, doc_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>, StoreError> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        self.select(
            &format!(
                "SELECT {COLUMNS} FROM access_logs
                 WHERE doc_id = ?1 AND (?2 IS NULL OR action = ?2)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4"
            ),
            params![doc_id, query.action.map(AuditAction::as_str), limit, offset],
        )
    }

    fn by_session(&self, session_id: &str) -> Result<Vec<AuditEvent>, StoreError> {
        self.select(
            &format!(
                "SELECT {COLUMNS} FROM access_logs
                 WHERE session_id = ?1
                 ORDER BY created_at ASC, id ASC"
            ),
            params![session_id],
        )
    }

    fn count_by_client(
        &self,
        actions: &[AuditAction],
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<SuspiciousClient>, StoreError> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..actions.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT client, COUNT(*) AS n FROM access_logs
             WHERE client IS NOT NULL AND created_at >= ?1 AND action IN ({placeholders})
             GROUP BY client
             HAVING n >= ?2
             ORDER BY n DESC, client ASC"
        );

        let mut values = vec![
            SqlValue::Integer(to_millis(since)),
            SqlValue::Integer(i64::try_from(min_count).unwrap_or(i64::MAX)),
        ];
        values.extend(actions.iter().map(|a| SqlValue::Text(a.as_str().to_string())));

        let rows: Vec<(String, i64)> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .map(|(client, n)| SuspiciousClient {
                client,
                count: n.max(0) as u64,
            })
            .collect())
    }
}
