//! SQLite nonce backend.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::StoreError;
use crate::storage::{from_millis, to_millis, SqliteDatabase};

use super::traits::NonceBackend;
use super::types::NonceRecord;

pub struct SqliteNonceBackend {
    db: Arc<SqliteDatabase>,
}

impl SqliteNonceBackend {
    pub fn new(db: Arc<SqliteDatabase>) -> Self {
        Self { db }
    }
}

struct NonceRow {
    nonce: String,
    doc_id: String,
    session_id: String,
    used: bool,
    issued_at_ms: i64,
}

impl NonceRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            nonce: row.get("nonce")?,
            doc_id: row.get("doc_id")?,
            session_id: row.get("session_id")?,
            used: row.get::<_, i64>("used")? != 0,
            issued_at_ms: row.get("issued_at")?,
        })
    }

    fn into_record(self) -> Result<NonceRecord, StoreError> {
        Ok(NonceRecord {
            nonce: self.nonce,
            doc_id: self.doc_id,
            session_id: self.session_id,
            used: self.used,
            issued_at: from_millis(self.issued_at_ms)?,
        })
    }
}

impl NonceBackend for SqliteNonceBackend {
    fn insert(&self, record: &NonceRecord) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO nonces (doc_id, nonce, session_id, used, issued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.doc_id,
                    record.nonce,
                    record.session_id,
                    record.used,
                    to_millis(record.issued_at)
                ],
            )?;
            Ok(())
        })
    }

    fn consume(&self, doc_id: &str, nonce: &str) -> Result<Option<String>, StoreError> {
        // Check and mark in one statement; a separate SELECT would let two
        // callers both observe used = 0.
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "UPDATE nonces SET used = 1
                     WHERE nonce = ?1 AND doc_id = ?2 AND used = 0
                     RETURNING session_id",
                    params![nonce, doc_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn get(&self, nonce: &str) -> Result<Option<NonceRecord>, StoreError> {
        let found = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT nonce, doc_id, session_id, used, issued_at
                     FROM nonces WHERE nonce = ?1",
                    params![nonce],
                    NonceRow::read,
                )
                .optional()?)
        })?;
        found.map(NonceRow::into_record).transpose()
    }

    fn has_session(&self, doc_id: &str, session_id: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM nonces WHERE doc_id = ?1 AND session_id = ?2 LIMIT 1",
                    params![doc_id, session_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    fn delete_issued_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, StoreError> {
        // Bounded by the caller's batch size so the connection lock is
        // released between deletes.
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM nonces WHERE id IN (
                    SELECT id FROM nonces WHERE issued_at < ?1 LIMIT ?2
                 )",
                params![to_millis(cutoff), limit],
            )?)
        })
    }
}
