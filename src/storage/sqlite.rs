//! SQLite database handle shared by the nonce store and the audit log.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use crate::error::StoreError;

const SCHEMA_VERSION: i64 = 1;

/// A single SQLite connection behind a `parking_lot::Mutex`.
///
/// Each store operation takes the lock for exactly one statement or one
/// short transaction. SQLite's own row-level predicates provide the atomic
/// conditional updates; the mutex only serializes access to the connection.
pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS docshield_meta (
            schema_version  INTEGER NOT NULL,
            created_at      INTEGER NOT NULL
        );",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM docshield_meta LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(version) if version == SCHEMA_VERSION => ensure_tables(conn),
        Some(version) => Err(StoreError::Corrupt(format!(
            "unsupported schema version {version}, expected {SCHEMA_VERSION}"
        ))),
        None => {
            ensure_tables(conn)?;
            conn.execute(
                "INSERT INTO docshield_meta (schema_version, created_at)
                 VALUES (?1, CAST(strftime('%s','now') AS INTEGER) * 1000)",
                [SCHEMA_VERSION],
            )?;
            Ok(())
        }
    }
}

fn ensure_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS nonces (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id      TEXT    NOT NULL,
            nonce       TEXT    NOT NULL UNIQUE,
            session_id  TEXT    NOT NULL,
            used        INTEGER NOT NULL DEFAULT 0,
            issued_at   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_nonces_doc_id ON nonces (doc_id);
        CREATE INDEX IF NOT EXISTS idx_nonces_session_id ON nonces (session_id);
        CREATE INDEX IF NOT EXISTS idx_nonces_issued_at ON nonces (issued_at);

        CREATE TABLE IF NOT EXISTS access_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id      TEXT    NOT NULL,
            session_id  TEXT,
            client      TEXT,
            user_agent  TEXT,
            action      TEXT    NOT NULL,
            metadata    TEXT,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_access_logs_doc_id ON access_logs (doc_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_access_logs_action ON access_logs (action, created_at);
        CREATE INDEX IF NOT EXISTS idx_access_logs_session_id ON access_logs (session_id);",
    )?;
    Ok(())
}
