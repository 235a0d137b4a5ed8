//! Shared persistence plumbing for the SQLite-backed stores.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::StoreError;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

/// Timestamps are persisted as Unix milliseconds.
#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}
