use chrono::{DateTime, Utc};

use crate::error::StoreError;

use super::types::NonceRecord;

/// Persistence for nonce records.
///
/// `consume` is the only way a record changes after insertion, and it must
/// be a single atomic conditional mutation: mark used where the nonce
/// matches, the document matches and the record is still unused. Of any
/// number of concurrent callers for the same nonce, exactly one gets
/// `Some(session_id)`.
pub trait NonceBackend: Send + Sync {
    fn insert(&self, record: &NonceRecord) -> Result<(), StoreError>;

    fn consume(&self, doc_id: &str, nonce: &str) -> Result<Option<String>, StoreError>;

    /// Non-consuming lookup. Never used for access decisions.
    fn get(&self, nonce: &str) -> Result<Option<NonceRecord>, StoreError>;

    /// Whether any nonce was ever issued for this (document, session) pair.
    fn has_session(&self, doc_id: &str, session_id: &str) -> Result<bool, StoreError>;

    /// Delete up to `limit` records issued strictly before `cutoff`,
    /// regardless of `used`. Returns how many were deleted.
    fn delete_issued_before(&self, cutoff: DateTime<Utc>, limit: usize)
        -> Result<usize, StoreError>;
}
