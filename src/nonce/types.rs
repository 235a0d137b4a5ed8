use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted single-use token.
///
/// `used` flips to `true` exactly once and never back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRecord {
    pub nonce: String,
    pub doc_id: String,
    pub session_id: String,
    pub used: bool,
    pub issued_at: DateTime<Utc>,
}

/// What `mint` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedNonce {
    pub nonce: String,
    pub session_id: String,
    pub doc_id: String,
    pub issued_at: DateTime<Utc>,
}

impl From<&NonceRecord> for MintedNonce {
    fn from(record: &NonceRecord) -> Self {
        Self {
            nonce: record.nonce.clone(),
            session_id: record.session_id.clone(),
            doc_id: record.doc_id.clone(),
            issued_at: record.issued_at,
        }
    }
}

/// Short, log-safe form of a session id.
pub fn session_prefix(session_id: &str) -> &str {
    match session_id.char_indices().nth(8) {
        Some((idx, _)) => &session_id[..idx],
        None => session_id,
    }
}
