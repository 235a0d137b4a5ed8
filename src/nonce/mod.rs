//! Single-use nonce and viewing-session lifecycle.
//!
//! A nonce authorizes exactly one content request. The session id it was
//! minted with threads together every audit event and watermark stamp of a
//! viewing session and can outlive any single nonce (see
//! [`NonceStore::mint_for_session`]).

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use docshield_crypto::{generate_nonce_token, generate_session_bytes, is_well_formed_nonce};

use crate::clock::Clock;
use crate::error::{DeliveryError, Result};

pub use memory::MemoryNonceBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteNonceBackend;
pub use traits::NonceBackend;
pub use types::{session_prefix, MintedNonce, NonceRecord};

/// Default retention window for nonce records.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Rows removed per backend call during a sweep. Each call holds the
/// backend lock for one short delete, so requests interleave between batches.
const SWEEP_BATCH: usize = 100;

/// Generate a session identifier from 128 random bits, in UUID text form.
///
/// All 16 bytes come from the OS RNG. No version or variant bits are set,
/// so the value is opaque rather than a v4 UUID.
pub fn generate_session_id() -> Result<String> {
    Ok(uuid::Uuid::from_bytes(generate_session_bytes()?).to_string())
}

#[derive(Clone)]
pub struct NonceStore {
    backend: Arc<dyn NonceBackend>,
    clock: Arc<dyn Clock>,
}

impl NonceStore {
    pub fn new(backend: Arc<dyn NonceBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Mint a nonce for a new viewing session.
    pub fn mint(&self, doc_id: &str) -> Result<MintedNonce> {
        self.issue(doc_id, generate_session_id()?)
    }

    /// Mint a fresh nonce inside an existing session of the same document.
    pub fn mint_for_session(&self, doc_id: &str, session_id: &str) -> Result<MintedNonce> {
        if !self.backend.has_session(doc_id, session_id)? {
            return Err(DeliveryError::NotFound);
        }
        self.issue(doc_id, session_id.to_string())
    }

    fn issue(&self, doc_id: &str, session_id: String) -> Result<MintedNonce> {
        let record = NonceRecord {
            nonce: generate_nonce_token()?,
            doc_id: doc_id.to_string(),
            session_id,
            used: false,
            issued_at: self.clock.now(),
        };
        self.backend.insert(&record)?;
        tracing::debug!(
            doc_id,
            session = session_prefix(&record.session_id),
            "nonce minted"
        );
        Ok(MintedNonce::from(&record))
    }

    /// Atomically validate and consume a nonce, returning its session id.
    ///
    /// Unknown, already-used and wrong-document nonces all yield
    /// `DeliveryError::NotFound`. A token that is not even shaped like a
    /// nonce yields `DeliveryError::Validation` without touching the store.
    pub fn validate_and_consume(&self, doc_id: &str, nonce: &str) -> Result<String> {
        if !is_well_formed_nonce(nonce) {
            return Err(DeliveryError::Validation("malformed nonce".into()));
        }
        match self.backend.consume(doc_id, nonce)? {
            Some(session_id) => Ok(session_id),
            None => {
                tracing::debug!(doc_id, "nonce rejected");
                Err(DeliveryError::NotFound)
            }
        }
    }

    /// Non-consuming lookup for diagnostics. Never gate access on this.
    pub fn peek(&self, nonce: &str) -> Result<Option<NonceRecord>> {
        Ok(self.backend.get(nonce)?)
    }

    /// Diagnostic: whether the nonce exists, is unused and belongs to `doc_id`.
    pub fn is_valid(&self, doc_id: &str, nonce: &str) -> Result<bool> {
        Ok(self
            .backend
            .get(nonce)?
            .is_some_and(|r| r.doc_id == doc_id && !r.used))
    }

    /// Whether `session_id` was ever issued a nonce for `doc_id`.
    pub fn session_exists(&self, doc_id: &str, session_id: &str) -> Result<bool> {
        Ok(self.backend.has_session(doc_id, session_id)?)
    }

    /// Delete records older than `max_age_days`, used or not.
    ///
    /// Works in bounded batches so the backend lock is released between them.
    pub fn sweep_expired(&self, max_age_days: u32) -> Result<usize> {
        // A retention past the representable range keeps everything.
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(Duration::days(i64::from(max_age_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut total = 0;
        loop {
            let deleted = self.backend.delete_issued_before(cutoff, SWEEP_BATCH)?;
            total += deleted;
            if deleted < SWEEP_BATCH {
                break;
            }
        }
        if total > 0 {
            tracing::info!(deleted = total, max_age_days, "expired nonces swept");
        }
        Ok(total)
    }
}
