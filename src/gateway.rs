//! The secure-delivery flow.
//!
//! [`SecureDelivery`] ties the components together behind the client-facing
//! contract: mint a session, present each nonce once, receive a decrypted and
//! watermarked page. Every rejection is written to the audit log before the
//! error is returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docshield_crypto::{CryptoError, KeyMaterial, PayloadCipher};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{
    AccessAuditLog, AuditAction, AuditBackend, AuditContext, AuditEvent, AuditQuery,
    MemoryAuditBackend, SuspiciousClient,
};
use crate::catalog::{DocumentCatalog, DocumentMetadata, PayloadSource};
use crate::clock::{Clock, SystemClock};
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, Result};
use crate::maintenance::Maintenance;
use crate::nonce::{session_prefix, MemoryNonceBackend, NonceBackend, NonceStore};
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::render::PageRasterizer;
use crate::watermark::{text_only, SessionFacts, WatermarkCompositor, WatermarkPolicy};

/// Rate-limit endpoint for minting and continuing sessions.
pub const MINT_ENDPOINT: &str = "mint";
/// Rate-limit endpoint for nonce-gated content requests.
pub const CONTENT_ENDPOINT: &str = "content";

/// Rate-limit key used when the caller has no client identity.
const ANONYMOUS_CLIENT: &str = "unknown";

// ============================================================================
// Request / response types
// ============================================================================

/// Who is asking, as derived from the request origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub client: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: Some(client.into()),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    fn rate_key(&self) -> &str {
        self.client.as_deref().unwrap_or(ANONYMOUS_CLIENT)
    }

    fn audit(&self) -> AuditContext {
        AuditContext::default().with_client(self.client.as_deref(), self.user_agent.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedSession {
    pub nonce: String,
    pub session_id: String,
    pub doc_id: String,
    pub issued_at: DateTime<Utc>,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub doc_id: String,
    pub title: String,
    pub content_type: String,
    pub page_count: Option<u32>,
    pub watermark_policy: WatermarkPolicy,
    pub session_id: String,
    pub watermark_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredPage {
    /// PNG-encoded, watermarked page.
    pub png: Vec<u8>,
    pub page: u32,
    pub page_count: u32,
    pub session_id: String,
    pub watermark_text: String,
}

// ============================================================================
// Builder
// ============================================================================

pub struct SecureDeliveryBuilder {
    key: KeyMaterial,
    catalog: Arc<dyn DocumentCatalog>,
    payloads: Arc<dyn PayloadSource>,
    rasterizer: Arc<dyn PageRasterizer>,
    config: DeliveryConfig,
    clock: Arc<dyn Clock>,
    nonce_backend: Option<Arc<dyn NonceBackend>>,
    audit_backend: Option<Arc<dyn AuditBackend>>,
}

impl SecureDeliveryBuilder {
    pub fn config(mut self, config: DeliveryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn nonce_backend(mut self, backend: Arc<dyn NonceBackend>) -> Self {
        self.nonce_backend = Some(backend);
        self
    }

    pub fn audit_backend(mut self, backend: Arc<dyn AuditBackend>) -> Self {
        self.audit_backend = Some(backend);
        self
    }

    /// Persist nonces and audit events in one SQLite database.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(self, db: Arc<crate::storage::SqliteDatabase>) -> Self {
        self.nonce_backend(Arc::new(crate::nonce::SqliteNonceBackend::new(db.clone())))
            .audit_backend(Arc::new(crate::audit::SqliteAuditBackend::new(db)))
    }

    pub fn build(self) -> Result<SecureDelivery> {
        let cipher = PayloadCipher::new(&self.key)?;
        let compositor = WatermarkCompositor::new(&self.config.watermark)?;
        let nonce_backend = self
            .nonce_backend
            .unwrap_or_else(|| Arc::new(MemoryNonceBackend::new()));
        let audit_backend = self
            .audit_backend
            .unwrap_or_else(|| Arc::new(MemoryAuditBackend::new()));

        Ok(SecureDelivery {
            nonces: NonceStore::new(nonce_backend, self.clock.clone()),
            limiter: Arc::new(RateLimiter::new(self.config.rate_limit, self.clock.clone())),
            audit: AccessAuditLog::new(audit_backend, self.clock.clone()),
            cipher,
            compositor,
            catalog: self.catalog,
            payloads: self.payloads,
            rasterizer: self.rasterizer,
            clock: self.clock,
            config: self.config,
        })
    }
}

// ============================================================================
// SecureDelivery
// ============================================================================

pub struct SecureDelivery {
    nonces: NonceStore,
    limiter: Arc<RateLimiter>,
    audit: AccessAuditLog,
    cipher: PayloadCipher,
    compositor: WatermarkCompositor,
    catalog: Arc<dyn DocumentCatalog>,
    payloads: Arc<dyn PayloadSource>,
    rasterizer: Arc<dyn PageRasterizer>,
    clock: Arc<dyn Clock>,
    config: DeliveryConfig,
}

impl SecureDelivery {
    /// Start building. Backends default to the in-memory ones, the clock to
    /// the system clock and the configuration to its defaults.
    pub fn builder(
        key: KeyMaterial,
        catalog: Arc<dyn DocumentCatalog>,
        payloads: Arc<dyn PayloadSource>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> SecureDeliveryBuilder {
        SecureDeliveryBuilder {
            key,
            catalog,
            payloads,
            rasterizer,
            config: DeliveryConfig::default(),
            clock: Arc::new(SystemClock),
            nonce_backend: None,
            audit_backend: None,
        }
    }

    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn audit(&self) -> &AccessAuditLog {
        &self.audit
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Sweeper over this instance's nonce store and rate limiter.
    pub fn maintenance(&self) -> Maintenance {
        Maintenance::new(
            self.nonces.clone(),
            self.limiter.clone(),
            self.config.nonce_retention_days,
        )
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Open a new viewing session on an active document.
    pub fn mint_session(&self, doc_id: &str, client: &ClientContext) -> Result<MintedSession> {
        let decision = self.admit(doc_id, client, MINT_ENDPOINT)?;
        self.active_document(doc_id)?;

        let minted = self.nonces.mint(doc_id)?;
        self.audit.record(
            doc_id,
            AuditAction::NonceMint,
            client.audit().with_session(&minted.session_id),
        );
        Ok(MintedSession {
            nonce: minted.nonce,
            session_id: minted.session_id,
            doc_id: minted.doc_id,
            issued_at: minted.issued_at,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        })
    }

    /// Issue the next nonce of an existing session.
    pub fn continue_session(
        &self,
        doc_id: &str,
        session_id: &str,
        client: &ClientContext,
    ) -> Result<MintedSession> {
        let decision = self.admit(doc_id, client, MINT_ENDPOINT)?;
        self.active_document(doc_id)?;

        let minted = self.nonces.mint_for_session(doc_id, session_id)?;
        self.audit.record(
            doc_id,
            AuditAction::NonceMint,
            client
                .audit()
                .with_session(session_id)
                .with_metadata(json!({ "continued": true })),
        );
        Ok(MintedSession {
            nonce: minted.nonce,
            session_id: minted.session_id,
            doc_id: minted.doc_id,
            issued_at: minted.issued_at,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        })
    }

    // ------------------------------------------------------------------------
    // Nonce-gated content
    // ------------------------------------------------------------------------

    /// Consume `nonce` and return the document's viewer metadata.
    pub fn open_document(
        &self,
        doc_id: &str,
        nonce: &str,
        client: &ClientContext,
    ) -> Result<DocumentView> {
        let (document, session_id) = self.consume(doc_id, nonce, client, json!({ "kind": "document" }))?;
        let facts = self.facts(&session_id, client);
        let watermark_text = text_only(&facts, &document.watermark_policy);
        Ok(DocumentView {
            doc_id: document.doc_id,
            title: document.title,
            content_type: document.content_type,
            page_count: document.page_count,
            watermark_policy: document.watermark_policy,
            session_id,
            watermark_text,
        })
    }

    /// Consume `nonce` and deliver one watermarked page (1-based).
    pub fn deliver_page(
        &self,
        doc_id: &str,
        nonce: &str,
        page: u32,
        client: &ClientContext,
    ) -> Result<DeliveredPage> {
        if page == 0 {
            return Err(DeliveryError::Validation("page numbers start at 1".into()));
        }
        let (document, session_id) =
            self.consume(doc_id, nonce, client, json!({ "kind": "page", "page": page }))?;

        let stored = self.payloads.load(&document)?;
        let content = if document.is_encrypted {
            self.decrypt(&document, &stored, &session_id, client)?
        } else {
            stored
        };

        let rendered = self.rasterizer.render_page(&content, page)?;
        let facts = self.facts(&session_id, client);
        let (png, watermark_text) =
            self.compositor
                .composite(rendered.image, &facts, &document.watermark_policy)?;

        self.audit.record(
            doc_id,
            AuditAction::PageRequest,
            client.audit().with_session(&session_id).with_metadata(json!({
                "page": page,
                "pageCount": rendered.page_count,
                "watermark": watermark_text,
            })),
        );
        Ok(DeliveredPage {
            png,
            page,
            page_count: rendered.page_count,
            session_id,
            watermark_text,
        })
    }

    // ------------------------------------------------------------------------
    // Client signals and audit queries
    // ------------------------------------------------------------------------

    /// Record a viewer-reported signal (capture detected, fullscreen exit, ...)
    /// against an existing session.
    pub fn report_event(
        &self,
        doc_id: &str,
        session_id: &str,
        action: AuditAction,
        client: &ClientContext,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if !action.is_client_signal() {
            return Err(DeliveryError::Validation(format!(
                "{action} cannot be reported by a client"
            )));
        }
        if !self.nonces.session_exists(doc_id, session_id)? {
            return Err(DeliveryError::NotFound);
        }

        let mut context = client.audit().with_session(session_id);
        context.metadata = metadata;
        self.audit.record(doc_id, action, context);
        if action == AuditAction::CaptureDetected {
            tracing::warn!(
                doc_id,
                session = session_prefix(session_id),
                "screen capture reported"
            );
        }
        Ok(())
    }

    pub fn access_log(&self, doc_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        self.audit.query(doc_id, query)
    }

    pub fn session_log(&self, session_id: &str) -> Result<Vec<AuditEvent>> {
        self.audit.by_session(session_id)
    }

    /// Clients over the configured rejected-access threshold.
    pub fn suspicious_clients(&self) -> Result<Vec<SuspiciousClient>> {
        let thresholds = self.config.suspicious;
        self.audit
            .suspicious_clients(thresholds.since_minutes, thresholds.min_failures)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn admit(
        &self,
        doc_id: &str,
        client: &ClientContext,
        endpoint: &str,
    ) -> Result<RateLimitDecision> {
        let decision = self.limiter.check_default(client.rate_key(), endpoint);
        if decision.allowed {
            return Ok(decision);
        }
        self.audit.record(
            doc_id,
            AuditAction::RateLimited,
            client.audit().with_metadata(json!({
                "endpoint": endpoint,
                "resetAt": decision.reset_at,
            })),
        );
        Err(DeliveryError::RateLimited {
            reset_at: decision.reset_at,
        })
    }

    fn active_document(&self, doc_id: &str) -> Result<DocumentMetadata> {
        match self.catalog.document(doc_id)? {
            Some(document) if document.is_active() => Ok(document),
            _ => Err(DeliveryError::NotFound),
        }
    }

    /// Rate-limit, check the document and atomically consume the nonce.
    ///
    /// Unknown documents, malformed nonces and unusable nonces are all
    /// audited as `invalid_nonce`.
    fn consume(
        &self,
        doc_id: &str,
        nonce: &str,
        client: &ClientContext,
        request: serde_json::Value,
    ) -> Result<(DocumentMetadata, String)> {
        self.admit(doc_id, client, CONTENT_ENDPOINT)?;

        let outcome = self
            .active_document(doc_id)
            .and_then(|document| {
                let session_id = self.nonces.validate_and_consume(doc_id, nonce)?;
                Ok((document, session_id))
            });

        match outcome {
            Ok((document, session_id)) => {
                self.audit.record(
                    doc_id,
                    AuditAction::NonceConsume,
                    client
                        .audit()
                        .with_session(&session_id)
                        .with_metadata(request),
                );
                Ok((document, session_id))
            }
            Err(e @ (DeliveryError::NotFound | DeliveryError::Validation(_))) => {
                tracing::debug!(doc_id, client = client.rate_key(), "nonce rejected");
                self.audit.record(
                    doc_id,
                    AuditAction::InvalidNonce,
                    client.audit().with_metadata(request),
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn decrypt(
        &self,
        document: &DocumentMetadata,
        stored: &[u8],
        session_id: &str,
        client: &ClientContext,
    ) -> Result<Vec<u8>> {
        match self.cipher.decrypt(stored) {
            Ok(plaintext) => Ok(plaintext),
            Err(e @ (CryptoError::DecryptionFailed(_) | CryptoError::DataTooShort { .. })) => {
                tracing::error!(
                    doc_id = %document.doc_id,
                    session = session_prefix(session_id),
                    error = %e,
                    "stored payload failed authentication"
                );
                self.audit.record(
                    &document.doc_id,
                    AuditAction::AuthFail,
                    client.audit().with_session(session_id),
                );
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn facts(&self, session_id: &str, client: &ClientContext) -> SessionFacts {
        SessionFacts {
            client_ip: client.client.clone(),
            timestamp: Some(self.clock.now()),
            session_id: Some(session_id.to_string()),
        }
    }
}
