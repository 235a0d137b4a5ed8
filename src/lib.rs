//! Secure document delivery: single-use nonces, rate limiting, payload
//! decryption and forensic watermarking.

pub mod audit;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod maintenance;
pub mod nonce;
pub mod rate_limit;
pub mod render;
pub mod storage;
pub mod watermark;

pub use audit::{AccessAuditLog, AuditAction, AuditContext, AuditEvent, AuditQuery, SuspiciousClient};
pub use catalog::{
    DocumentCatalog, DocumentMetadata, DocumentStatus, FilePayloadSource, JsonRegistryCatalog,
    MemoryCatalog, MemoryPayloadSource, PayloadSource,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_master_key, DeliveryConfig, RateLimitConfig, SuspiciousConfig};
pub use error::{ConfigError, DeliveryError, Result, StoreError, WatermarkError};
pub use gateway::{
    ClientContext, DeliveredPage, DocumentView, MintedSession, SecureDelivery,
    SecureDeliveryBuilder,
};
pub use maintenance::{Maintenance, MaintenanceHandle, SweepReport};
pub use nonce::{MintedNonce, NonceRecord, NonceStore};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use render::{PageRasterizer, PngRasterizer, RenderError, RenderedPage};
#[cfg(feature = "sqlite")]
pub use storage::SqliteDatabase;
pub use watermark::{text_only, SessionFacts, WatermarkCompositor, WatermarkPolicy, WatermarkStyle};

pub use docshield_crypto as crypto;
