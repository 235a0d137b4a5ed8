use chrono::{DateTime, Utc};
use docshield_crypto::CryptoError;
use thiserror::Error;

use crate::render::RenderError;

/// Failures of a persistence collaborator (the "transient store" class).
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid master key: {0}")]
    MasterKey(#[source] CryptoError),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("Image decode failed: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Image encode failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid watermark style: {0}")]
    InvalidStyle(String),
}

/// Outcome taxonomy of the secure-delivery path.
///
/// `NotFound` deliberately carries no detail: an unknown nonce, a nonce for
/// another document and an already-used nonce are indistinguishable.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    #[error("Payload authentication failed")]
    AuthenticationFailure,

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Watermark error: {0}")]
    Watermark(#[from] WatermarkError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<CryptoError> for DeliveryError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DataTooShort { .. } => Self::Validation(err.to_string()),
            CryptoError::DecryptionFailed(_) => Self::AuthenticationFailure,
            other => Self::Crypto(other),
        }
    }
}

pub type Result<T, E = DeliveryError> = std::result::Result<T, E>;
