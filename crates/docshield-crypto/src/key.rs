//! Process-wide 256-bit key material.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::types::AES_KEY_LENGTH;

/// Environment variable holding the hex-encoded master key.
pub const MASTER_KEY_ENV: &str = "ENCRYPTION_MASTER_KEY";

/// A single 256-bit secret used for every document payload.
///
/// The bytes are wiped on drop and never appear in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; AES_KEY_LENGTH]);

impl KeyMaterial {
    /// Build key material from raw bytes. Must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; AES_KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: AES_KEY_LENGTH,
                    got: bytes.len(),
                })?;
        Ok(Self(key))
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim();
        if trimmed.len() != AES_KEY_LENGTH * 2 {
            return Err(CryptoError::InvalidKeyLength {
                expected: AES_KEY_LENGTH,
                got: trimmed.len() / 2,
            });
        }
        let mut bytes =
            hex::decode(trimmed).map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Load the master key from `ENCRYPTION_MASTER_KEY`.
    pub fn from_env() -> Result<Self, CryptoError> {
        let mut value = std::env::var(MASTER_KEY_ENV).map_err(|_| {
            CryptoError::InvalidKeyEncoding(format!("{MASTER_KEY_ENV} is not set"))
        })?;
        let key = Self::from_hex(&value);
        value.zeroize();
        key
    }

    /// Generate a fresh random key.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut key = [0u8; AES_KEY_LENGTH];
        getrandom::getrandom(&mut key).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
        Ok(Self(key))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}
