//! Random IVs and single-use nonce tokens.

use crate::error::CryptoError;
use crate::types::{AES_GCM_IV_LENGTH, NONCE_TOKEN_BYTES, SESSION_ID_BYTES};

/// Generate a random 12-byte IV for AES-GCM.
pub fn generate_iv() -> Result<[u8; AES_GCM_IV_LENGTH], CryptoError> {
    let mut iv = [0u8; AES_GCM_IV_LENGTH];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(iv)
}

/// Generate a 192-bit nonce token, hex-encoded (48 lowercase chars).
pub fn generate_nonce_token() -> Result<String, CryptoError> {
    let mut bytes = [0u8; NONCE_TOKEN_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Draw 128 fully random bits for a session identifier.
pub fn generate_session_bytes() -> Result<[u8; SESSION_ID_BYTES], CryptoError> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(bytes)
}

/// Whether `token` has the shape of a nonce produced by [`generate_nonce_token`].
pub fn is_well_formed_nonce(token: &str) -> bool {
    token.len() == NONCE_TOKEN_BYTES * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
