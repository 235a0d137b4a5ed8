//! AES-256-GCM encryption for document payloads at rest.
//!
//! Wire format:
//! [12 bytes: IV][16 bytes: auth tag][N bytes: ciphertext]
//!
//! The tag sits before the ciphertext, so encryption is detached and the
//! pieces are concatenated by hand rather than using the `Aead` combined form.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::key::KeyMaterial;
use crate::random::generate_iv;
use crate::types::{PayloadParts, AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, MIN_PAYLOAD_LENGTH};

/// Split a payload at its fixed offsets. Rejects anything shorter than 28 bytes.
pub fn split_payload(payload: &[u8]) -> Result<PayloadParts<'_>, CryptoError> {
    if payload.len() < MIN_PAYLOAD_LENGTH {
        return Err(CryptoError::DataTooShort {
            min: MIN_PAYLOAD_LENGTH,
            got: payload.len(),
        });
    }
    let (iv, rest) = payload.split_at(AES_GCM_IV_LENGTH);
    let (tag, ciphertext) = rest.split_at(AES_GCM_TAG_LENGTH);
    Ok(PayloadParts {
        iv,
        tag,
        ciphertext,
    })
}

/// AES-256-GCM cipher bound to the process master key.
///
/// Built once at startup and shared by reference. Every `encrypt` call draws
/// a fresh IV; there is no API that accepts a caller-chosen IV.
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl PayloadCipher {
    pub fn new(key: &KeyMaterial) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext`, returning `[IV][tag][ciphertext]`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let iv = generate_iv()?;
        let nonce = Nonce::from_slice(&iv);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(MIN_PAYLOAD_LENGTH + buffer.len());
        result.extend_from_slice(&iv);
        result.extend_from_slice(&tag);
        result.extend_from_slice(&buffer);
        Ok(result)
    }

    /// Decrypt a payload produced by [`PayloadCipher::encrypt`].
    ///
    /// Fails closed: on tag mismatch the working buffer is wiped and no
    /// plaintext is returned.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let parts = split_payload(payload)?;
        let nonce = Nonce::from_slice(parts.iv);
        let tag = Tag::from_slice(parts.tag);

        let mut buffer = parts.ciphertext.to_vec();
        if let Err(e) = self
            .cipher
            .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
        {
            buffer.zeroize();
            return Err(CryptoError::DecryptionFailed(e.to_string()));
        }
        Ok(buffer)
    }
}

/// One-shot encrypt with the given key.
pub fn encrypt_payload(plaintext: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    PayloadCipher::new(key)?.encrypt(plaintext)
}

/// One-shot decrypt with the given key.
pub fn decrypt_payload(payload: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    PayloadCipher::new(key)?.decrypt(payload)
}
