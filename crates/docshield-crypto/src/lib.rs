//! Authenticated encryption of document payloads.

pub mod aes_gcm;
pub mod error;
pub mod key;
pub mod random;
pub mod types;

pub use aes_gcm::{decrypt_payload, encrypt_payload, split_payload, PayloadCipher};
pub use error::CryptoError;
pub use key::{KeyMaterial, MASTER_KEY_ENV};
pub use random::{generate_iv, generate_nonce_token, generate_session_bytes, is_well_formed_nonce};
pub use types::{
    PayloadParts, AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH, MIN_PAYLOAD_LENGTH,
    NONCE_TOKEN_BYTES, SESSION_ID_BYTES,
};
