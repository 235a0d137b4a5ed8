/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// Smallest well-formed payload: IV plus tag with an empty ciphertext.
pub const MIN_PAYLOAD_LENGTH: usize = AES_GCM_IV_LENGTH + AES_GCM_TAG_LENGTH;

/// Nonce token length in random bytes (192 bits). Hex-encoded to 48 chars.
pub const NONCE_TOKEN_BYTES: usize = 24;

/// Session identifier length in random bytes (128 bits).
pub const SESSION_ID_BYTES: usize = 16;

/// Borrowed view of an encrypted payload split at its fixed offsets.
///
/// Layout: [IV:12][AuthTag:16][ciphertext]
#[derive(Debug, Clone, Copy)]
pub struct PayloadParts<'a> {
    pub iv: &'a [u8],
    pub tag: &'a [u8],
    pub ciphertext: &'a [u8],
}
