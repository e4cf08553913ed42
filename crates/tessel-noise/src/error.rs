//! Errors raised by the handshake and transport ciphers.

use thiserror::Error;

/// Noise protocol errors.
///
/// Every variant is fatal for the object that raised it: a failed handshake
/// must be restarted from scratch, a failed transport decrypt ends the session.
#[derive(Debug, Error)]
pub enum NoiseError {
    #[error("message too short: expected at least {expected} bytes, got {got}")]
    MessageTooShort { expected: usize, got: usize },

    #[error("message too large: {size} bytes exceeds maximum of {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("decryption failed: authentication tag mismatch")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,

    #[error("nonce counter exhausted")]
    NonceExhausted,

    #[error("degenerate key material generated")]
    DegenerateKey,

    #[error("non-contributory DH result")]
    NonContributoryDh,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("random number generator failed: {0}")]
    Random(String),
}
