//! Post-handshake transport cipher.
//!
//! One `CipherState` per direction. The nonce is an implicit counter that
//! both peers advance in lockstep, so the transport must deliver messages in
//! order and exactly once: a dropped, reordered or replayed message fails
//! authentication instead of being silently accepted.
//!
//! `CipherState` is deliberately neither `Clone` nor `Copy`. A `(key, nonce)`
//! pair must never be used twice, and unique ownership is what guarantees it.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::NoiseError;
use crate::primitives::{aead_decrypt, aead_encrypt, MAX_MESSAGE_LEN, TAG_LEN};

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherState {
    key: [u8; 32],
    nonce: u64,
}

impl CipherState {
    /// Create a cipher with `nonce = 0`.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key, nonce: 0 }
    }

    /// Encrypt one transport message (no associated data).
    ///
    /// Returns `plaintext.len() + 16` bytes. The nonce advances by one on
    /// success; an oversized plaintext is rejected without consuming a nonce.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        if plaintext.len() > MAX_MESSAGE_LEN - TAG_LEN {
            return Err(NoiseError::MessageTooLarge {
                size: plaintext.len() + TAG_LEN,
                max: MAX_MESSAGE_LEN,
            });
        }
        if self.nonce == u64::MAX {
            return Err(NoiseError::NonceExhausted);
        }

        let ciphertext = aead_encrypt(&self.key, self.nonce, &[], plaintext)?;
        self.nonce += 1;
        Ok(ciphertext)
    }

    /// Decrypt one transport message.
    ///
    /// The nonce advances only when a message authenticates. A failed
    /// decrypt leaves the counter where it was and returns no plaintext.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        if ciphertext.len() > MAX_MESSAGE_LEN {
            return Err(NoiseError::MessageTooLarge {
                size: ciphertext.len(),
                max: MAX_MESSAGE_LEN,
            });
        }
        if self.nonce == u64::MAX {
            return Err(NoiseError::NonceExhausted);
        }

        let plaintext = aead_decrypt(&self.key, self.nonce, &[], ciphertext)?;
        self.nonce += 1;
        Ok(plaintext)
    }

    /// Number of messages processed so far in this direction.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Wipe the key and counter. The cipher is unusable afterwards.
    pub fn erase(&mut self) {
        self.zeroize();
        self.nonce = u64::MAX;
    }
}

impl fmt::Debug for CipherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherState")
            .field("nonce", &self.nonce)
            .field("key", &"[redacted]")
            .finish()
    }
}
