//! Randomness source for the handshake.
//!
//! The provider is constructed by the caller and passed into the initiator
//! and the session, so there is no process-wide crypto initialisation to
//! order against.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::NoiseError;

/// Source of cryptographically secure random bytes.
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill_random(&self, dest: &mut [u8]) -> Result<(), NoiseError>;
}

/// Provider backed by the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProvider;

impl CryptoProvider for OsProvider {
    fn fill_random(&self, dest: &mut [u8]) -> Result<(), NoiseError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| NoiseError::Random(e.to_string()))
    }
}
