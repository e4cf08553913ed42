//! X25519 key types.
//!
//! A [`StaticPublicKey`] is the responder's long-term key as published by
//! remote attestation. It arrives as text (base64 from the attestation
//! document, hex from static configuration) and must decode to exactly
//! 32 bytes.
//!
//! # Example
//!
//! ```
//! use tessel_noise::keys::StaticPublicKey;
//!
//! let key = StaticPublicKey::parse("36L4r40repT+jwL6+x65lUQtUv/MC/SJa+JNR+b7dEk=").unwrap();
//! assert_eq!(key.to_string(), "36L4r40repT+jwL6+x65lUQtUv/MC/SJa+JNR+b7dEk=");
//! ```

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::NoiseError;
use crate::primitives::DH_LEN;
use crate::provider::CryptoProvider;

/// Attempts before giving up on drawing a usable ephemeral key.
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// The responder's static X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticPublicKey([u8; DH_LEN]);

impl StaticPublicKey {
    /// Wrap raw key bytes. The all-zero key is rejected.
    pub fn from_bytes(bytes: [u8; DH_LEN]) -> Result<Self, NoiseError> {
        if is_all_zero(&bytes) {
            return Err(NoiseError::InvalidKey("all-zero public key".into()));
        }
        Ok(Self(bytes))
    }

    /// Parse a key from base64 (standard or URL-safe, padded or not) or hex.
    pub fn parse(s: &str) -> Result<Self, NoiseError> {
        let s = s.trim();

        let decoded = if s.len() == DH_LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(s).map_err(|e| NoiseError::InvalidKey(format!("invalid hex: {e}")))?
        } else {
            [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
                .iter()
                .find_map(|engine| engine.decode(s).ok())
                .ok_or_else(|| NoiseError::InvalidKey("not valid base64 or hex".into()))?
        };

        let bytes: [u8; DH_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            NoiseError::InvalidKey(format!("expected {DH_LEN} bytes, got {}", v.len()))
        })?;

        Self::from_bytes(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; DH_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for StaticPublicKey {
    type Err = NoiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StaticPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD.encode(self.0))
    }
}

impl fmt::Debug for StaticPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticPublicKey({})", self.to_hex())
    }
}

/// Single-handshake X25519 keypair.
///
/// The secret is zeroized when the keypair is dropped, which happens as soon
/// as the handshake has consumed it.
pub struct EphemeralKeypair {
    secret: StaticSecret,
    public: [u8; DH_LEN],
}

impl EphemeralKeypair {
    /// Draw a fresh keypair from `provider`.
    ///
    /// All-zero seeds and all-zero public keys are discarded and redrawn.
    pub fn generate(provider: &dyn CryptoProvider) -> Result<Self, NoiseError> {
        for _ in 0..MAX_KEYGEN_ATTEMPTS {
            let mut seed = Zeroizing::new([0u8; DH_LEN]);
            provider.fill_random(&mut seed[..])?;
            if is_all_zero(&seed[..]) {
                continue;
            }

            let secret = StaticSecret::from(*seed);
            let public = *PublicKey::from(&secret).as_bytes();
            if is_all_zero(&public) {
                continue;
            }

            return Ok(Self { secret, public });
        }

        Err(NoiseError::DegenerateKey)
    }

    /// Public half, sent in the clear as the first 32 bytes of message 1.
    pub fn public(&self) -> &[u8; DH_LEN] {
        &self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public", &hex::encode(self.public))
            .field("secret", &"[redacted]")
            .finish()
    }
}

fn is_all_zero(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, b| acc | b) == 0
}
