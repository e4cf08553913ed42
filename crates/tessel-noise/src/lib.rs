//! Noise NK initiator for Tessel.
//!
//! This crate provides:
//! - SHA-256 / HMAC / HKDF / X25519 / ChaCha20-Poly1305 primitives
//! - The Noise symmetric state (`mix_hash`, `mix_key`, `split`, ...)
//! - A two-message NK handshake, initiator side only
//! - Post-handshake transport ciphers with a strictly monotonic nonce
//!
//! # Design
//!
//! Uses the Noise NK pattern (`Noise_NK_25519_ChaChaPoly_SHA256`):
//! - The responder's static key is known up front (from remote attestation)
//! - The initiator stays anonymous; it never sends a static key
//! - Forward secrecy comes from the ephemeral-ephemeral DH
//!
//! Transport messages carry no explicit nonce. Both peers count messages,
//! so delivery must be ordered and lossless (one WebSocket frame per
//! message). Any reordering, loss or replay surfaces as an authentication
//! failure.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod error;
pub mod handshake;
pub mod keys;
pub mod primitives;
pub mod provider;
pub mod symmetric;

pub use cipher::CipherState;
pub use error::NoiseError;
pub use handshake::{AwaitingResponse, HandshakeResult, NkInitiator, MESSAGE_1_LEN, PROTOCOL_NAME};
pub use keys::{EphemeralKeypair, StaticPublicKey};
pub use provider::{CryptoProvider, OsProvider};
pub use symmetric::SymmetricState;
