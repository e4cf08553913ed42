//! Noise NK handshake, initiator side.
//!
//! The responder's static key is known ahead of time (remote attestation),
//! so it is mixed in as a pre-message and never sent. The initiator has no
//! static key at all.
//!
//! # Handshake Flow
//!
//! ```text
//! Initiator (Client)                    Responder (Enclave)
//!     |                                       |
//!     |  <- s                                 |  pre-message (attested key)
//!     |  ...                                  |
//!     |  -> e, es                             |  32B ephemeral + 16B tag
//!     |-------------------------------------->|
//!     |                                       |
//!     |  <- e, ee                             |  32B ephemeral + [payload]
//!     |<--------------------------------------|
//!     |                                       |
//!     [  split(): send = c1, recv = c2        ]
//! ```
//!
//! The initiator is a typestate: [`NkInitiator::write_message_1`] consumes
//! the initiator and returns an [`AwaitingResponse`], which in turn is
//! consumed by [`AwaitingResponse::read_message_2`]. A failed step leaves
//! nothing behind to resume; the caller starts over with a fresh ephemeral.

use std::fmt;

use tracing::debug;

use crate::cipher::CipherState;
use crate::error::NoiseError;
use crate::keys::{EphemeralKeypair, StaticPublicKey};
use crate::primitives::{dh, DH_LEN, HASH_LEN, MAX_MESSAGE_LEN, TAG_LEN};
use crate::provider::CryptoProvider;
use crate::symmetric::SymmetricState;

/// Protocol name mixed into the initial hash. Any change of primitive must
/// change this string.
pub const PROTOCOL_NAME: &str = "Noise_NK_25519_ChaChaPoly_SHA256";

/// Size of message 1 with an empty payload: ephemeral key + tag.
pub const MESSAGE_1_LEN: usize = DH_LEN + TAG_LEN;

/// Output of a completed handshake.
///
/// `send` protects initiator-to-responder traffic, `recv` the reverse. The
/// two must never be swapped or shared.
pub struct HandshakeResult {
    pub send: CipherState,
    pub recv: CipherState,
    /// Final transcript hash, usable for channel binding.
    pub handshake_hash: [u8; HASH_LEN],
    /// Decrypted responder payload from message 2 (often empty).
    pub payload: Vec<u8>,
}

impl fmt::Debug for HandshakeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeResult")
            .field("send", &self.send)
            .field("recv", &self.recv)
            .field("handshake_hash", &hex::encode(self.handshake_hash))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// NK initiator before message 1 has been written.
pub struct NkInitiator {
    symmetric: SymmetricState,
    remote_static: StaticPublicKey,
    ephemeral: EphemeralKeypair,
}

impl NkInitiator {
    /// Initialise with an empty prologue, process the `<- s` pre-message and
    /// draw the ephemeral keypair.
    pub fn new(
        provider: &dyn CryptoProvider,
        remote_static: &StaticPublicKey,
    ) -> Result<Self, NoiseError> {
        Self::with_prologue(provider, remote_static, &[])
    }

    /// Like [`NkInitiator::new`], binding `prologue` into the transcript.
    /// The responder must use the same prologue or message 1 fails to
    /// authenticate.
    pub fn with_prologue(
        provider: &dyn CryptoProvider,
        remote_static: &StaticPublicKey,
        prologue: &[u8],
    ) -> Result<Self, NoiseError> {
        let mut symmetric = SymmetricState::initialize(PROTOCOL_NAME.as_bytes());
        // The prologue is always mixed, even when empty.
        symmetric.mix_hash(prologue);
        symmetric.mix_hash(remote_static.as_bytes());

        let ephemeral = EphemeralKeypair::generate(provider)?;

        Ok(Self {
            symmetric,
            remote_static: *remote_static,
            ephemeral,
        })
    }

    /// Public half of the ephemeral key that message 1 will carry.
    pub fn ephemeral_public(&self) -> &[u8; DH_LEN] {
        self.ephemeral.public()
    }

    /// Write message 1 (`-> e, es`) with an empty payload.
    ///
    /// The result is always exactly [`MESSAGE_1_LEN`] bytes.
    pub fn write_message_1(self) -> Result<(AwaitingResponse, Vec<u8>), NoiseError> {
        let Self {
            mut symmetric,
            remote_static,
            ephemeral,
        } = self;

        let mut message = Vec::with_capacity(MESSAGE_1_LEN);

        // e
        message.extend_from_slice(ephemeral.public());
        symmetric.mix_hash(ephemeral.public());

        // es
        let es = dh(ephemeral.secret(), remote_static.as_bytes())?;
        symmetric.mix_key(&es[..]);
        drop(es);

        // payload
        let payload = symmetric.encrypt_and_hash(&[])?;
        message.extend_from_slice(&payload);

        debug!(len = message.len(), "wrote NK message 1");

        Ok((
            AwaitingResponse {
                symmetric,
                ephemeral,
            },
            message,
        ))
    }
}

impl fmt::Debug for NkInitiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NkInitiator")
            .field("remote_static", &self.remote_static)
            .field("ephemeral", &self.ephemeral)
            .finish()
    }
}

/// NK initiator that has sent message 1 and waits for the responder.
pub struct AwaitingResponse {
    symmetric: SymmetricState,
    ephemeral: EphemeralKeypair,
}

impl AwaitingResponse {
    /// Read message 2 (`<- e, ee`) and split into transport ciphers.
    ///
    /// The message must hold at least the responder's 32-byte ephemeral key.
    /// Any bytes after it are an authenticated payload; zero remaining bytes
    /// means no payload and no decryption.
    pub fn read_message_2(self, message: &[u8]) -> Result<HandshakeResult, NoiseError> {
        let Self {
            mut symmetric,
            ephemeral,
        } = self;

        if message.len() < DH_LEN {
            return Err(NoiseError::MessageTooShort {
                expected: DH_LEN,
                got: message.len(),
            });
        }
        if message.len() > MAX_MESSAGE_LEN {
            return Err(NoiseError::MessageTooLarge {
                size: message.len(),
                max: MAX_MESSAGE_LEN,
            });
        }

        let (re, rest) = message.split_at(DH_LEN);
        let mut remote_ephemeral = [0u8; DH_LEN];
        remote_ephemeral.copy_from_slice(re);

        // e
        symmetric.mix_hash(&remote_ephemeral);

        // ee
        let ee = dh(ephemeral.secret(), &remote_ephemeral)?;
        symmetric.mix_key(&ee[..]);
        drop(ee);
        drop(ephemeral);

        // payload
        let payload = if rest.is_empty() {
            Vec::new()
        } else {
            symmetric.decrypt_and_hash(rest)?
        };

        let handshake_hash = symmetric.handshake_hash();
        let (send, recv) = symmetric.split();

        debug!(
            len = message.len(),
            payload_len = payload.len(),
            "read NK message 2, handshake complete"
        );

        Ok(HandshakeResult {
            send,
            recv,
            handshake_hash,
            payload,
        })
    }
}

impl fmt::Debug for AwaitingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwaitingResponse")
            .field("ephemeral", &self.ephemeral)
            .finish()
    }
}
