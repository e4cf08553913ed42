//! Stateless cryptographic primitives.
//!
//! HASH = SHA-256, DH = X25519, CIPHER = ChaCha20-Poly1305 (IETF, 96-bit
//! nonce). HKDF follows the Noise definition built directly on HMAC, not the
//! RFC 5869 expand/extract interface.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hmac::digest::generic_array::GenericArray;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::NoiseError;

/// Output length of SHA-256 and of every derived key.
pub const HASH_LEN: usize = 32;

/// Length of an X25519 public key and DH output.
pub const DH_LEN: usize = 32;

/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// Largest Noise message, handshake or transport.
pub const MAX_MESSAGE_LEN: usize = 65535;

/// HMAC-SHA256 block size.
const BLOCK_LEN: usize = 64;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; HASH_LEN] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of `parts`, without materialising it.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// HMAC-SHA256 (RFC 2104).
///
/// The key is zero-padded to the 64-byte block; keys longer than the block
/// are hashed first.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HASH_LEN] {
    let mut block = Zeroizing::new([0u8; BLOCK_LEN]);
    if key.len() > BLOCK_LEN {
        block[..HASH_LEN].copy_from_slice(&sha256(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut mac = <HmacSha256 as KeyInit>::new(GenericArray::from_slice(&block[..]));
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Noise HKDF with two outputs.
///
/// ```text
/// temp_key = HMAC(chaining_key, ikm)
/// out1     = HMAC(temp_key, 0x01)
/// out2     = HMAC(temp_key, out1 || 0x02)
/// ```
pub fn hkdf2(
    chaining_key: &[u8; HASH_LEN],
    input_key_material: &[u8],
) -> (Zeroizing<[u8; HASH_LEN]>, Zeroizing<[u8; HASH_LEN]>) {
    let temp_key = Zeroizing::new(hmac_sha256(chaining_key, input_key_material));
    let out1 = Zeroizing::new(hmac_sha256(&temp_key[..], &[0x01]));
    let out2 = Zeroizing::new(hkdf_next(&temp_key, &out1, 0x02));
    (out1, out2)
}

/// Noise HKDF with three outputs; `out3 = HMAC(temp_key, out2 || 0x03)`.
pub fn hkdf3(
    chaining_key: &[u8; HASH_LEN],
    input_key_material: &[u8],
) -> (
    Zeroizing<[u8; HASH_LEN]>,
    Zeroizing<[u8; HASH_LEN]>,
    Zeroizing<[u8; HASH_LEN]>,
) {
    let temp_key = Zeroizing::new(hmac_sha256(chaining_key, input_key_material));
    let out1 = Zeroizing::new(hmac_sha256(&temp_key[..], &[0x01]));
    let out2 = Zeroizing::new(hkdf_next(&temp_key, &out1, 0x02));
    let out3 = Zeroizing::new(hkdf_next(&temp_key, &out2, 0x03));
    (out1, out2, out3)
}

fn hkdf_next(temp_key: &[u8; HASH_LEN], previous: &[u8; HASH_LEN], counter: u8) -> [u8; HASH_LEN] {
    let mut input = Zeroizing::new([0u8; HASH_LEN + 1]);
    input[..HASH_LEN].copy_from_slice(previous);
    input[HASH_LEN] = counter;
    hmac_sha256(temp_key, &input[..])
}

/// X25519 scalar multiplication.
///
/// An all-zero result means the peer sent a low-order point; that is
/// rejected rather than mixed into the key schedule.
pub fn dh(secret: &StaticSecret, public: &[u8; DH_LEN]) -> Result<Zeroizing<[u8; DH_LEN]>, NoiseError> {
    let shared = secret.diffie_hellman(&PublicKey::from(*public));
    if !shared.was_contributory() {
        return Err(NoiseError::NonContributoryDh);
    }
    Ok(Zeroizing::new(shared.to_bytes()))
}

/// Noise nonce encoding: 32 zero bits followed by the little-endian counter.
pub fn nonce_from_counter(counter: u64) -> Nonce {
    let mut nonce_bytes = [0u8; 12];
    nonce_bytes[4..12].copy_from_slice(&counter.to_le_bytes());
    Nonce::from(nonce_bytes)
}

/// ChaCha20-Poly1305 encryption. Output is `ciphertext || tag`.
pub fn aead_encrypt(
    key: &[u8; 32],
    counter: u64,
    ad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, NoiseError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(
            &nonce_from_counter(counter),
            Payload {
                msg: plaintext,
                aad: ad,
            },
        )
        .map_err(|_| NoiseError::Encrypt)
}

/// ChaCha20-Poly1305 decryption.
///
/// Fails closed: either the whole authenticated plaintext or an error.
pub fn aead_decrypt(
    key: &[u8; 32],
    counter: u64,
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, NoiseError> {
    if ciphertext.len() < TAG_LEN {
        return Err(NoiseError::MessageTooShort {
            expected: TAG_LEN,
            got: ciphertext.len(),
        });
    }

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(
            &nonce_from_counter(counter),
            Payload {
                msg: ciphertext,
                aad: ad,
            },
        )
        .map_err(|_| NoiseError::Decrypt)
}
