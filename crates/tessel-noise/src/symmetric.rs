//! Noise symmetric state.
//!
//! Holds the running transcript hash `h`, the chaining key `ck`, and once a
//! DH output has been mixed in, the handshake cipher key `k` with its
//! counter `n`. Lives for exactly one handshake attempt: [`SymmetricState::split`]
//! consumes it, and everything it held is zeroized on drop.

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::CipherState;
use crate::error::NoiseError;
use crate::primitives::{aead_decrypt, aead_encrypt, hkdf2, sha256, sha256_concat, HASH_LEN};

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricState {
    h: [u8; HASH_LEN],
    ck: [u8; HASH_LEN],
    k: Option<[u8; 32]>,
    n: u64,
}

impl SymmetricState {
    /// `InitializeSymmetric(protocol_name)`.
    ///
    /// Names of up to 32 bytes are zero-padded into `h`; longer names are
    /// hashed. `ck` starts equal to `h`.
    pub fn initialize(protocol_name: &[u8]) -> Self {
        let h = if protocol_name.len() <= HASH_LEN {
            let mut h = [0u8; HASH_LEN];
            h[..protocol_name.len()].copy_from_slice(protocol_name);
            h
        } else {
            sha256(protocol_name)
        };

        Self {
            h,
            ck: h,
            k: None,
            n: 0,
        }
    }

    /// `h = SHA256(h || data)`.
    pub fn mix_hash(&mut self, data: &[u8]) {
        self.h = sha256_concat(&[&self.h[..], data]);
    }

    /// `(ck, k) = HKDF(ck, ikm, 2)`; resets `n` to zero.
    pub fn mix_key(&mut self, input_key_material: &[u8]) {
        let (ck, k) = hkdf2(&self.ck, input_key_material);
        self.ck = *ck;
        self.k = Some(*k);
        self.n = 0;
    }

    /// Encrypt with `h` as associated data, then mix the ciphertext into `h`.
    ///
    /// Before the first `mix_key` this is the identity on `plaintext` and
    /// only updates `h`.
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let Some(key) = self.k.map(Zeroizing::new) else {
            self.mix_hash(plaintext);
            return Ok(plaintext.to_vec());
        };

        if self.n == u64::MAX {
            return Err(NoiseError::NonceExhausted);
        }

        let ciphertext = aead_encrypt(&key, self.n, &self.h, plaintext)?;
        self.mix_hash(&ciphertext);
        self.n += 1;
        Ok(ciphertext)
    }

    /// Inverse of [`encrypt_and_hash`](Self::encrypt_and_hash).
    ///
    /// On authentication failure neither `h` nor `n` moves; the caller must
    /// abandon the handshake.
    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let Some(key) = self.k.map(Zeroizing::new) else {
            self.mix_hash(ciphertext);
            return Ok(ciphertext.to_vec());
        };

        if self.n == u64::MAX {
            return Err(NoiseError::NonceExhausted);
        }

        let plaintext = aead_decrypt(&key, self.n, &self.h, ciphertext)?;
        self.mix_hash(ciphertext);
        self.n += 1;
        Ok(plaintext)
    }

    /// Derive the two transport ciphers: `(c1, c2) = HKDF(ck, "", 2)`.
    ///
    /// Consumes the state so `ck` and `h` cannot be used again.
    pub fn split(self) -> (CipherState, CipherState) {
        let (k1, k2) = hkdf2(&self.ck, &[]);
        (CipherState::new(*k1), CipherState::new(*k2))
    }

    /// Current transcript hash.
    pub fn handshake_hash(&self) -> [u8; HASH_LEN] {
        self.h
    }

    /// Whether a DH result has been mixed in yet.
    pub fn has_key(&self) -> bool {
        self.k.is_some()
    }
}
