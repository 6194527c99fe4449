// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic AEAD encode/decode of short strings, and minting/validating the
//! opaque bearer token handed out at register/login time.
//!
//! # Fixed-nonce GCM
//!
//! This cipher derives both its key *and* its nonce from the same configured secret,
//! and reuses that nonce for every call for the lifetime of the process. That makes
//! `encode` a deterministic function of its plaintext: the same plaintext always
//! produces the same ciphertext. This is intentional, not an oversight — it is what
//! lets the storage engine run `SELECT ... WHERE identifier_ct = $1` directly over an
//! encrypted column, by re-encoding the caller-supplied plaintext and comparing
//! ciphertext to ciphertext. Nonce reuse is normally catastrophic for AES-GCM (it
//! breaks confidentiality *and* authenticity across messages encrypted under the same
//! key/nonce pair), but the tradeoff made here is deliberate: every ciphertext this
//! cipher produces under a given key encodes a value from the same fixed relation
//! (one user's secret fields), and the property being traded away is exactly the one
//! being used as a feature (plaintext-equality leakage). Do not "fix" this by moving
//! to a random per-message nonce without also building a separate blind index for
//! equality lookups — that is a larger change than a cipher tweak.
use std::fmt;

use aes_gcm::{
    aead::{Aead as _, KeyInit as _},
    Aes256Gcm, Key, Nonce,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use super::secret::Secret;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Errors from decoding a ciphertext produced by [`Cipher`].
#[derive(Debug, Error)]
pub enum CipherError {
    /// the input was not valid hex
    #[error("input is not valid hex")]
    BadHex,
    /// the AEAD tag did not verify, or the decrypted bytes were not valid UTF-8
    #[error("AEAD authentication failed")]
    AuthFailed,
}

/// AES-256-GCM cipher with a key and nonce both derived from a single configured
/// secret. Stateless beyond that derived key material, `Clone`-cheap (the key is
/// behind an `Arc`-free small buffer, copied on clone), and safe to share across
/// every request task.
#[derive(Clone)]
pub struct Cipher {
    key: Secret<KEY_SIZE>,
    nonce: [u8; NONCE_SIZE],
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").field("key", &self.key).finish()
    }
}

impl Cipher {
    /// Derives the AEAD key as `SHA-256(user_key)`, and the fixed nonce as the last
    /// [`NONCE_SIZE`] bytes of that same digest.
    pub fn new(user_key: &str) -> Self {
        let digest = Sha256::digest(user_key.as_bytes());
        let key: [u8; KEY_SIZE] = digest.into();
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&key[KEY_SIZE - NONCE_SIZE..]);
        Self { key: key.into(), nonce }
    }

    fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.secret()))
    }

    /// Encrypt `plaintext` and return its lowercase-hex sealed bytes
    /// (ciphertext || auth tag). Deterministic: see the module-level note.
    pub fn encode(&self, plaintext: &str) -> String {
        let sealed = self
            .aead()
            .encrypt(Nonce::from_slice(&self.nonce), plaintext.as_bytes())
            .expect("AES-256-GCM encryption cannot fail for in-memory plaintexts");
        hex::encode(sealed)
    }

    /// Decrypt a hex string produced by [`Cipher::encode`] under the same key.
    pub fn decode(&self, ciphertext_hex: &str) -> Result<String, CipherError> {
        let sealed = hex::decode(ciphertext_hex).map_err(|_| CipherError::BadHex)?;
        let opened = self
            .aead()
            .decrypt(Nonce::from_slice(&self.nonce), sealed.as_slice())
            .map_err(|_| CipherError::AuthFailed)?;
        String::from_utf8(opened).map_err(|_| CipherError::AuthFailed)
    }

    /// Mint a fresh user id (UUIDv4) and its bearer token (`encode(user_id)`).
    pub fn new_token(&self) -> (String, String) {
        let user_id = Uuid::new_v4().to_string();
        let token = self.encode(&user_id);
        (token, user_id)
    }

    /// Recover the user id a bearer token was minted for.
    pub fn validate_token(&self, token: &str) -> Result<String, CipherError> {
        self.decode(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let cipher = Cipher::new("test-secret");
        let pt = "hunter2";
        assert_eq!(cipher.decode(&cipher.encode(pt)).unwrap(), pt);
    }

    #[test]
    fn encode_is_deterministic() {
        let cipher = Cipher::new("test-secret");
        assert_eq!(cipher.encode("alice"), cipher.encode("alice"));
    }

    #[test]
    fn different_plaintexts_differ() {
        let cipher = Cipher::new("test-secret");
        assert_ne!(cipher.encode("alice"), cipher.encode("bob"));
    }

    #[test]
    fn token_round_trips_to_its_own_user_id() {
        let cipher = Cipher::new("test-secret");
        let (token, user_id) = cipher.new_token();
        assert_eq!(cipher.validate_token(&token).unwrap(), user_id);
    }

    #[test]
    fn bad_hex_is_rejected() {
        let cipher = Cipher::new("test-secret");
        assert!(matches!(cipher.decode("not hex"), Err(CipherError::BadHex)));
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let cipher = Cipher::new("test-secret");
        let mut ct = cipher.encode("alice");
        // flip the last hex nibble, still valid hex but wrong tag/ciphertext
        let last = ct.pop().unwrap();
        ct.push(if last == '0' { '1' } else { '0' });
        assert!(matches!(cipher.decode(&ct), Err(CipherError::AuthFailed)));
    }

    #[test]
    fn wrong_key_fails_auth() {
        let a = Cipher::new("key-a");
        let b = Cipher::new("key-b");
        assert!(matches!(b.decode(&a.encode("alice")), Err(CipherError::AuthFailed)));
    }
}
