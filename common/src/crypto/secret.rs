// SPDX-License-Identifier: MIT OR Apache-2.0

//! A small fixed-length secret wrapper that zeroizes its backing bytes on drop and
//! never prints itself. Modeled on the teacher's `Secret<LENGTH>` (see
//! `common/src/crypto/secrets.rs` in the reference pack), trimmed down to what the
//! vault's single symmetric key actually needs: no wire (de)serialization, no sqlx
//! column mapping, just safe-to-hold-in-memory key material.

use std::fmt::{self, Debug, Display};

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A symmetric secret of fixed length `LENGTH`, held only in memory.
#[derive(Clone)]
pub struct Secret<const LENGTH: usize> {
    bytes: [u8; LENGTH],
}

impl<const LENGTH: usize> Secret<LENGTH> {
    pub fn secret(&self) -> &[u8; LENGTH] {
        &self.bytes
    }
}

impl<const LENGTH: usize> From<[u8; LENGTH]> for Secret<LENGTH> {
    fn from(bytes: [u8; LENGTH]) -> Self {
        Self { bytes }
    }
}

impl<const LENGTH: usize> Zeroize for Secret<LENGTH> {
    fn zeroize(&mut self) {
        self.bytes.zeroize();
    }
}

impl<const LENGTH: usize> ZeroizeOnDrop for Secret<LENGTH> {}

impl<const LENGTH: usize> Drop for Secret<LENGTH> {
    fn drop(&mut self) {
        self.zeroize();
    }
}

// Never print the key material, even accidentally via `{:?}` in a log statement.
impl<const LENGTH: usize> Debug for Secret<LENGTH> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").field("bytes", &"[[REDACTED]]").finish()
    }
}

impl<const LENGTH: usize> Display for Secret<LENGTH> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[REDACTED]]")
    }
}
