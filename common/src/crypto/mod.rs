// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives used across the vault: the deterministic AEAD cipher
//! (component A of the spec) and the in-memory secret wrapper it is built on.

mod cipher;
mod secret;

pub use cipher::{Cipher, CipherError};
pub use secret::Secret;
