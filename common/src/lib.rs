// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crypto primitives and small shared types used by the vault server's storage
//! engine, processor and transport crates.

pub mod crypto;
pub mod table_tag;

pub use crypto::{Cipher, CipherError};
pub use table_tag::TableTag;
