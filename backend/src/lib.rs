// SPDX-License-Identifier: MIT OR Apache-2.0

#![deny(unreachable_pub)]

//! Storage engine, delete coalescer and RPC processor for the vault server.
//!
//! This crate owns everything downstream of the authenticating dispatcher:
//! encode-on-write / decode-on-read orchestration ([`processor`]), prepared-statement
//! CRUD against Postgres under a single mutex with a per-call timeout, and the
//! asynchronous delete coalescer ([`storage`]).

pub mod error;
pub mod processor;
pub mod storage;

pub use error::{ProcessorError, StorageError};
pub use processor::Processor;
pub use storage::{Storage, StorageBackend, StorageConfig};
