// SPDX-License-Identifier: MIT OR Apache-2.0

//! The storage engine's error taxonomy (spec §7) and its mapping onto `tonic::Status`.
//!
//! `StorageError` is returned verbatim by every [`crate::storage::Storage`] call and
//! passed through the processor unchanged; only the gRPC-facing layer in
//! `tonic-server` decides how a given RPC's handler wants to fold it into a response
//! code (Register/Login collapse everything to `UNAUTHENTICATED`; every other RPC
//! uses the mapping below as-is).

use displaydoc::Display;
use thiserror::Error;
use tonic::Status;
use tracing::error;

use vaultcommon::CipherError;

/// Errors from the storage engine (spec §7). Variant names match the error kinds
/// named in the spec, not the source's Go identifiers.
#[derive(Debug, Error, Display)]
pub enum StorageError {
    /// preparing a statement failed
    StatementPrepare(#[source] sqlx::Error),
    /// executing a query failed: {0}
    Execution(#[source] sqlx::Error),
    /// decoding a row failed: {0}
    Scanning(#[source] sqlx::Error),
    /// the operation's deadline elapsed before a result was available
    ContextTimeout,
    /// no row matched the lookup
    NotFound,
    /// the supplied password did not match the stored one
    InvalidPassword,
    /// a row with id {id} already exists
    AlreadyExists { id: String },
}

impl From<StorageError> for Status {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::StatementPrepare(source) => {
                error!(%source, "statement prepare failed");
                Status::internal("storage error")
            }
            StorageError::Execution(source) => {
                error!(%source, "query execution failed");
                Status::internal("storage error")
            }
            StorageError::Scanning(source) => {
                error!(%source, "row decode failed");
                Status::internal("storage error")
            }
            StorageError::ContextTimeout => Status::deadline_exceeded("request deadline exceeded"),
            StorageError::NotFound => Status::unauthenticated("invalid credentials"),
            StorageError::InvalidPassword => Status::unauthenticated("invalid credentials"),
            StorageError::AlreadyExists { id } => Status::already_exists(id),
        }
    }
}

/// Errors surfaced by the processor (spec §4.C): either a storage failure, or a
/// decode failure on a ciphertext column the store itself returned — the latter is
/// always a data-integrity bug (tampering, or a `UserKey` mismatch against data
/// written under a different key) rather than anything a caller can fix.
#[derive(Debug, Error, Display)]
pub enum ProcessorError {
    /// {0}
    Storage(#[from] StorageError),
    /// failed to decode a stored ciphertext column: {0}
    CorruptCiphertext(#[from] CipherError),
}

impl From<ProcessorError> for Status {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Storage(source) => source.into(),
            ProcessorError::CorruptCiphertext(source) => {
                error!(%source, "stored ciphertext failed to decode");
                Status::internal("data integrity error")
            }
        }
    }
}
