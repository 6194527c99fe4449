// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generated protobuf/gRPC types and service traits for the vault's `VaultService`.
//! No hand-written conversion code lives here (there is no wire/domain split worth
//! a `convert.rs` for strings-in, strings-out messages) — see `vaultbackend` for
//! the processor that maps these messages onto the encode/decode pipeline.

pub mod v1 {
    #![allow(clippy::doc_lazy_continuation)]

    tonic::include_proto!("vault.v1");
}
