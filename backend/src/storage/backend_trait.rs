// SPDX-License-Identifier: MIT OR Apache-2.0

//! The storage engine's public surface as a trait, so [`crate::processor::Processor`]
//! and `vault-server`'s `VaultService` can run against either the real Postgres-backed
//! [`super::Storage`] or an in-memory fake (`storage::fake::InMemoryStorage`, behind the
//! `test-util` feature) without any runtime indirection. Modeled on the teacher's
//! `#[trait_variant::make(Store: Send)]` pattern (`coreclient/src/store/mod.rs`): the
//! macro emits a `Send`-bounded public trait from a plain `async fn`-bearing one, which
//! is what lets this trait be used across `tokio::spawn`ed tasks without boxing every
//! future or reaching for `async-trait`.

use crate::error::StorageError;
use crate::storage::{BankCardRow, DeletionItem, LoginPasswordRow, TextBinaryRow};

/// Synchronous CRUD plus the delete channel endpoint (spec §4.D). See
/// [`super::Storage`] for the concrete Postgres implementation and
/// `storage::fake::InMemoryStorage` for the test double.
#[allow(async_fn_in_trait, reason = "trait_variant::make generates the Send-bounded public variant")]
#[allow(unreachable_pub, reason = "LocalStorageBackend itself is only a macro input; StorageBackend is the re-exported public name")]
#[trait_variant::make(StorageBackend: Send)]
pub trait LocalStorageBackend: Clone + Send + Sync + 'static {
    async fn add_new_user(
        &self,
        login_ct: String,
        password_ct: String,
        user_id: String,
    ) -> Result<(), StorageError>;

    async fn check_user(&self, login_ct: String, password_ct: String) -> Result<String, StorageError>;

    async fn set_bank_card(
        &self,
        user_id: String,
        identifier_ct: String,
        number_ct: String,
        holder_ct: String,
        cvv_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError>;

    async fn set_login_password(
        &self,
        user_id: String,
        identifier_ct: String,
        login_ct: String,
        password_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError>;

    async fn set_text_binary(
        &self,
        user_id: String,
        identifier_ct: String,
        entry_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError>;

    async fn get_bank_cards(&self, user_id: String) -> Result<Vec<BankCardRow>, StorageError>;

    async fn get_logins_passwords(
        &self,
        user_id: String,
    ) -> Result<Vec<LoginPasswordRow>, StorageError>;

    async fn get_texts_binaries(&self, user_id: String) -> Result<Vec<TextBinaryRow>, StorageError>;

    /// Non-blocking (beyond the channel send) enqueue onto the delete coalescer
    /// (spec §4.D). Not `async`: the real implementation only does a channel send.
    fn enqueue_delete(&self, item: DeletionItem);
}
