// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contract a real client-side cache would fulfill (spec §4.E). This is a
//! boundary sketch only: no implementation, no persistence, no TUI or CLI
//! wiring. A conforming cache is expected to be ephemeral and single-process.

use tonic::async_trait;

use vaultprotos::v1::{BankCardEntry, LoginPasswordEntry, TextBinaryEntry};

use crate::ClientError;

/// Local state kept in sync with the server by applying the matching RPC on
/// every mutation and reconciling with a full `Get*` sweep on `sync`.
///
/// A real implementation would, on `set_bank_card`/`delete_bank_card`/etc.,
/// apply the change locally first and issue the matching RPC through a
/// [`crate::VaultClient`]; on RPC failure it reverts the local write rather
/// than retrying (spec §4.E: "on server failure the client reverts its local
/// insertion"). `sync` instead overwrites every locally cached key with
/// whatever the server holds, discarding any local-only state.
#[async_trait]
pub trait ReplicatingCache {
    async fn set_bank_card(
        &self,
        identifier: &str,
        number: &str,
        holder: &str,
        cvv: &str,
        meta: &str,
    ) -> Result<(), ClientError>;

    async fn set_login_password(
        &self,
        identifier: &str,
        login: &str,
        password: &str,
        meta: &str,
    ) -> Result<(), ClientError>;

    async fn set_text_binary(&self, identifier: &str, entry: &str, meta: &str) -> Result<(), ClientError>;

    async fn delete_bank_card(&self, identifier: &str) -> Result<(), ClientError>;
    async fn delete_login_password(&self, identifier: &str) -> Result<(), ClientError>;
    async fn delete_text_binary(&self, identifier: &str) -> Result<(), ClientError>;

    fn bank_cards(&self) -> Vec<BankCardEntry>;
    fn logins_passwords(&self) -> Vec<LoginPasswordEntry>;
    fn texts_binaries(&self) -> Vec<TextBinaryEntry>;

    /// Concurrently re-fetches all three collections and replaces the local
    /// cache wholesale (spec §4.E).
    async fn sync(&self) -> Result<(), ClientError>;
}
