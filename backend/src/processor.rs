// SPDX-License-Identifier: MIT OR Apache-2.0

//! The processor (spec §4.C, component C): orchestrates encode-on-write /
//! decode-on-read between the transport layer's RPC handlers and the storage
//! engine, and issues bearer tokens on `Register`/`Login`.

use vaultcommon::{Cipher, TableTag};

use crate::error::ProcessorError;
use crate::storage::{BankCardRow, DeletionItem, LoginPasswordRow, Storage, StorageBackend, TextBinaryRow};

/// A decoded bank card row, ready to hand back to a caller as plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankCardEntry {
    pub identifier: String,
    pub number: String,
    pub holder: String,
    pub cvv: String,
    pub meta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPasswordEntry {
    pub identifier: String,
    pub login: String,
    pub password: String,
    pub meta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBinaryEntry {
    pub identifier: String,
    pub entry: String,
    pub meta: String,
}

/// Owns a reference to the [`Cipher`] and a storage handle; both are
/// `Clone`-cheap, so `Processor` itself is too. Generic over [`StorageBackend`]
/// (defaulting to the real [`Storage`]) so tests can swap in
/// `storage::fake::InMemoryStorage` without any dynamic dispatch.
#[derive(Clone)]
pub struct Processor<S: StorageBackend = Storage> {
    cipher: Cipher,
    storage: S,
}

impl<S: StorageBackend> Processor<S> {
    pub fn new(cipher: Cipher, storage: S) -> Self {
        Self { cipher, storage }
    }

    /// Recovers the `user_id` a bearer token was minted for. Handlers call this
    /// directly on the same metadata header the dispatcher already validated
    /// (spec §4.B) rather than receiving the decoded value from the dispatcher.
    pub fn user_id_from_token(&self, token: &str) -> Result<String, ProcessorError> {
        Ok(self.cipher.validate_token(token)?)
    }

    /// `Register(login, pw)`: mints the token from a fresh UUID *before* the
    /// store insert (spec §4.C).
    pub async fn register(&self, login: &str, password: &str) -> Result<String, ProcessorError> {
        let (token, user_id) = self.cipher.new_token();
        let login_ct = self.cipher.encode(login);
        let password_ct = self.cipher.encode(password);

        self.storage
            .add_new_user(login_ct, password_ct, user_id)
            .await?;

        Ok(token)
    }

    /// `Login(login, pw)`: the token is derived from the `user_id` storage
    /// returns after its own constant-time password comparison (spec §4.C).
    pub async fn login(&self, login: &str, password: &str) -> Result<String, ProcessorError> {
        let login_ct = self.cipher.encode(login);
        let password_ct = self.cipher.encode(password);

        let user_id = self.storage.check_user(login_ct, password_ct).await?;
        Ok(self.cipher.encode(&user_id))
    }

    pub async fn post_bank_card(
        &self,
        user_id: &str,
        identifier: &str,
        number: &str,
        holder: &str,
        cvv: &str,
        meta: &str,
    ) -> Result<(), ProcessorError> {
        self.storage
            .set_bank_card(
                user_id.to_string(),
                self.cipher.encode(identifier),
                self.cipher.encode(number),
                self.cipher.encode(holder),
                self.cipher.encode(cvv),
                self.cipher.encode(meta),
            )
            .await?;
        Ok(())
    }

    pub async fn post_login_password(
        &self,
        user_id: &str,
        identifier: &str,
        login: &str,
        password: &str,
        meta: &str,
    ) -> Result<(), ProcessorError> {
        self.storage
            .set_login_password(
                user_id.to_string(),
                self.cipher.encode(identifier),
                self.cipher.encode(login),
                self.cipher.encode(password),
                self.cipher.encode(meta),
            )
            .await?;
        Ok(())
    }

    pub async fn post_text_binary(
        &self,
        user_id: &str,
        identifier: &str,
        entry: &str,
        meta: &str,
    ) -> Result<(), ProcessorError> {
        self.storage
            .set_text_binary(
                user_id.to_string(),
                self.cipher.encode(identifier),
                self.cipher.encode(entry),
                self.cipher.encode(meta),
            )
            .await?;
        Ok(())
    }

    pub async fn get_bank_cards(&self, user_id: &str) -> Result<Vec<BankCardEntry>, ProcessorError> {
        let rows = self.storage.get_bank_cards(user_id.to_string()).await?;
        rows.into_iter()
            .map(|row: BankCardRow| {
                Ok(BankCardEntry {
                    identifier: self.cipher.decode(&row.identifier_ct)?,
                    number: self.cipher.decode(&row.number_ct)?,
                    holder: self.cipher.decode(&row.holder_ct)?,
                    cvv: self.cipher.decode(&row.cvv_ct)?,
                    meta: self.cipher.decode(&row.meta_ct)?,
                })
            })
            .collect()
    }

    pub async fn get_logins_passwords(
        &self,
        user_id: &str,
    ) -> Result<Vec<LoginPasswordEntry>, ProcessorError> {
        let rows = self.storage.get_logins_passwords(user_id.to_string()).await?;
        rows.into_iter()
            .map(|row: LoginPasswordRow| {
                Ok(LoginPasswordEntry {
                    identifier: self.cipher.decode(&row.identifier_ct)?,
                    login: self.cipher.decode(&row.login_ct)?,
                    password: self.cipher.decode(&row.password_ct)?,
                    meta: self.cipher.decode(&row.meta_ct)?,
                })
            })
            .collect()
    }

    pub async fn get_texts_binaries(
        &self,
        user_id: &str,
    ) -> Result<Vec<TextBinaryEntry>, ProcessorError> {
        let rows = self.storage.get_texts_binaries(user_id.to_string()).await?;
        rows.into_iter()
            .map(|row: TextBinaryRow| {
                Ok(TextBinaryEntry {
                    identifier: self.cipher.decode(&row.identifier_ct)?,
                    entry: self.cipher.decode(&row.entry_ct)?,
                    meta: self.cipher.decode(&row.meta_ct)?,
                })
            })
            .collect()
    }

    /// `Delete(identifier, table_tag)`: encodes the identifier and enqueues onto
    /// the coalescer's channel; non-blocking from the caller's point of view
    /// beyond the channel send itself (spec §4.C).
    pub fn delete(&self, user_id: &str, identifier: &str, table_tag: TableTag) {
        self.storage.enqueue_delete(DeletionItem {
            user_id: user_id.to_string(),
            identifier_ct: self.cipher.encode(identifier),
            table_tag,
        });
    }
}

#[cfg(all(test, feature = "test-util"))]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::fake::InMemoryStorage;

    fn processor() -> Processor<InMemoryStorage> {
        Processor::new(Cipher::new("processor-test-secret"), InMemoryStorage::new())
    }

    #[tokio::test]
    async fn register_then_login_agree_on_user_id() {
        let p = processor();
        let register_token = p.register("alice", "p@ss").await.unwrap();
        let login_token = p.login("alice", "p@ss").await.unwrap();
        assert_eq!(
            p.user_id_from_token(&register_token).unwrap(),
            p.user_id_from_token(&login_token).unwrap()
        );
    }

    #[tokio::test]
    async fn post_then_get_bank_card_round_trips_plaintext() {
        let p = processor();
        let token = p.register("alice", "p@ss").await.unwrap();
        let user_id = p.user_id_from_token(&token).unwrap();

        p.post_bank_card(&user_id, "card1", "4111111111111111", "ALICE", "123", "visa")
            .await
            .unwrap();

        let cards = p.get_bank_cards(&user_id).await.unwrap();
        assert_eq!(
            cards,
            vec![BankCardEntry {
                identifier: "card1".to_string(),
                number: "4111111111111111".to_string(),
                holder: "ALICE".to_string(),
                cvv: "123".to_string(),
                meta: "visa".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn setting_the_same_identifier_twice_conflicts() {
        let p = processor();
        let token = p.register("alice", "p@ss").await.unwrap();
        let user_id = p.user_id_from_token(&token).unwrap();

        p.post_text_binary(&user_id, "note1", "hello", "").await.unwrap();
        let err = p
            .post_text_binary(&user_id, "note1", "hello again", "")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Storage(StorageError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let p = processor();
        let token = p.register("alice", "p@ss").await.unwrap();
        let user_id = p.user_id_from_token(&token).unwrap();

        p.post_login_password(&user_id, "site1", "bob", "hunter2", "")
            .await
            .unwrap();
        p.delete(&user_id, "site1", TableTag::LoginPassword);

        assert!(p.get_logins_passwords(&user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn another_users_token_cannot_see_these_entries() {
        let p = processor();
        let alice_token = p.register("alice", "p@ss").await.unwrap();
        let alice_id = p.user_id_from_token(&alice_token).unwrap();
        p.post_bank_card(&alice_id, "card1", "4111111111111111", "ALICE", "123", "")
            .await
            .unwrap();

        let bob_token = p.register("bob", "p@ss").await.unwrap();
        let bob_id = p.user_id_from_token(&bob_token).unwrap();

        assert!(p.get_bank_cards(&bob_id).await.unwrap().is_empty());
    }
}
