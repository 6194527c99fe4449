// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory [`StorageBackend`] with no database, gated behind the `test-util`
//! feature so other crates (`tonic-server`'s integration tests) can exercise the
//! processor and `VaultService` wiring end-to-end without a Postgres instance.
//! Modeled on the teacher's `coreclient::store::memory::InMemoryStore` (a
//! `Mutex`-guarded plain-struct `Inner`, one `Vec`/`HashMap` field per entity).
//!
//! Deletion here is applied synchronously and immediately rather than coalesced:
//! this fake exists to test the processor/dispatcher/service layers' wiring, not
//! the coalescer's batching/timing behavior, which [`super::coalescer`]'s own unit
//! tests already cover.

use std::sync::Mutex;

use vaultcommon::TableTag;

use crate::error::StorageError;
use crate::storage::{BankCardRow, DeletionItem, LoginPasswordRow, StorageBackend, TextBinaryRow};

struct UserRow {
    user_id: String,
    login_ct: String,
    password_ct: String,
}

#[derive(Default)]
struct Inner {
    users: Vec<UserRow>,
    bank_cards: Vec<(String, BankCardRow)>,
    logins_passwords: Vec<(String, LoginPasswordRow)>,
    texts_binaries: Vec<(String, TextBinaryRow)>,
}

/// `StorageBackend` test double. `Clone`-cheap: the guarded state lives behind an
/// `Arc`, same as the real [`super::Storage`]'s pool handle.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("InMemoryStorage mutex poisoned")
    }
}

impl StorageBackend for InMemoryStorage {
    async fn add_new_user(
        &self,
        login_ct: String,
        password_ct: String,
        user_id: String,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.login_ct == login_ct) {
            return Err(StorageError::AlreadyExists { id: login_ct });
        }
        inner.users.push(UserRow {
            user_id,
            login_ct,
            password_ct,
        });
        Ok(())
    }

    async fn check_user(&self, login_ct: String, password_ct: String) -> Result<String, StorageError> {
        let inner = self.lock();
        let user = inner
            .users
            .iter()
            .find(|u| u.login_ct == login_ct)
            .ok_or(StorageError::NotFound)?;
        if super::constant_time_str_eq(&user.password_ct, &password_ct) {
            Ok(user.user_id.clone())
        } else {
            Err(StorageError::InvalidPassword)
        }
    }

    async fn set_bank_card(
        &self,
        user_id: String,
        identifier_ct: String,
        number_ct: String,
        holder_ct: String,
        cvv_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner
            .bank_cards
            .iter()
            .any(|(uid, row)| *uid == user_id && row.identifier_ct == identifier_ct)
        {
            return Err(StorageError::AlreadyExists { id: identifier_ct });
        }
        inner.bank_cards.push((
            user_id,
            BankCardRow {
                identifier_ct,
                number_ct,
                holder_ct,
                cvv_ct,
                meta_ct,
            },
        ));
        Ok(())
    }

    async fn set_login_password(
        &self,
        user_id: String,
        identifier_ct: String,
        login_ct: String,
        password_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner
            .logins_passwords
            .iter()
            .any(|(uid, row)| *uid == user_id && row.identifier_ct == identifier_ct)
        {
            return Err(StorageError::AlreadyExists { id: identifier_ct });
        }
        inner.logins_passwords.push((
            user_id,
            LoginPasswordRow {
                identifier_ct,
                login_ct,
                password_ct,
                meta_ct,
            },
        ));
        Ok(())
    }

    async fn set_text_binary(
        &self,
        user_id: String,
        identifier_ct: String,
        entry_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner
            .texts_binaries
            .iter()
            .any(|(uid, row)| *uid == user_id && row.identifier_ct == identifier_ct)
        {
            return Err(StorageError::AlreadyExists { id: identifier_ct });
        }
        inner.texts_binaries.push((
            user_id,
            TextBinaryRow {
                identifier_ct,
                entry_ct,
                meta_ct,
            },
        ));
        Ok(())
    }

    async fn get_bank_cards(&self, user_id: String) -> Result<Vec<BankCardRow>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .bank_cards
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn get_logins_passwords(
        &self,
        user_id: String,
    ) -> Result<Vec<LoginPasswordRow>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .logins_passwords
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn get_texts_binaries(&self, user_id: String) -> Result<Vec<TextBinaryRow>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .texts_binaries
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn enqueue_delete(&self, item: DeletionItem) {
        let mut inner = self.lock();
        match item.table_tag {
            TableTag::BankCard => inner
                .bank_cards
                .retain(|(uid, row)| !(*uid == item.user_id && row.identifier_ct == item.identifier_ct)),
            TableTag::LoginPassword => inner.logins_passwords.retain(|(uid, row)| {
                !(*uid == item.user_id && row.identifier_ct == item.identifier_ct)
            }),
            TableTag::TextBinary => inner
                .texts_binaries
                .retain(|(uid, row)| !(*uid == item.user_id && row.identifier_ct == item.identifier_ct)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_duplicate_login_conflicts() {
        let storage = InMemoryStorage::new();
        storage
            .add_new_user("alice-ct".into(), "pw-ct".into(), "u1".into())
            .await
            .unwrap();
        let err = storage
            .add_new_user("alice-ct".into(), "other-pw-ct".into(), "u2".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { id } if id == "alice-ct"));
    }

    #[tokio::test]
    async fn check_user_rejects_wrong_password() {
        let storage = InMemoryStorage::new();
        storage
            .add_new_user("alice-ct".into(), "pw-ct".into(), "u1".into())
            .await
            .unwrap();
        let err = storage
            .check_user("alice-ct".into(), "wrong-ct".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPassword));
    }

    #[tokio::test]
    async fn set_then_get_round_trips_and_delete_removes_it() {
        let storage = InMemoryStorage::new();
        storage
            .set_bank_card(
                "u1".into(),
                "card1-ct".into(),
                "number-ct".into(),
                "holder-ct".into(),
                "cvv-ct".into(),
                "meta-ct".into(),
            )
            .await
            .unwrap();

        let cards = storage.get_bank_cards("u1".into()).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].identifier_ct, "card1-ct");

        storage.enqueue_delete(DeletionItem {
            user_id: "u1".into(),
            identifier_ct: "card1-ct".into(),
            table_tag: TableTag::BankCard,
        });

        assert!(storage.get_bank_cards("u1".into()).await.unwrap().is_empty());
    }
}
