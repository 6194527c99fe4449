// SPDX-License-Identifier: MIT OR Apache-2.0

//! The storage engine (spec §4.D): prepared-statement CRUD against Postgres, a
//! single mutex serializing every call, and a per-call timeout race modeled with
//! `tokio::select!` rather than `sqlx`'s own statement timeout knobs, so a slow
//! driver call can never pin a caller past its deadline.

mod backend_trait;
mod coalescer;
#[cfg(feature = "test-util")]
pub mod fake;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;

pub use backend_trait::StorageBackend;
pub use coalescer::DeletionItem;

/// Everything [`Storage::connect`] needs that isn't wired in from elsewhere
/// (the cipher, the shutdown token).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    /// Per-call deadline (`HandlersTO`); also reused as the coalescer's own
    /// per-flush deadline, since deletes share the storage mutex with every
    /// other call and the source applies the same timeout uniformly.
    pub handlers_timeout: Duration,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BankCardRow {
    pub identifier_ct: String,
    pub number_ct: String,
    pub holder_ct: String,
    pub cvv_ct: String,
    pub meta_ct: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginPasswordRow {
    pub identifier_ct: String,
    pub login_ct: String,
    pub password_ct: String,
    pub meta_ct: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TextBinaryRow {
    pub identifier_ct: String,
    pub entry_ct: String,
    pub meta_ct: String,
}

type LockedFut<T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send>>;

/// Synchronous CRUD plus the delete channel endpoint (spec §4.D, component D).
///
/// `Clone`-cheap: the pool mutex and delete sender are both reference-counted, so
/// every request task can hold its own `Storage` handle.
#[derive(Clone)]
pub struct Storage {
    pool: Arc<Mutex<PgPool>>,
    timeout: Duration,
    delete_tx: mpsc::UnboundedSender<DeletionItem>,
}

impl Storage {
    /// Connects to Postgres, bootstraps the schema, and spawns the delete
    /// coalescer task. The coalescer observes `shutdown` for its drain-on-exit
    /// transition (spec §4.D's Running → Draining → Closed states).
    ///
    /// Returns the coalescer's `JoinHandle` alongside the handle itself. Callers
    /// must `.await` it after signalling `shutdown` and before the storage pool
    /// is dropped, so the final drain-and-commit can never be torn down mid-flush
    /// by an exiting runtime (spec §6's ordered shutdown).
    pub async fn connect(
        config: StorageConfig,
        shutdown: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), StorageError> {
        let pool = PgPoolOptions::new()
            .connect(&config.database_url)
            .await
            .map_err(StorageError::StatementPrepare)?;
        let pool = Arc::new(Mutex::new(pool));

        let (delete_tx, delete_rx) = mpsc::unbounded_channel();
        let sink = coalescer::PgDeleteSink::new(Arc::clone(&pool), config.handlers_timeout);
        let coalescer_handle = coalescer::spawn(sink, delete_rx, shutdown);

        let storage = Self {
            pool,
            timeout: config.handlers_timeout,
            delete_tx,
        };

        storage.create_tables().await?;
        Ok((storage, coalescer_handle))
    }

    async fn run_locked<T, F>(&self, query: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(PgPool) -> LockedFut<T> + Send + 'static,
    {
        let pool_handle = Arc::clone(&self.pool);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let guard = pool_handle.lock().await;
            let result = query(guard.clone()).await;
            drop(guard);
            let _ = tx.send(result);
        });

        tokio::select! {
            _ = tokio::time::sleep(self.timeout) => Err(StorageError::ContextTimeout),
            res = rx => res.unwrap_or(Err(StorageError::ContextTimeout)),
        }
    }

    async fn create_tables(&self) -> Result<(), StorageError> {
        self.run_locked(|pool| {
            Box::pin(async move {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS users (
                        surrogate_id BIGSERIAL PRIMARY KEY,
                        user_id TEXT NOT NULL UNIQUE,
                        login_ct TEXT NOT NULL UNIQUE,
                        password_ct TEXT NOT NULL,
                        registered_at TIMESTAMPTZ NOT NULL DEFAULT now()
                    )
                    "#,
                )
                .execute(&pool)
                .await
                .map_err(StorageError::StatementPrepare)?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS bank_cards (
                        surrogate_id BIGSERIAL PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        identifier_ct TEXT NOT NULL,
                        number_ct TEXT NOT NULL,
                        holder_ct TEXT NOT NULL,
                        cvv_ct TEXT NOT NULL,
                        meta_ct TEXT NOT NULL,
                        UNIQUE (user_id, identifier_ct)
                    )
                    "#,
                )
                .execute(&pool)
                .await
                .map_err(StorageError::StatementPrepare)?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS logins_passwords (
                        surrogate_id BIGSERIAL PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        identifier_ct TEXT NOT NULL,
                        login_ct TEXT NOT NULL,
                        password_ct TEXT NOT NULL,
                        meta_ct TEXT NOT NULL,
                        UNIQUE (user_id, identifier_ct)
                    )
                    "#,
                )
                .execute(&pool)
                .await
                .map_err(StorageError::StatementPrepare)?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS texts_binaries (
                        surrogate_id BIGSERIAL PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        identifier_ct TEXT NOT NULL,
                        entry_ct TEXT NOT NULL,
                        meta_ct TEXT NOT NULL,
                        UNIQUE (user_id, identifier_ct)
                    )
                    "#,
                )
                .execute(&pool)
                .await
                .map_err(StorageError::StatementPrepare)?;

                Ok(())
            })
        })
        .await
    }

    /// `INSERT INTO users`; a unique-violation on `login_ct` (Postgres `23505`)
    /// becomes `AlreadyExists{id: login}` (spec §4.D).
    pub async fn add_new_user(
        &self,
        login_ct: String,
        password_ct: String,
        user_id: String,
    ) -> Result<(), StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO users (user_id, login_ct, password_ct) VALUES ($1, $2, $3)",
                )
                .bind(&user_id)
                .bind(&login_ct)
                .bind(&password_ct)
                .execute(&pool)
                .await
                .map(|_| ())
                .map_err(|err| map_unique_violation(err, login_ct))
            })
        })
        .await
    }

    /// `SELECT` by ciphertext login, then a constant-time comparison of the
    /// caller-supplied (already-encoded) password ciphertext against the stored
    /// one — comparing SHA-256 digests of both sides under `subtle::ConstantTimeEq`
    /// rather than the ciphertext bytes directly (spec §4.D).
    pub async fn check_user(
        &self,
        login_ct: String,
        password_ct: String,
    ) -> Result<String, StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                let row = sqlx::query("SELECT user_id, password_ct FROM users WHERE login_ct = $1")
                    .bind(&login_ct)
                    .fetch_optional(&pool)
                    .await
                    .map_err(StorageError::Execution)?;

                let row = row.ok_or(StorageError::NotFound)?;
                let stored_password_ct: String =
                    row.try_get("password_ct").map_err(StorageError::Scanning)?;
                let user_id: String = row.try_get("user_id").map_err(StorageError::Scanning)?;

                if constant_time_str_eq(&stored_password_ct, &password_ct) {
                    Ok(user_id)
                } else {
                    Err(StorageError::InvalidPassword)
                }
            })
        })
        .await
    }

    pub async fn set_bank_card(
        &self,
        user_id: String,
        identifier_ct: String,
        number_ct: String,
        holder_ct: String,
        cvv_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                ensure_absent(&pool, "bank_cards", &user_id, &identifier_ct).await?;
                sqlx::query(
                    "INSERT INTO bank_cards (user_id, identifier_ct, number_ct, holder_ct, cvv_ct, meta_ct) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(&user_id)
                .bind(&identifier_ct)
                .bind(&number_ct)
                .bind(&holder_ct)
                .bind(&cvv_ct)
                .bind(&meta_ct)
                .execute(&pool)
                .await
                .map(|_| ())
                .map_err(StorageError::Execution)
            })
        })
        .await
    }

    pub async fn set_login_password(
        &self,
        user_id: String,
        identifier_ct: String,
        login_ct: String,
        password_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                ensure_absent(&pool, "logins_passwords", &user_id, &identifier_ct).await?;
                sqlx::query(
                    "INSERT INTO logins_passwords (user_id, identifier_ct, login_ct, password_ct, meta_ct) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(&user_id)
                .bind(&identifier_ct)
                .bind(&login_ct)
                .bind(&password_ct)
                .bind(&meta_ct)
                .execute(&pool)
                .await
                .map(|_| ())
                .map_err(StorageError::Execution)
            })
        })
        .await
    }

    pub async fn set_text_binary(
        &self,
        user_id: String,
        identifier_ct: String,
        entry_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                ensure_absent(&pool, "texts_binaries", &user_id, &identifier_ct).await?;
                sqlx::query(
                    "INSERT INTO texts_binaries (user_id, identifier_ct, entry_ct, meta_ct) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(&user_id)
                .bind(&identifier_ct)
                .bind(&entry_ct)
                .bind(&meta_ct)
                .execute(&pool)
                .await
                .map(|_| ())
                .map_err(StorageError::Execution)
            })
        })
        .await
    }

    pub async fn get_bank_cards(&self, user_id: String) -> Result<Vec<BankCardRow>, StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                sqlx::query_as::<_, BankCardRow>(
                    "SELECT identifier_ct, number_ct, holder_ct, cvv_ct, meta_ct \
                     FROM bank_cards WHERE user_id = $1",
                )
                .bind(&user_id)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::Execution)
            })
        })
        .await
    }

    pub async fn get_logins_passwords(
        &self,
        user_id: String,
    ) -> Result<Vec<LoginPasswordRow>, StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                sqlx::query_as::<_, LoginPasswordRow>(
                    "SELECT identifier_ct, login_ct, password_ct, meta_ct \
                     FROM logins_passwords WHERE user_id = $1",
                )
                .bind(&user_id)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::Execution)
            })
        })
        .await
    }

    pub async fn get_texts_binaries(
        &self,
        user_id: String,
    ) -> Result<Vec<TextBinaryRow>, StorageError> {
        self.run_locked(move |pool| {
            Box::pin(async move {
                sqlx::query_as::<_, TextBinaryRow>(
                    "SELECT identifier_ct, entry_ct, meta_ct FROM texts_binaries WHERE user_id = $1",
                )
                .bind(&user_id)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::Execution)
            })
        })
        .await
    }

    /// Non-blocking (beyond the channel send) enqueue onto the delete coalescer's
    /// unbounded channel. No reply is ever sent back (spec §4.D).
    pub fn enqueue_delete(&self, item: DeletionItem) {
        // A send error means the coalescer has already shut down and dropped its
        // receiver; per spec §4.D this can only happen after a clean shutdown
        // drain, at which point any caller still issuing requests is a
        // programming error, not something this call can meaningfully recover
        // from.
        if self.delete_tx.send(item).is_err() {
            tracing::error!("enqueue_delete called after the delete coalescer has shut down");
        }
    }
}

impl StorageBackend for Storage {
    async fn add_new_user(
        &self,
        login_ct: String,
        password_ct: String,
        user_id: String,
    ) -> Result<(), StorageError> {
        Storage::add_new_user(self, login_ct, password_ct, user_id).await
    }

    async fn check_user(&self, login_ct: String, password_ct: String) -> Result<String, StorageError> {
        Storage::check_user(self, login_ct, password_ct).await
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
        Storage::set_bank_card(self, user_id, identifier_ct, number_ct, holder_ct, cvv_ct, meta_ct).await
    }

    async fn set_login_password(
        &self,
        user_id: String,
        identifier_ct: String,
        login_ct: String,
        password_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        Storage::set_login_password(self, user_id, identifier_ct, login_ct, password_ct, meta_ct).await
    }

    async fn set_text_binary(
        &self,
        user_id: String,
        identifier_ct: String,
        entry_ct: String,
        meta_ct: String,
    ) -> Result<(), StorageError> {
        Storage::set_text_binary(self, user_id, identifier_ct, entry_ct, meta_ct).await
    }

    async fn get_bank_cards(&self, user_id: String) -> Result<Vec<BankCardRow>, StorageError> {
        Storage::get_bank_cards(self, user_id).await
    }

    async fn get_logins_passwords(
        &self,
        user_id: String,
    ) -> Result<Vec<LoginPasswordRow>, StorageError> {
        Storage::get_logins_passwords(self, user_id).await
    }

    async fn get_texts_binaries(&self, user_id: String) -> Result<Vec<TextBinaryRow>, StorageError> {
        Storage::get_texts_binaries(self, user_id).await
    }

    fn enqueue_delete(&self, item: DeletionItem) {
        Storage::enqueue_delete(self, item)
    }
}

/// `SELECT ... WHERE user_id = $1 AND identifier_ct = $2` before an insert; found
/// ⇒ `AlreadyExists`, anything else ⇒ propagated as `Execution` (spec invariant 2).
async fn ensure_absent(
    pool: &PgPool,
    table: &str,
    user_id: &str,
    identifier_ct: &str,
) -> Result<(), StorageError> {
    let query = format!(
        "SELECT 1 FROM {table} WHERE user_id = $1 AND identifier_ct = $2",
        table = table
    );
    let existing = sqlx::query(&query)
        .bind(user_id)
        .bind(identifier_ct)
        .fetch_optional(pool)
        .await
        .map_err(StorageError::Execution)?;

    if existing.is_some() {
        Err(StorageError::AlreadyExists {
            id: identifier_ct.to_string(),
        })
    } else {
        Ok(())
    }
}

fn map_unique_violation(err: sqlx::Error, login: String) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::AlreadyExists { id: login };
        }
    }
    StorageError::Execution(err)
}

/// Constant-time comparison of the SHA-256 digests of both ciphertexts, so that
/// neither the match outcome nor any partial byte agreement leaks through timing
/// (spec §4.D).
fn constant_time_str_eq(a: &str, b: &str) -> bool {
    use sha2::{Digest, Sha256};
    use subtle::ConstantTimeEq;

    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.ct_eq(&b).into()
}
