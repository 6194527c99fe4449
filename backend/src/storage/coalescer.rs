// SPDX-License-Identifier: MIT OR Apache-2.0

//! The asynchronous delete coalescer (spec §4.D, component E) — the hardest part
//! of this crate. A single long-lived task drains an unbounded mpsc channel of
//! [`DeletionItem`]s, buffers them, and flushes by size, interval, or shutdown,
//! grouped per `(user_id, table_tag)`. Modeled on [`crate`]'s own
//! command-channel-plus-`tokio::select!` background task shape (the teacher's
//! `pg_listen` task: a channel of commands, a broadcast-style shutdown, one
//! `tokio::spawn`ed loop).
//!
//! `flush`/`delete_batch` take a [`DeleteSink`] rather than being hardcoded to
//! `Arc<Mutex<PgPool>>`, the same way the teacher's
//! `applogic/src/app_state/mark_as_read_debouncer.rs` abstracts `debouncing_timer`'s
//! I/O behind a `MarkAsRead` trait, specifically so that loop can be driven end to
//! end in a unit test against an in-memory `TestUser` instead of a live backend.
//! [`PgDeleteSink`] is the real Postgres-backed implementation the coalescer is
//! actually spawned with; the test module below has an in-memory one.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vaultcommon::TableTag;

use crate::error::StorageError;

/// How many buffered deletions trigger an immediate flush, independent of the
/// ticker (spec §4.D, `FLUSH_SIZE`).
const FLUSH_SIZE: usize = 10;

/// The ticker period that flushes a non-empty, below-threshold buffer
/// (spec §4.D, `FLUSH_INTERVAL`).
const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// One buffered deletion: an encoded identifier, scoped to a user and a table.
/// Lives only between [`crate::storage::Storage::enqueue_delete`] and the next
/// flush; never persisted (spec §3).
#[derive(Debug, Clone)]
pub struct DeletionItem {
    pub user_id: String,
    pub identifier_ct: String,
    pub table_tag: TableTag,
}

/// Where a flushed batch's `DELETE`s actually land. Abstracting this out of
/// `flush`/`delete_batch` is what lets the coalescer's select-loop triggers
/// (size/interval/shutdown) be driven in tests without a live Postgres instance;
/// see the module doc comment.
pub(super) trait DeleteSink: Send + Sync + 'static {
    fn delete_batch(
        &self,
        table_tag: TableTag,
        user_id: String,
        identifiers: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}

/// The real sink: `DELETE FROM <table> WHERE user_id = $1 AND identifier_ct =
/// ANY($2)` inside a transaction, sharing the storage mutex with request
/// handlers and racing a per-call timeout, exactly as the storage engine's own
/// calls do (spec §4.D). A zero-row delete is success (spec invariant 4).
pub(super) struct PgDeleteSink {
    pool: Arc<Mutex<PgPool>>,
    timeout: Duration,
}

impl PgDeleteSink {
    pub(super) fn new(pool: Arc<Mutex<PgPool>>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

impl DeleteSink for PgDeleteSink {
    fn delete_batch(
        &self,
        table_tag: TableTag,
        user_id: String,
        identifiers: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        Box::pin(async move {
            let table = table_tag.table_name();
            let guard_fut = self.pool.lock();
            tokio::select! {
                _ = tokio::time::sleep(self.timeout) => Err(StorageError::ContextTimeout),
                guard = guard_fut => {
                    let mut tx = guard
                        .begin()
                        .await
                        .map_err(StorageError::Execution)?;

                    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                        format!("DELETE FROM {table} WHERE user_id = "),
                    );
                    builder.push_bind(&user_id);
                    builder.push(" AND identifier_ct = ANY(");
                    builder.push_bind(&identifiers);
                    builder.push(")");

                    let exec_result = builder.build().execute(&mut *tx).await;
                    match exec_result {
                        Ok(_) => tx.commit().await.map_err(StorageError::Execution),
                        Err(err) => {
                            // Rolling back by dropping `tx` without committing releases
                            // the transaction's resources; no explicit ROLLBACK needed.
                            drop(tx);
                            Err(StorageError::Execution(err))
                        }
                    }
                }
            }
        })
    }
}

/// Spawns the coalescer task and returns a handle to it. The task runs until
/// `shutdown` is cancelled and its final flush (if any) completes; callers that
/// need an ordered shutdown (spec §6: drain the coalescer and commit remaining
/// deletions *before* closing the store handle) must `.await` the returned
/// handle after signalling `shutdown`, rather than letting it run detached.
pub(super) fn spawn<S: DeleteSink>(
    sink: S,
    mut rx: mpsc::UnboundedReceiver<DeletionItem>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut parts: Vec<DeletionItem> = Vec::with_capacity(FLUSH_SIZE);
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        // The first `tick()` resolves immediately; harmless here since `parts`
        // starts empty, but consumed up front so later ticks land on the real
        // FLUSH_INTERVAL boundary rather than one tick early.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    if !parts.is_empty() {
                        flush_or_die(&sink, std::mem::take(&mut parts), "shutdown").await;
                    }
                    rx.close();
                    break;
                }
                _ = ticker.tick() => {
                    if !parts.is_empty() {
                        flush_or_die(&sink, std::mem::take(&mut parts), "interval").await;
                    }
                }
                item = rx.recv() => {
                    match item {
                        Some(item) => {
                            parts.push(item);
                            if parts.len() >= FLUSH_SIZE {
                                flush_or_die(&sink, std::mem::take(&mut parts), "size").await;
                            }
                        }
                        None => {
                            if !parts.is_empty() {
                                flush_or_die(&sink, std::mem::take(&mut parts), "channel close").await;
                            }
                            break;
                        }
                    }
                }
            }
        }

        info!("delete coalescer drained and stopped");
    })
}

/// A `flush` failure is fatal (spec §4.D, §7): the coalescer is a
/// process-critical invariant, so this terminates the process rather than
/// silently dropping buffered deletions or limping on with a wedged buffer.
async fn flush_or_die<S: DeleteSink>(sink: &S, batch: Vec<DeletionItem>, trigger: &'static str) {
    if let Err(err) = flush(sink, batch).await {
        error!(%err, trigger, "fatal error flushing deletions, terminating process");
        std::process::exit(1);
    }
}

/// Groups `batch` into one `(user_id, Vec<identifier_ct>)` map per table tag, and
/// issues one `delete_batch` per group (spec §4.D).
async fn flush<S: DeleteSink>(sink: &S, batch: Vec<DeletionItem>) -> Result<(), StorageError> {
    let mut by_table: HashMap<TableTag, HashMap<String, Vec<String>>> = HashMap::new();
    for item in batch {
        by_table
            .entry(item.table_tag)
            .or_default()
            .entry(item.user_id)
            .or_default()
            .push(item.identifier_ct);
    }

    for (table_tag, by_user) in by_table {
        for (user_id, identifiers) in by_user {
            sink.delete_batch(table_tag, user_id, identifiers).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use super::*;

    /// Records every `delete_batch` call instead of touching a database, so the
    /// coalescer's select-loop triggers can be driven end to end. Mirrors the
    /// teacher's in-memory `TestUser` fake for `MarkAsRead` in
    /// `mark_as_read_debouncer.rs`.
    #[derive(Clone, Default)]
    struct RecordingSink {
        calls: Arc<StdMutex<Vec<(TableTag, String, Vec<String>)>>>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<(TableTag, String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DeleteSink for RecordingSink {
        fn delete_batch(
            &self,
            table_tag: TableTag,
            user_id: String,
            identifiers: Vec<String>,
        ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
            let calls = Arc::clone(&self.calls);
            Box::pin(async move {
                calls.lock().unwrap().push((table_tag, user_id, identifiers));
                Ok(())
            })
        }
    }

    fn item(user_id: &str, identifier: &str, table_tag: TableTag) -> DeletionItem {
        DeletionItem {
            user_id: user_id.to_string(),
            identifier_ct: identifier.to_string(),
            table_tag,
        }
    }

    /// Lets the coalescer task — woken by a channel send or a cancelled token —
    /// actually run on this single-threaded test runtime before the test
    /// inspects the sink it was given.
    async fn settle() {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn flush_groups_by_table_then_user() {
        let sink = RecordingSink::default();
        let batch = vec![
            item("u1", "c1", TableTag::BankCard),
            item("u1", "c2", TableTag::BankCard),
            item("u2", "c3", TableTag::BankCard),
            item("u1", "t1", TableTag::TextBinary),
        ];

        flush(&sink, batch).await.unwrap();

        let calls: HashSet<_> = sink.calls().into_iter().collect();
        let expected: HashSet<_> = [
            (TableTag::BankCard, "u1".to_string(), vec!["c1".to_string(), "c2".to_string()]),
            (TableTag::BankCard, "u2".to_string(), vec!["c3".to_string()]),
            (TableTag::TextBinary, "u1".to_string(), vec!["t1".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(calls, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn size_trigger_flushes_exactly_once() {
        let sink = RecordingSink::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = spawn(sink.clone(), rx, shutdown.clone());

        for i in 0..FLUSH_SIZE {
            tx.send(item("u1", &format!("c{i}"), TableTag::BankCard)).unwrap();
        }
        settle().await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 1, "hitting FLUSH_SIZE must flush exactly once");
        let (table_tag, user_id, mut identifiers) = calls[0].clone();
        identifiers.sort();
        assert_eq!(table_tag, TableTag::BankCard);
        assert_eq!(user_id, "u1");
        let mut expected: Vec<String> = (0..FLUSH_SIZE).map(|i| format!("c{i}")).collect();
        expected.sort();
        assert_eq!(identifiers, expected);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_trigger_flushes_a_partial_batch() {
        let sink = RecordingSink::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = spawn(sink.clone(), rx, shutdown.clone());

        tx.send(item("u1", "c1", TableTag::BankCard)).unwrap();
        tx.send(item("u1", "c2", TableTag::BankCard)).unwrap();
        tx.send(item("u1", "c3", TableTag::BankCard)).unwrap();
        settle().await;
        assert!(
            sink.calls().is_empty(),
            "below FLUSH_SIZE must not flush before the ticker fires"
        );

        tokio::time::advance(FLUSH_INTERVAL).await;
        settle().await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 1, "the interval ticker must flush exactly once");
        let (table_tag, user_id, mut identifiers) = calls[0].clone();
        identifiers.sort();
        assert_eq!(table_tag, TableTag::BankCard);
        assert_eq!(user_id, "u1");
        assert_eq!(identifiers, vec!["c1".to_string(), "c2".to_string(), "c3".to_string()]);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_remaining_items_before_exit() {
        let sink = RecordingSink::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = spawn(sink.clone(), rx, shutdown.clone());

        tx.send(item("u1", "c1", TableTag::LoginPassword)).unwrap();
        tx.send(item("u1", "c2", TableTag::LoginPassword)).unwrap();
        settle().await;
        assert!(
            sink.calls().is_empty(),
            "a below-threshold buffer must not flush on its own"
        );

        shutdown.cancel();
        handle.await.expect("coalescer task must exit cleanly on shutdown");

        let calls = sink.calls();
        assert_eq!(calls.len(), 1, "shutdown must flush the remaining buffer exactly once");
        let (table_tag, user_id, mut identifiers) = calls[0].clone();
        identifiers.sort();
        assert_eq!(table_tag, TableTag::LoginPassword);
        assert_eq!(user_id, "u1");
        assert_eq!(identifiers, vec!["c1".to_string(), "c2".to_string()]);
    }
}
