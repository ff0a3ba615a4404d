//! Batched, throttled, retrying upsert of rows into a board
//!
//! One call builds its own key index and counters. Rows are processed in
//! chunks with an awaited pause between chunks; a failing row is retried and
//! then recorded, never allowed to abort the rest of the run. Only a failed
//! key snapshot aborts, since create-vs-update decisions are unsafe without it.

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use strum::Display;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{BoardClient, ColumnValues, ItemId};
use super::key_index::{normalize_key, KeyIndex};
use super::retry::RetryPolicy;
use crate::config::UpsertConfig;
use crate::errors::{EngineError, EngineResult};
use crate::models::{is_blank, value_text, Row, Value, WriteBackConfig};

/// Display name used when a row has neither an item name nor a key
pub const FALLBACK_ITEM_NAME: &str = "Untitled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpsertAction {
    Create,
    Update,
}

/// What happened to one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row_index: usize,
    pub action: UpsertAction,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpsertResult {
    pub total_success: usize,
    pub total_failed: usize,
    /// One entry per attempted row, in input order
    pub results: Vec<RowOutcome>,
    /// Set when the run stopped early; counters cover the rows attempted
    pub cancelled: bool,
}

impl BatchUpsertResult {
    fn record(&mut self, outcome: RowOutcome) {
        if outcome.success {
            self.total_success += 1;
        } else {
            self.total_failed += 1;
        }
        self.results.push(outcome);
    }

    pub fn failures(&self) -> impl Iterator<Item = &RowOutcome> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Resolved target for one run
struct UpsertRun<'a> {
    board_id: &'a str,
    column_mapping: &'a IndexMap<String, String>,
    key_column: Option<&'a str>,
    item_name_field: Option<&'a str>,
    index: StdMutex<KeyIndex>,
    key_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UpsertRun<'_> {
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Drop the key's lock entry once no other row is waiting on it
    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        // one reference in the map, one held by the caller
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn held_key_locks(&self) -> usize {
        self.key_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn existing_id(&self, key: &str) -> Option<ItemId> {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn remember(&self, key: String, id: ItemId) {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, id);
    }

    /// Only mapped fields with a non-null value are sent
    fn column_values(&self, row: &Row) -> ColumnValues {
        self.column_mapping
            .iter()
            .filter_map(|(field, column_id)| match row.get(field) {
                None | Some(Value::Null) => None,
                Some(value) => Some((column_id.clone(), value.clone())),
            })
            .collect()
    }

    fn item_name(&self, row: &Row) -> String {
        self.item_name_field
            .map(|field| row.get(field))
            .filter(|value| !is_blank(*value))
            .map(|value| value_text(value).trim().to_string())
            .or_else(|| {
                self.key_column
                    .map(|field| row.get(field))
                    .filter(|value| !is_blank(*value))
                    .map(|value| value_text(value).trim().to_string())
            })
            .unwrap_or_else(|| FALLBACK_ITEM_NAME.to_string())
    }
}

/// Writes rows to a board with chunking, throttling and retries
#[derive(Clone)]
pub struct BatchUpserter {
    client: Arc<dyn BoardClient>,
    config: UpsertConfig,
    retry: RetryPolicy,
}

impl BatchUpserter {
    pub fn new(client: Arc<dyn BoardClient>, config: UpsertConfig) -> Self {
        let retry = config.retry_policy();
        Self {
            client,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &UpsertConfig {
        &self.config
    }

    pub async fn upsert_rows(
        &self,
        rows: &[Row],
        target: &WriteBackConfig,
    ) -> EngineResult<BatchUpsertResult> {
        self.upsert_rows_with_cancel(rows, target, &CancellationToken::new())
            .await
    }

    /// Like [`Self::upsert_rows`], stopping cleanly once `cancel` fires.
    ///
    /// Cancellation is observed between rows and during the inter-batch
    /// pause. Rows already attempted keep their outcomes.
    pub async fn upsert_rows_with_cancel(
        &self,
        rows: &[Row],
        target: &WriteBackConfig,
        cancel: &CancellationToken,
    ) -> EngineResult<BatchUpsertResult> {
        let run = self.prepare(target).await?;
        let start = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let chunk_count = rows.len().div_ceil(batch_size);
        let mut result = BatchUpsertResult::default();

        info!(
            "Upserting {} rows to board {} in {} batches of up to {}",
            rows.len(),
            run.board_id,
            chunk_count,
            batch_size
        );

        for (chunk_index, chunk) in rows.chunks(batch_size).enumerate() {
            if chunk_index > 0 {
                tokio::select! {
                    _ = sleep(self.config.batch_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let offset = chunk_index * batch_size;
            let outcomes = self.process_chunk(&run, offset, chunk, cancel).await;
            let attempted = outcomes.len();
            for outcome in outcomes {
                result.record(outcome);
            }
            debug!(
                "Batch {}/{} done: {} success, {} failed so far",
                chunk_index + 1,
                chunk_count,
                result.total_success,
                result.total_failed
            );

            if attempted < chunk.len() {
                result.cancelled = true;
                break;
            }
        }

        if result.cancelled {
            warn!(
                "Upsert to board {} cancelled after {} of {} rows",
                run.board_id,
                result.results.len(),
                rows.len()
            );
        }
        info!(
            "Upsert to board {} finished in {:?}: {} succeeded, {} failed",
            run.board_id,
            start.elapsed(),
            result.total_success,
            result.total_failed
        );
        Ok(result)
    }

    /// Validate the target and take the key snapshot
    async fn prepare<'a>(&self, target: &'a WriteBackConfig) -> EngineResult<UpsertRun<'a>> {
        target.ensure_ready()?;
        let (Some(board_id), Some(column_mapping)) =
            (target.board_id.as_deref(), target.column_mapping.as_ref())
        else {
            return Err(EngineError::configuration(
                "external_upsert requires boardId and columnMapping",
            ));
        };

        let key_column = target.key_column.as_deref().filter(|k| !k.trim().is_empty());
        let index = match key_column {
            None => KeyIndex::default(),
            Some(key_column) => {
                let key_column_id = target
                    .key_column_id
                    .as_deref()
                    .or_else(|| column_mapping.get(key_column).map(String::as_str))
                    .ok_or_else(|| {
                        EngineError::configuration(format!(
                            "key column '{key_column}' has no keyColumnId and is not in columnMapping"
                        ))
                    })?;

                let items = self
                    .client
                    .fetch_items(board_id, key_column_id, self.config.item_limit)
                    .await
                    .map_err(|e| {
                        warn!("Key snapshot for board {} failed: {}", board_id, e);
                        EngineError::Board(e)
                    })?;
                let index = KeyIndex::from_items(items);
                debug!("Key snapshot for board {}: {} keys", board_id, index.len());
                index
            }
        };

        Ok(UpsertRun {
            board_id,
            column_mapping,
            key_column,
            item_name_field: target.item_name_field.as_deref(),
            index: StdMutex::new(index),
            key_locks: StdMutex::new(HashMap::new()),
        })
    }

    async fn process_chunk(
        &self,
        run: &UpsertRun<'_>,
        offset: usize,
        chunk: &[Row],
        cancel: &CancellationToken,
    ) -> Vec<RowOutcome> {
        let concurrency = self.config.concurrency.max(1);

        if concurrency == 1 {
            let mut outcomes = Vec::with_capacity(chunk.len());
            for (i, row) in chunk.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                outcomes.push(self.upsert_row(run, offset + i, row).await);
            }
            return outcomes;
        }

        let pending: Vec<_> = chunk
            .iter()
            .enumerate()
            .map(|(i, row)| async move {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(self.upsert_row(run, offset + i, row).await)
                }
            })
            .collect();
        let mut outcomes: Vec<RowOutcome> = stream::iter(pending)
            .buffer_unordered(concurrency)
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.row_index);
        outcomes
    }

    async fn upsert_row(&self, run: &UpsertRun<'_>, row_index: usize, row: &Row) -> RowOutcome {
        let column_values = run.column_values(row);
        let key = run
            .key_column
            .and_then(|field| normalize_key(&value_text(row.get(field))));

        let Some(key) = key else {
            return self.create(run, row_index, row, &column_values, None).await;
        };

        // check-then-create must not interleave for rows sharing a key
        let lock = run.lock_for(&key);
        let guard = lock.lock().await;

        let result = match run.existing_id(&key) {
            Some(item_id) => {
                let attempted = self
                    .retry
                    .run("update_item", || {
                        self.client
                            .update_item(run.board_id, &item_id, &column_values)
                    })
                    .await;
                outcome(row_index, UpsertAction::Update, attempted)
            }
            None => {
                self.create(run, row_index, row, &column_values, Some(key.clone()))
                    .await
            }
        };

        drop(guard);
        run.release(&key, lock);
        result
    }

    async fn create(
        &self,
        run: &UpsertRun<'_>,
        row_index: usize,
        row: &Row,
        column_values: &ColumnValues,
        key: Option<String>,
    ) -> RowOutcome {
        let item_name = run.item_name(row);
        let attempted = self
            .retry
            .run("create_item", || {
                self.client
                    .create_item(run.board_id, &item_name, column_values)
            })
            .await;

        if let (Ok(id), Some(key)) = (&attempted.result, key) {
            run.remember(key, id.clone());
        }
        outcome(row_index, UpsertAction::Create, attempted)
    }
}

fn outcome(
    row_index: usize,
    action: UpsertAction,
    attempted: super::retry::Attempted<ItemId>,
) -> RowOutcome {
    match attempted.result {
        Ok(id) => RowOutcome {
            row_index,
            action,
            success: true,
            item_id: Some(id),
            error: None,
            attempts: attempted.attempts,
        },
        Err(e) => {
            warn!("Row {} {} failed: {}", row_index, action, e);
            RowOutcome {
                row_index,
                action,
                success: false,
                item_id: None,
                error: Some(e.to_string()),
                attempts: attempted.attempts,
            }
        }
    }
}
