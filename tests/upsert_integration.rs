//! Batch upsert against an in-memory board

use async_trait::async_trait;
use recipe_engine::config::UpsertConfig;
use recipe_engine::errors::{BoardError, BoardResult};
use recipe_engine::models::{Row, WriteBackConfig, WriteBackStrategy};
use recipe_engine::upsert::{
    BatchUpserter, BoardClient, BoardWriteBack, ColumnValues, ExistingItem, ItemId,
};
use recipe_engine::{Recipe, RecipeEngine, RunOptions};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Board whose creates fail for one item name and throttle once per other name
#[derive(Default)]
struct FlakyBoard {
    reject_name: String,
    throttled_once: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, ColumnValues)>>,
    next_id: AtomicU32,
}

#[async_trait]
impl BoardClient for FlakyBoard {
    async fn fetch_items(
        &self,
        _board_id: &str,
        _key_column_id: &str,
        _limit: usize,
    ) -> BoardResult<Vec<ExistingItem>> {
        Ok(vec![])
    }

    async fn create_item(
        &self,
        _board_id: &str,
        item_name: &str,
        column_values: &ColumnValues,
    ) -> BoardResult<ItemId> {
        if item_name == self.reject_name {
            return Err(BoardError::Status {
                status: 400,
                message: "invalid value".to_string(),
            });
        }
        {
            let mut throttled = self.throttled_once.lock().unwrap();
            if !throttled.iter().any(|n| n == item_name) {
                throttled.push(item_name.to_string());
                return Err(BoardError::Status {
                    status: 503,
                    message: "busy".to_string(),
                });
            }
        }
        self.created
            .lock()
            .unwrap()
            .push((item_name.to_string(), column_values.clone()));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    async fn update_item(
        &self,
        _board_id: &str,
        item_id: &str,
        _column_values: &ColumnValues,
    ) -> BoardResult<ItemId> {
        Ok(item_id.to_string())
    }
}

fn target() -> WriteBackConfig {
    WriteBackConfig {
        strategy: WriteBackStrategy::ExternalUpsert,
        board_id: Some("b1".to_string()),
        key_column: Some("sku".to_string()),
        key_column_id: Some("sku_col".to_string()),
        column_mapping: Some(
            [("sku", "sku_col"), ("price", "price_col")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        item_name_field: None,
    }
}

fn config(batch_size: usize, batch_delay_ms: u64) -> UpsertConfig {
    UpsertConfig {
        batch_size,
        batch_delay: Duration::from_millis(batch_delay_ms),
        max_retries: 2,
        retry_initial_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(2),
        jitter: false,
        ..UpsertConfig::default()
    }
}

fn sku_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            serde_json::from_value(json!({"sku": format!("SKU-{i}"), "price": i, "note": "x"}))
                .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn test_partial_failure_keeps_going_and_counts() {
    let board = Arc::new(FlakyBoard {
        reject_name: "SKU-2".to_string(),
        ..FlakyBoard::default()
    });
    let upserter = BatchUpserter::new(board.clone(), config(2, 1));

    let result = upserter.upsert_rows(&sku_rows(5), &target()).await.unwrap();

    assert_eq!(result.total_success, 4);
    assert_eq!(result.total_failed, 1);
    assert_eq!(result.results.len(), 5);
    for (i, outcome) in result.results.iter().enumerate() {
        assert_eq!(outcome.row_index, i);
    }
    // transient 503 retried once, 400 not retried
    assert_eq!(result.results[0].attempts, 2);
    assert_eq!(result.results[2].attempts, 1);
    assert!(!result.results[2].success);

    // only mapped columns are sent
    let created = board.created.lock().unwrap();
    assert_eq!(created.len(), 4);
    let columns: Vec<&str> = created[0].1.keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["sku_col", "price_col"]);
}

#[tokio::test]
async fn test_delay_is_awaited_between_batches() {
    let board = Arc::new(FlakyBoard::default());
    let upserter = BatchUpserter::new(board, config(1, 40));

    let start = Instant::now();
    let result = upserter.upsert_rows(&sku_rows(3), &target()).await.unwrap();

    assert_eq!(result.total_success, 3);
    assert!(start.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn test_cancel_during_delay_keeps_counters() {
    let board = Arc::new(FlakyBoard::default());
    let upserter = BatchUpserter::new(board, config(2, 10_000));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = upserter
        .upsert_rows_with_cancel(&sku_rows(6), &target(), &cancel)
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(result.cancelled);
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.total_success + result.total_failed, 2);
}

#[tokio::test]
async fn test_execute_recipe_with_board_write_back() {
    let board = Arc::new(FlakyBoard::default());
    let handler = BoardWriteBack::new(BatchUpserter::new(board.clone(), config(10, 1)));
    let recipe = Recipe::from_value(json!({
        "id": "products",
        "name": "Products",
        "version": 1,
        "steps": [
            {"type": "format", "config": {"transforms": [
                {"field": "price", "kind": "round_to_currency"}
            ]}},
            {"type": "write_back", "config": {
                "strategy": "external_upsert",
                "boardId": "b1",
                "keyColumn": "sku",
                "columnMapping": {"sku": "sku_col", "price": "price_col"}
            }}
        ]
    }))
    .unwrap();

    let result = RecipeEngine::new()
        .execute(&recipe, &sku_rows(3), RunOptions::default(), &handler)
        .await
        .unwrap();

    assert_eq!(result.rows_written, 3);
    let upsert = handler.last_result().unwrap();
    assert_eq!(upsert.total_success, 3);
    assert_eq!(board.created.lock().unwrap().len(), 3);
}
