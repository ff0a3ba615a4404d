//! Write-back handlers bridging `write_back` steps to concrete targets

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::batch::{BatchUpsertResult, BatchUpserter};
use crate::errors::{EngineError, EngineResult};
use crate::models::{value_text, Row, Value, WriteBackConfig, WriteBackStrategy};
use crate::pipeline::WriteBackHandler;

fn unsupported(strategy: WriteBackStrategy) -> EngineError {
    EngineError::UnsupportedStrategy {
        strategy: strategy.to_string(),
    }
}

/// Sends `external_upsert` steps to a board through [`BatchUpserter`].
///
/// Partial failures do not fail the step; the per-row outcome of the most
/// recent write-back is kept for the caller in [`BoardWriteBack::last_result`].
pub struct BoardWriteBack {
    upserter: BatchUpserter,
    cancel: CancellationToken,
    last_result: Mutex<Option<BatchUpsertResult>>,
}

impl BoardWriteBack {
    pub fn new(upserter: BatchUpserter) -> Self {
        Self {
            upserter,
            cancel: CancellationToken::new(),
            last_result: Mutex::new(None),
        }
    }

    /// Stop upserting early when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn last_result(&self) -> Option<BatchUpsertResult> {
        self.last_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl WriteBackHandler for BoardWriteBack {
    async fn write_back(&self, rows: &[Row], config: &WriteBackConfig) -> EngineResult<()> {
        if config.strategy != WriteBackStrategy::ExternalUpsert {
            return Err(unsupported(config.strategy));
        }

        let result = self
            .upserter
            .upsert_rows_with_cancel(rows, config, &self.cancel)
            .await?;
        if result.total_failed > 0 {
            warn!(
                "{} of {} rows failed to upsert",
                result.total_failed,
                result.results.len()
            );
        }
        *self.last_result.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        Ok(())
    }
}

/// Renders `export` steps as CSV held in memory.
///
/// Columns are ordered by first appearance across the rows. Values are
/// written as text; nulls become empty cells.
#[derive(Default)]
pub struct ExportWriteBack {
    output: Mutex<Option<String>>,
}

impl ExportWriteBack {
    pub fn new() -> Self {
        Self::default()
    }

    /// CSV produced by the most recent export, if any
    pub fn output(&self) -> Option<String> {
        self.output.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn render_csv(rows: &[Row]) -> EngineResult<String> {
        let mut header: Vec<&str> = Vec::new();
        let mut seen = BTreeSet::new();
        for row in rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    header.push(key.as_str());
                }
            }
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        let csv_error = |e: csv::Error| EngineError::write_back(format!("CSV export failed: {e}"));
        if !header.is_empty() {
            writer.write_record(&header).map_err(csv_error)?;
        }
        for row in rows {
            let record = header.iter().map(|field| match row.get(*field) {
                Some(Value::Null) | None => String::new(),
                value => value_text(value),
            });
            writer.write_record(record).map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| EngineError::write_back(format!("CSV export failed: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| EngineError::write_back(format!("CSV export is not UTF-8: {e}")))
    }
}

#[async_trait]
impl WriteBackHandler for ExportWriteBack {
    async fn write_back(&self, rows: &[Row], config: &WriteBackConfig) -> EngineResult<()> {
        if config.strategy != WriteBackStrategy::Export {
            return Err(unsupported(config.strategy));
        }
        let csv = Self::render_csv(rows)?;
        info!("Exported {} rows ({} bytes of CSV)", rows.len(), csv.len());
        *self.output.lock().unwrap_or_else(|e| e.into_inner()) = Some(csv);
        Ok(())
    }
}

/// Dispatches each write-back step to the handler for its strategy
#[derive(Default)]
pub struct StrategyRouter<'a> {
    upsert: Option<&'a dyn WriteBackHandler>,
    export: Option<&'a dyn WriteBackHandler>,
}

impl<'a> StrategyRouter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self, handler: &'a dyn WriteBackHandler) -> Self {
        self.upsert = Some(handler);
        self
    }

    pub fn export(mut self, handler: &'a dyn WriteBackHandler) -> Self {
        self.export = Some(handler);
        self
    }
}

#[async_trait]
impl WriteBackHandler for StrategyRouter<'_> {
    async fn write_back(&self, rows: &[Row], config: &WriteBackConfig) -> EngineResult<()> {
        let handler = match config.strategy {
            WriteBackStrategy::ExternalUpsert => self.upsert,
            WriteBackStrategy::Export => self.export,
        };
        match handler {
            Some(handler) => handler.write_back(rows, config).await,
            None => Err(unsupported(config.strategy)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    fn export_config() -> WriteBackConfig {
        WriteBackConfig {
            strategy: WriteBackStrategy::Export,
            board_id: None,
            key_column: None,
            key_column_id: None,
            column_mapping: None,
            item_name_field: None,
        }
    }

    #[test]
    fn test_render_csv_orders_columns_by_first_appearance() {
        let csv = ExportWriteBack::render_csv(&rows(json!([
            {"email": "a@x.com", "age": 30},
            {"email": "b@x.com", "note": "hi, there", "age": null}
        ])))
        .unwrap();

        assert_eq!(csv, "email,age,note\na@x.com,30,\nb@x.com,,\"hi, there\"\n");
    }

    #[test]
    fn test_render_csv_empty() {
        assert_eq!(ExportWriteBack::render_csv(&[]).unwrap(), "");
    }

    #[tokio::test]
    async fn test_export_handler_stores_output_and_rejects_upsert() {
        let handler = ExportWriteBack::new();
        handler
            .write_back(&rows(json!([{"a": 1}])), &export_config())
            .await
            .unwrap();
        assert_eq!(handler.output().as_deref(), Some("a\n1\n"));

        let upsert = WriteBackConfig {
            strategy: WriteBackStrategy::ExternalUpsert,
            ..export_config()
        };
        assert!(matches!(
            handler.write_back(&[], &upsert).await,
            Err(EngineError::UnsupportedStrategy { .. })
        ));
    }

    #[tokio::test]
    async fn test_router_without_handler_is_unsupported() {
        let export = ExportWriteBack::new();
        let router = StrategyRouter::new().export(&export);
        router.write_back(&[], &export_config()).await.unwrap();

        let upsert = WriteBackConfig {
            strategy: WriteBackStrategy::ExternalUpsert,
            ..export_config()
        };
        assert!(router.write_back(&[], &upsert).await.is_err());
    }
}
