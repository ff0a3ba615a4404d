//! Recipe orchestrator
//!
//! Interprets a recipe's steps strictly in order over a row set. `preview`
//! and `execute` share the same dispatch; they differ only in what happens at
//! a `write_back` step (skipped vs. handed to a [`WriteBackHandler`]) and in
//! what they report back.

use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

use crate::engines::{format_rows, map_columns, validate_rows, DedupeEngine, StepOutcome};
use crate::errors::EngineResult;
use crate::models::{
    DiffEntry, Recipe, RecipeError, RecipeExecuteResult, RecipePreviewResult, RecipeStep, Row,
    RunOptions,
};

pub mod write_back;

pub use write_back::WriteBackHandler;

enum RunMode<'a> {
    Preview,
    Execute(&'a dyn WriteBackHandler),
}

impl RunMode<'_> {
    fn name(&self) -> &'static str {
        match self {
            RunMode::Preview => "preview",
            RunMode::Execute(_) => "execute",
        }
    }
}

/// Runs recipes. Holds configuration only; every call starts from fresh state.
#[derive(Debug, Clone, Default)]
pub struct RecipeEngine {
    dedupe: DedupeEngine,
}

impl RecipeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `threshold` for fuzzy dedupe steps that do not set their own
    pub fn with_fuzzy_threshold(threshold: f64) -> Self {
        Self {
            dedupe: DedupeEngine::with_default_threshold(threshold),
        }
    }

    /// Dry run: transformed rows, every diff and every finding. Never performs
    /// write-back.
    pub async fn preview(
        &self,
        recipe: &Recipe,
        rows: &[Row],
        options: RunOptions,
    ) -> EngineResult<RecipePreviewResult> {
        let outcome = self.run(recipe, rows, options, RunMode::Preview).await?;
        Ok(RecipePreviewResult {
            rows: outcome.rows,
            errors: outcome.errors,
            diff: outcome.diff,
        })
    }

    /// Real run: every step including write-back through `handler`.
    ///
    /// `rows_written` counts rows surviving the pipeline, not what the handler
    /// actually persisted.
    pub async fn execute(
        &self,
        recipe: &Recipe,
        rows: &[Row],
        options: RunOptions,
        handler: &dyn WriteBackHandler,
    ) -> EngineResult<RecipeExecuteResult> {
        let outcome = self
            .run(recipe, rows, options, RunMode::Execute(handler))
            .await?;
        Ok(RecipeExecuteResult {
            rows_processed: rows.len(),
            rows_written: outcome.rows.len(),
            errors: outcome.errors,
        })
    }

    async fn run(
        &self,
        recipe: &Recipe,
        rows: &[Row],
        options: RunOptions,
        mode: RunMode<'_>,
    ) -> EngineResult<StepOutcome> {
        let span = info_span!(
            "recipe_run",
            recipe_id = %recipe.id,
            version = recipe.version,
            mode = mode.name()
        );
        self.run_steps(recipe, rows, options, mode)
            .instrument(span)
            .await
    }

    async fn run_steps(
        &self,
        recipe: &Recipe,
        rows: &[Row],
        options: RunOptions,
        mode: RunMode<'_>,
    ) -> EngineResult<StepOutcome> {
        let start = Instant::now();
        let mut current: Vec<Row> = rows.to_vec();
        let mut errors: Vec<RecipeError> = Vec::new();
        let mut diff: Vec<DiffEntry> = Vec::new();

        for (index, step) in recipe.steps.iter().enumerate() {
            debug!("Step {} ({}) over {} rows", index, step.kind(), current.len());

            match step {
                RecipeStep::MapColumns(config) => {
                    current = map_columns(&current, config);
                }
                RecipeStep::Format(config) => {
                    let (formatted, changes) = format_rows(&current, config);
                    current = formatted;
                    diff.extend(changes);
                }
                RecipeStep::Validate(config) => {
                    errors.extend(validate_rows(&current, config));
                }
                RecipeStep::Dedupe(config) => {
                    let outcome = self.dedupe.run(&current, config, options);
                    current = outcome.rows;
                    errors.extend(outcome.errors);
                    diff.extend(outcome.diff);
                }
                RecipeStep::WriteBack(config) => match &mode {
                    RunMode::Preview => {
                        debug!("Skipping write_back step {} in preview", index);
                    }
                    RunMode::Execute(handler) => {
                        config.ensure_ready()?;
                        info!(
                            "Writing back {} rows with strategy {}",
                            current.len(),
                            config.strategy
                        );
                        handler.write_back(&current, config).await?;
                    }
                },
            }
        }

        info!(
            "Recipe '{}' v{} {} finished in {:?}: {} of {} rows, {} findings",
            recipe.name,
            recipe.version,
            mode.name(),
            start.elapsed(),
            current.len(),
            rows.len(),
            errors.len()
        );

        Ok(StepOutcome {
            rows: current,
            errors,
            diff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::models::WriteBackConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl WriteBackHandler for Recording {
        async fn write_back(&self, rows: &[Row], _config: &WriteBackConfig) -> EngineResult<()> {
            self.calls.lock().unwrap().push(rows.len());
            Ok(())
        }
    }

    fn recipe(steps: serde_json::Value) -> Recipe {
        Recipe::from_value(json!({"id": "r", "name": "test", "version": 1, "steps": steps}))
            .unwrap()
    }

    fn rows(value: serde_json::Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_execute_calls_handler_once_per_write_back_step() {
        let recipe = recipe(json!([
            {"type": "dedupe", "config": {"keys": ["email"]}},
            {"type": "write_back", "config": {"strategy": "export"}},
            {"type": "write_back", "config": {"strategy": "export"}}
        ]));
        let handler = Recording::default();
        let input = rows(json!([{"email": "a@x.com"}, {"email": "a@x.com"}, {"email": "b@x.com"}]));

        let result = RecipeEngine::new()
            .execute(&recipe, &input, RunOptions::default(), &handler)
            .await
            .unwrap();

        assert_eq!(result.rows_processed, 3);
        assert_eq!(result.rows_written, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(*handler.calls.lock().unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_execute_rejects_incomplete_upsert_config() {
        let recipe = recipe(json!([
            {"type": "write_back", "config": {"strategy": "external_upsert", "boardId": "1"}}
        ]));
        let handler = Recording::default();

        let err = RecipeEngine::new()
            .execute(&recipe, &[], RunOptions::default(), &handler)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Configuration { .. }));
        assert!(handler.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preview_reports_rows_errors_and_diff() {
        let recipe = recipe(json!([
            {"type": "map_columns", "config": {"mapping": {"Name": "name", "Mail": "email"}}},
            {"type": "format", "config": {"transforms": [{"field": "name", "kind": "title_case"}]}},
            {"type": "validate", "config": {"rules": [{"type": "required", "field": "email"}]}}
        ]));
        let input = rows(json!([{"Name": "ada lovelace"}]));

        let result = RecipeEngine::new()
            .preview(&recipe, &input, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(result.rows[0]["name"], json!("Ada Lovelace"));
        assert_eq!(result.rows[0]["email"], json!(null));
        assert_eq!(result.diff.len(), 1);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_rows_still_reach_write_back() {
        let recipe = recipe(json!([
            {"type": "validate", "config": {"rules": [{"type": "required", "field": "email"}]}},
            {"type": "write_back", "config": {"strategy": "export"}}
        ]));
        let handler = Recording::default();

        let result = RecipeEngine::new()
            .execute(&recipe, &rows(json!([{"email": ""}])), RunOptions::default(), &handler)
            .await
            .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(*handler.calls.lock().unwrap(), vec![1]);
    }
}
