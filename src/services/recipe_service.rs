//! Recipe service: loading, targeting and running recipes
//!
//! The service layer owns everything around a run that the engine itself
//! stays out of: fetching recipes from a [`RecipeStore`], pointing a stored
//! recipe at a concrete board, and recording each execute run.

use chrono::Utc;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::EngineResult;
use crate::models::{
    Recipe, RecipeExecuteResult, RecipePreviewResult, RecipeStep, Row, RunOptions,
    WriteBackStrategy,
};
use crate::pipeline::{RecipeEngine, WriteBackHandler};
use crate::store::{RecipeStore, RunRecord};

/// Where a recipe's upsert steps should write for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBackTarget {
    pub board_id: String,
    /// Replaces the step's own mapping when set
    pub column_mapping: Option<IndexMap<String, String>>,
    /// Replaces the step's key column when set
    pub key_column: Option<String>,
}

impl WriteBackTarget {
    pub fn new(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            ..Self::default()
        }
    }

    pub fn with_column_mapping(mut self, mapping: IndexMap<String, String>) -> Self {
        self.column_mapping = Some(mapping);
        self
    }

    pub fn with_key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = Some(key_column.into());
        self
    }
}

pub struct RecipeService {
    store: Arc<dyn RecipeStore>,
    engine: RecipeEngine,
}

impl RecipeService {
    pub fn new(store: Arc<dyn RecipeStore>, engine: RecipeEngine) -> Self {
        Self { store, engine }
    }

    pub async fn load(&self, recipe_id: &str) -> EngineResult<Recipe> {
        Ok(self.store.get_recipe(recipe_id).await?)
    }

    /// Copy of `recipe` with every `external_upsert` step aimed at `target`.
    ///
    /// A missing `keyColumnId` is resolved through the (possibly replaced)
    /// column mapping. `recipe` itself is left untouched, so a stored recipe
    /// can be targeted at several boards.
    pub fn prepare_for_target(recipe: &Recipe, target: &WriteBackTarget) -> Recipe {
        let mut prepared = recipe.clone();

        for step in &mut prepared.steps {
            let RecipeStep::WriteBack(config) = step else {
                continue;
            };
            if config.strategy != WriteBackStrategy::ExternalUpsert {
                continue;
            }

            config.board_id = Some(target.board_id.clone());
            if let Some(mapping) = &target.column_mapping {
                config.column_mapping = Some(mapping.clone());
                // a stale id from the old mapping must not survive
                config.key_column_id = None;
            }
            if let Some(key_column) = &target.key_column {
                config.key_column = Some(key_column.clone());
                config.key_column_id = None;
            }
            if config.key_column_id.is_none() {
                config.key_column_id = match (&config.key_column, &config.column_mapping) {
                    (Some(key), Some(mapping)) => mapping.get(key).cloned(),
                    _ => None,
                };
            }
        }

        prepared
    }

    pub async fn preview(
        &self,
        recipe: &Recipe,
        rows: &[Row],
        options: RunOptions,
    ) -> EngineResult<RecipePreviewResult> {
        self.engine.preview(recipe, rows, options).await
    }

    /// Execute `recipe` and record the run.
    ///
    /// Failed runs are not recorded; a failure to record a successful run is
    /// logged and does not fail the call.
    pub async fn execute(
        &self,
        recipe: &Recipe,
        rows: &[Row],
        options: RunOptions,
        handler: &dyn WriteBackHandler,
    ) -> EngineResult<RecipeExecuteResult> {
        recipe.check_write_back_ready()?;

        let started_at = Utc::now();
        let result = self.engine.execute(recipe, rows, options, handler).await?;
        let record = RunRecord {
            id: Uuid::new_v4(),
            recipe_id: recipe.id.clone(),
            recipe_version: recipe.version,
            rows_processed: result.rows_processed,
            rows_written: result.rows_written,
            error_count: result.errors.len(),
            started_at,
            finished_at: Utc::now(),
        };

        let run_id = record.id;
        match self.store.record_run(record).await {
            Ok(()) => info!("Recorded run {} of recipe {}", run_id, recipe.id),
            Err(e) => warn!("Failed to record run of recipe {}: {}", recipe.id, e),
        }
        Ok(result)
    }

    pub async fn execute_stored(
        &self,
        recipe_id: &str,
        target: &WriteBackTarget,
        rows: &[Row],
        options: RunOptions,
        handler: &dyn WriteBackHandler,
    ) -> EngineResult<RecipeExecuteResult> {
        let recipe = self.load(recipe_id).await?;
        let prepared = Self::prepare_for_target(&recipe, target);
        self.execute(&prepared, rows, options, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::models::WriteBackConfig;
    use crate::store::InMemoryRecipeStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct Accept;

    #[async_trait]
    impl WriteBackHandler for Accept {
        async fn write_back(&self, _rows: &[Row], _config: &WriteBackConfig) -> EngineResult<()> {
            Ok(())
        }
    }

    fn stored_recipe() -> Recipe {
        Recipe::from_value(json!({
            "id": "contacts",
            "name": "Contacts",
            "version": 2,
            "steps": [
                {"type": "validate", "config": {"rules": [
                    {"type": "required", "field": "email"}
                ]}},
                {"type": "write_back", "config": {
                    "strategy": "external_upsert",
                    "keyColumn": "email"
                }}
            ]
        }))
        .unwrap()
    }

    fn write_back_config(recipe: &Recipe) -> &WriteBackConfig {
        recipe
            .steps
            .iter()
            .find_map(|step| match step {
                RecipeStep::WriteBack(config) => Some(config),
                _ => None,
            })
            .unwrap()
    }

    fn mapping() -> IndexMap<String, String> {
        [("email", "email_col"), ("name", "name_col")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prepare_for_target_fills_and_leaves_original_alone() {
        let recipe = stored_recipe();
        let target = WriteBackTarget::new("board-7").with_column_mapping(mapping());

        let prepared = RecipeService::prepare_for_target(&recipe, &target);
        let config = write_back_config(&prepared);
        assert_eq!(config.board_id.as_deref(), Some("board-7"));
        assert_eq!(config.key_column_id.as_deref(), Some("email_col"));
        assert_eq!(config.column_mapping.as_ref(), Some(&mapping()));

        let original = write_back_config(&recipe);
        assert!(original.board_id.is_none());
        assert!(original.column_mapping.is_none());
        assert!(original.key_column_id.is_none());
    }

    #[test]
    fn test_prepare_for_target_key_column_override() {
        let target = WriteBackTarget::new("b")
            .with_column_mapping(mapping())
            .with_key_column("name");
        let prepared = RecipeService::prepare_for_target(&stored_recipe(), &target);
        assert_eq!(
            write_back_config(&prepared).key_column_id.as_deref(),
            Some("name_col")
        );
    }

    #[tokio::test]
    async fn test_execute_stored_records_run() {
        let store = Arc::new(InMemoryRecipeStore::new());
        store.save_recipe(stored_recipe()).await.unwrap();
        let service = RecipeService::new(store.clone(), RecipeEngine::new());
        let rows: Vec<Row> =
            serde_json::from_value(json!([{"email": "a@x.com"}, {"email": ""}])).unwrap();

        let target = WriteBackTarget::new("board-7").with_column_mapping(mapping());
        let result = service
            .execute_stored("contacts", &target, &rows, RunOptions::default(), &Accept)
            .await
            .unwrap();
        assert_eq!(result.rows_processed, 2);
        assert_eq!(result.errors.len(), 1);

        let runs = store.list_runs("contacts").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].recipe_version, 2);
        assert_eq!(runs[0].error_count, 1);
        assert!(runs[0].finished_at >= runs[0].started_at);
    }

    #[tokio::test]
    async fn test_execute_untargeted_recipe_fails_without_recording() {
        let store = Arc::new(InMemoryRecipeStore::new());
        let service = RecipeService::new(store.clone(), RecipeEngine::new());

        let err = service
            .execute(&stored_recipe(), &[], RunOptions::default(), &Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
        assert!(store.list_runs("contacts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_recipe() {
        let service = RecipeService::new(Arc::new(InMemoryRecipeStore::new()), RecipeEngine::new());
        assert!(matches!(
            service.load("nope").await,
            Err(EngineError::Store(_))
        ));
    }
}
