//! Recipe and run persistence
//!
//! The engine itself never touches storage. [`RecipeService`] uses a
//! [`RecipeStore`] to look up recipes by id and to record what each execute
//! run did. [`InMemoryRecipeStore`] is the default backing and the test
//! double; durable stores implement the same trait.
//!
//! [`RecipeService`]: crate::services::RecipeService

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};
use crate::models::Recipe;

/// Summary of one execute run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: Uuid,
    pub recipe_id: String,
    pub recipe_version: u32,
    pub rows_processed: usize,
    pub rows_written: usize,
    pub error_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn get_recipe(&self, id: &str) -> StoreResult<Recipe>;

    /// Insert or replace. A recipe may not go back to an older version.
    async fn save_recipe(&self, recipe: Recipe) -> StoreResult<()>;

    async fn record_run(&self, run: RunRecord) -> StoreResult<()>;

    /// Runs of `recipe_id`, oldest first
    async fn list_runs(&self, recipe_id: &str) -> StoreResult<Vec<RunRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryRecipeStore {
    recipes: RwLock<HashMap<String, Recipe>>,
    runs: RwLock<Vec<RunRecord>>,
}

impl InMemoryRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipeStore for InMemoryRecipeStore {
    async fn get_recipe(&self, id: &str) -> StoreResult<Recipe> {
        self.recipes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("recipe", id))
    }

    async fn save_recipe(&self, recipe: Recipe) -> StoreResult<()> {
        let mut recipes = self.recipes.write().await;
        if let Some(current) = recipes.get(&recipe.id) {
            if recipe.version < current.version {
                return Err(StoreError::Conflict {
                    message: format!(
                        "recipe {} is at version {}, refusing version {}",
                        recipe.id, current.version, recipe.version
                    ),
                });
            }
        }
        debug!("Saving recipe {} v{}", recipe.id, recipe.version);
        recipes.insert(recipe.id.clone(), recipe);
        Ok(())
    }

    async fn record_run(&self, run: RunRecord) -> StoreResult<()> {
        self.runs.write().await.push(run);
        Ok(())
    }

    async fn list_runs(&self, recipe_id: &str) -> StoreResult<Vec<RunRecord>> {
        Ok(self
            .runs
            .read()
            .await
            .iter()
            .filter(|run| run.recipe_id == recipe_id)
            .cloned()
            .collect())
    }
}
