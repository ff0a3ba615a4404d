//! Contract between the orchestrator and whatever persists final rows

use async_trait::async_trait;

use crate::errors::EngineResult;
use crate::models::{Row, WriteBackConfig};

/// Persists the rows that reach a `write_back` step.
///
/// Called exactly once per `write_back` step during execute and never during
/// preview. An `Err` aborts the run.
#[async_trait]
pub trait WriteBackHandler: Send + Sync {
    async fn write_back(&self, rows: &[Row], config: &WriteBackConfig) -> EngineResult<()>;
}

#[async_trait]
impl<T> WriteBackHandler for std::sync::Arc<T>
where
    T: WriteBackHandler + ?Sized,
{
    async fn write_back(&self, rows: &[Row], config: &WriteBackConfig) -> EngineResult<()> {
        (**self).write_back(rows, config).await
    }
}
