pub mod config;
pub mod engines;
pub mod errors;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod transforms;
pub mod upsert;

pub use errors::{EngineError, EngineResult};
pub use models::{Recipe, RecipeExecuteResult, RecipePreviewResult, Row, RunOptions};
pub use pipeline::{RecipeEngine, WriteBackHandler};
