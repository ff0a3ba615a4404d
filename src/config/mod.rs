//! Engine configuration
//!
//! Values are layered with figment: built-in defaults, then an optional TOML
//! file, then `RECIPE_ENGINE_*` environment variables (nested keys separated
//! by `__`, e.g. `RECIPE_ENGINE_UPSERT__BATCH_SIZE=25`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{EngineError, EngineResult};
use crate::upsert::RetryPolicy;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub upsert: UpsertConfig,
    pub board: BoardConfig,
    pub dedupe: DedupeSettings,
    pub logging: LoggingConfig,
}

/// Batch upsert throttling and retry behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpsertConfig {
    /// Rows per chunk
    pub batch_size: usize,
    /// Pause between chunks, always awaited
    #[serde(with = "duration_serde")]
    pub batch_delay: Duration,
    /// Retries after the first attempt for a failing row
    pub max_retries: u32,
    #[serde(with = "duration_serde")]
    pub retry_initial_delay: Duration,
    #[serde(with = "duration_serde")]
    pub retry_max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Upper bound on records fetched for the key snapshot
    pub item_limit: usize,
    /// Rows processed concurrently inside one chunk
    pub concurrency: usize,
}

impl Default for UpsertConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_initial_delay: Duration::from_millis(DEFAULT_RETRY_INITIAL_DELAY_MS),
            retry_max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_RETRY_JITTER,
            item_limit: DEFAULT_ITEM_LIMIT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl UpsertConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.retry_initial_delay,
            max_delay: self.retry_max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// GraphQL endpoint
    pub api_url: String,
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Sent as the `API-Version` header when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BOARD_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            api_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeSettings {
    /// Fuzzy threshold for recipes that enable fuzzy dedupe without one
    pub default_threshold: f64,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: DEFAULT_LOG_JSON,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the TOML file at `path` (if given and present)
    /// and then the environment.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_NESTING_SEPARATOR)))
    }

    /// Defaults overlaid with TOML text only; environment is ignored
    pub fn from_toml_str(toml: &str) -> EngineResult<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(EngineConfig::default())).merge(Toml::string(toml)),
        )
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::configuration(e.to_string()))
    }

    fn extract(figment: Figment) -> EngineResult<Self> {
        let config: EngineConfig = figment
            .extract()
            .map_err(|e| EngineError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.upsert.batch_size == 0 {
            return Err(EngineError::configuration("upsert.batch_size must be at least 1"));
        }
        if self.upsert.concurrency == 0 {
            return Err(EngineError::configuration("upsert.concurrency must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.dedupe.default_threshold) {
            return Err(EngineError::configuration(
                "dedupe.default_threshold must be between 0 and 1",
            ));
        }
        if self.upsert.backoff_multiplier < 1.0 {
            return Err(EngineError::configuration(
                "upsert.backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}
