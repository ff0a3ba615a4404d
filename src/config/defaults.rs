/// Configuration default values
///
/// All defaults live here so they can be changed in one place.
// Batch upsert defaults
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 300;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RETRY_JITTER: bool = true;
pub const DEFAULT_ITEM_LIMIT: usize = 500;
pub const DEFAULT_CONCURRENCY: usize = 1;

// Board API defaults
pub const DEFAULT_BOARD_API_URL: &str = "https://api.monday.com/v2";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Dedupe defaults
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.9;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_JSON: bool = false;

// Environment
pub const ENV_PREFIX: &str = "RECIPE_ENGINE_";
pub const ENV_NESTING_SEPARATOR: &str = "__";
