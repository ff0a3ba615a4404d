//! Error type definitions for the recipe engine
//!
//! Only fatal conditions live here: configuration mistakes, unsupported
//! steps, failures talking to the external board, and store failures.
//! Row-level findings (validation, dedupe, capability gating) are data and
//! are returned inside run results as [`crate::models::RecipeError`].

use thiserror::Error;

/// Top-level engine error type
///
/// Any of these aborts the current preview/execute call and is surfaced to
/// the caller as an `Err`.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing or inconsistent recipe/step configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A step type the engine does not know how to run
    #[error("Unsupported step type: {step_type}")]
    UnsupportedStep { step_type: String },

    /// A write-back strategy the handler does not implement
    #[error("Unsupported write-back strategy: {strategy}")]
    UnsupportedStrategy { strategy: String },

    /// Recipe JSON that could not be decoded
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(#[from] serde_json::Error),

    /// The injected write-back handler failed
    #[error("Write-back failed: {message}")]
    WriteBack { message: String },

    /// External board errors that abort the operation
    #[error("Board error: {0}")]
    Board(#[from] BoardError),

    /// Recipe/run store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The caller cancelled the run
    #[error("Operation cancelled")]
    Cancelled,
}

/// External board (column-oriented store) errors
#[derive(Error, Debug)]
pub enum BoardError {
    /// Transport-level failures
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    /// The API answered but reported errors in the payload
    #[error("API error: {message}")]
    Api { message: String },

    /// The API asked us to slow down
    #[error("Rate limited - retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Response body did not have the expected shape
    #[error("Unexpected response: {message}")]
    Decode { message: String },
}

/// Recipe and run store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Write rejected, e.g. stale version
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

/// Convenience methods for creating common error types
impl EngineError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unsupported step error
    pub fn unsupported_step<S: Into<String>>(step_type: S) -> Self {
        Self::UnsupportedStep {
            step_type: step_type.into(),
        }
    }

    /// Create a write-back error
    pub fn write_back<S: Into<String>>(message: S) -> Self {
        Self::WriteBack {
            message: message.into(),
        }
    }
}

impl BoardError {
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Whether another attempt could reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BoardError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BoardError::Status { status, .. } => *status == 429 || *status >= 500,
            BoardError::RateLimited { .. } => true,
            BoardError::Api { message } => {
                let msg = message.to_lowercase();
                msg.contains("complexity") || msg.contains("rate limit") || msg.contains("timeout")
            }
            BoardError::Decode { .. } => false,
        }
    }
}

impl StoreError {
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}
