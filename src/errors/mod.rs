//! Centralized error handling for the recipe engine
//!
//! # Error Categories
//!
//! - **Engine Errors**: configuration problems and unsupported steps that abort a run
//! - **Board Errors**: failures talking to the external board API
//! - **Store Errors**: recipe/run persistence failures
//!
//! Row-level data problems are never errors in this sense; they are collected
//! as [`crate::models::RecipeError`] entries in run results.
//!
//! # Usage
//!
//! ```rust
//! use recipe_engine::errors::{EngineError, EngineResult};
//!
//! fn require_board(board_id: Option<&str>) -> EngineResult<&str> {
//!     board_id.ok_or_else(|| EngineError::configuration("boardId is required"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using EngineError
pub type EngineResult<T> = Result<T, EngineError>;

/// Convenience type alias for board client Results
pub type BoardResult<T> = Result<T, BoardError>;

/// Convenience type alias for store Results
pub type StoreResult<T> = Result<T, StoreError>;
