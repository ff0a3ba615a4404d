//! Step engines
//!
//! Each engine is a pure function of its input rows and step configuration.
//! None of them keeps state between calls.

use crate::models::{DiffEntry, RecipeError, Row};

pub mod dedupe;
pub mod format;
pub mod mapping;
pub mod similarity;
pub mod validation;

pub use dedupe::DedupeEngine;
pub use format::format_rows;
pub use mapping::map_columns;
pub use validation::validate_rows;

/// Rows, findings and diffs produced by a single step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub rows: Vec<Row>,
    pub errors: Vec<RecipeError>,
    pub diff: Vec<DiffEntry>,
}
