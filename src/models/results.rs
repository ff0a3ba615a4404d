//! Findings, diffs and run results returned by the engine

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::{Row, Value};

/// Row index used for findings that are not tied to a single row
pub const RECIPE_LEVEL_ROW: i64 = -1;

/// Synthetic diff field carrying a whole dropped row (before) and the row it duplicated (after)
pub const DEDUPE_DIFF_FIELD: &str = "__dedupe__";

/// Closed vocabulary of finding codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    Required,
    Regex,
    RegexType,
    InSet,
    Unique,
    DedupeExact,
    DedupeFuzzy,
    DedupeFuzzyBlocked,
}

/// A row-scoped (or recipe-level, `row_index == -1`) finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeError {
    pub row_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub code: ErrorCode,
    pub message: String,
}

impl RecipeError {
    pub fn row(
        row_index: usize,
        field: Option<&str>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            row_index: row_index as i64,
            field: field.map(str::to_string),
            code,
            message: message.into(),
        }
    }

    pub fn recipe_level(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            row_index: RECIPE_LEVEL_ROW,
            field: None,
            code,
            message: message.into(),
        }
    }

    pub fn is_recipe_level(&self) -> bool {
        self.row_index == RECIPE_LEVEL_ROW
    }
}

/// A single observed value change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub row_index: usize,
    pub field: String,
    pub before: Value,
    pub after: Value,
}

impl DiffEntry {
    /// Returns `None` when `before` and `after` are equal by value
    pub fn change(row_index: usize, field: &str, before: Value, after: Value) -> Option<Self> {
        (before != after).then(|| Self {
            row_index,
            field: field.to_string(),
            before,
            after,
        })
    }

    /// Diff recording that the row at `row_index` was dropped as a duplicate of `retained`
    pub fn duplicate(row_index: usize, dropped: &Row, retained: &Row) -> Option<Self> {
        Self::change(
            row_index,
            DEDUPE_DIFF_FIELD,
            row_to_value(dropped),
            row_to_value(retained),
        )
    }
}

fn row_to_value(row: &Row) -> Value {
    Value::Object(row.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Caller capabilities, supplied per invocation and never stored on the recipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(default)]
    pub allow_fuzzy: bool,
}

impl RunOptions {
    pub fn with_fuzzy(allow_fuzzy: bool) -> Self {
        Self { allow_fuzzy }
    }
}

/// Output of a side-effect-free preview run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePreviewResult {
    pub rows: Vec<Row>,
    pub errors: Vec<RecipeError>,
    pub diff: Vec<DiffEntry>,
}

/// Output of a real run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeExecuteResult {
    /// Input row count
    pub rows_processed: usize,
    /// Rows surviving the pipeline, not necessarily what the board accepted
    pub rows_written: usize,
    pub errors: Vec<RecipeError>,
}
