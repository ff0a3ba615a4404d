//! Deduplication engine: exact signature matching, then optional fuzzy matching
//!
//! Each call runs Build-Signatures, Exact-Filter and (when enabled and the
//! caller is entitled) Fuzzy-Filter over its own fresh state. The first row
//! seen always wins; retained rows are never modified.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::models::{
    composite_signature, value_text, DedupeConfig, DiffEntry, ErrorCode, RecipeError, Row,
    RunOptions,
};

use super::StepOutcome;
use crate::config::defaults::DEFAULT_FUZZY_THRESHOLD;

const EXACT_DELIMITER: &str = "||";

fn non_alphanumeric_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid composite regex"))
}

/// Lowercased key values with punctuation runs collapsed to single spaces
pub fn fuzzy_composite(row: &Row, keys: &[String]) -> String {
    let joined = keys
        .iter()
        .map(|k| value_text(row.get(k)).to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    non_alphanumeric_runs()
        .replace_all(&joined, " ")
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct DedupeEngine {
    default_threshold: f64,
}

impl Default for DedupeEngine {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl DedupeEngine {
    /// Threshold applied when a recipe enables fuzzy matching without one
    pub fn with_default_threshold(default_threshold: f64) -> Self {
        Self { default_threshold }
    }

    pub fn run(&self, rows: &[Row], config: &DedupeConfig, options: RunOptions) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let label = config.keys.join(",");

        // (input index, row) of rows surviving the exact phase
        let mut survivors: Vec<(usize, &Row)> = Vec::with_capacity(rows.len());
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (index, row) in rows.iter().enumerate() {
            let Some(signature) = composite_signature(row, &config.keys, EXACT_DELIMITER) else {
                survivors.push((index, row));
                continue;
            };
            match first_seen.get(&signature) {
                Some(&kept) => {
                    outcome.errors.push(RecipeError::row(
                        index,
                        Some(&label),
                        ErrorCode::DedupeExact,
                        format!("Exact duplicate of row {kept}"),
                    ));
                    outcome
                        .diff
                        .extend(DiffEntry::duplicate(index, row, &rows[kept]));
                }
                None => {
                    first_seen.insert(signature, index);
                    survivors.push((index, row));
                }
            }
        }

        let exact_dropped = rows.len() - survivors.len();
        let fuzzy = config.fuzzy.as_ref().filter(|f| f.enabled);

        let kept = match fuzzy {
            None => survivors,
            Some(_) if !options.allow_fuzzy => {
                info!("Fuzzy dedupe requested but not allowed for this caller");
                outcome.errors.push(RecipeError::recipe_level(
                    ErrorCode::DedupeFuzzyBlocked,
                    "Fuzzy deduplication is not available for this account; exact deduplication only",
                ));
                survivors
            }
            Some(fuzzy) => {
                let threshold = fuzzy.threshold.unwrap_or(self.default_threshold);
                let algorithm = fuzzy.algorithm.unwrap_or_default();
                let mut kept: Vec<(usize, &Row)> = Vec::with_capacity(survivors.len());
                let mut kept_composites: Vec<(usize, String)> = Vec::new();

                for (index, row) in survivors {
                    let composite = fuzzy_composite(row, &config.keys);
                    if composite.is_empty() {
                        kept.push((index, row));
                        continue;
                    }

                    let matched = kept_composites
                        .iter()
                        .map(|(kept_index, other)| {
                            (*kept_index, algorithm.similarity(&composite, other))
                        })
                        .find(|(_, score)| *score >= threshold);

                    match matched {
                        Some((kept_index, score)) => {
                            outcome.errors.push(RecipeError::row(
                                index,
                                Some(&label),
                                ErrorCode::DedupeFuzzy,
                                format!(
                                    "Likely duplicate of row {kept_index} (similarity {score:.2})"
                                ),
                            ));
                            outcome
                                .diff
                                .extend(DiffEntry::duplicate(index, row, &rows[kept_index]));
                        }
                        None => {
                            kept_composites.push((index, composite));
                            kept.push((index, row));
                        }
                    }
                }
                kept
            }
        };

        debug!(
            "Dedupe kept {} of {} rows ({} exact duplicates, {} fuzzy)",
            kept.len(),
            rows.len(),
            exact_dropped,
            rows.len() - exact_dropped - kept.len()
        );
        outcome.rows = kept.into_iter().map(|(_, row)| row.clone()).collect();
        outcome
    }
}
