//! Validation engine: declarative rules producing row-scoped findings
//!
//! Rows are never modified or removed here. Every rule is evaluated for every
//! row in declaration order, and all findings are collected.

use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::models::{
    composite_signature, is_blank, value_text, ErrorCode, RecipeError, Row, ValidateConfig,
    ValidationRule,
};

const UNIQUE_DELIMITER: &str = "||";

/// A rule with its pattern compiled and its per-call state attached
enum PreparedRule<'a> {
    Required {
        field: &'a str,
        message: Option<&'a str>,
    },
    Regex {
        field: &'a str,
        pattern: &'a str,
        compiled: Result<Regex, String>,
        message: Option<&'a str>,
    },
    InSet {
        field: &'a str,
        allowed: HashSet<String>,
        case_insensitive: bool,
        message: Option<&'a str>,
    },
    Unique {
        fields: &'a [String],
        seen: HashSet<String>,
        message: Option<&'a str>,
    },
}

impl<'a> PreparedRule<'a> {
    fn prepare(rule: &'a ValidationRule) -> Self {
        match rule {
            ValidationRule::Required { field, message } => PreparedRule::Required {
                field,
                message: message.as_deref(),
            },
            ValidationRule::Regex {
                field,
                pattern,
                message,
            } => {
                let compiled = Regex::new(pattern).map_err(|e| e.to_string());
                if let Err(e) = &compiled {
                    warn!("Invalid validation pattern for field '{}': {}", field, e);
                }
                PreparedRule::Regex {
                    field,
                    pattern,
                    compiled,
                    message: message.as_deref(),
                }
            }
            ValidationRule::InSet {
                field,
                values,
                case_insensitive,
                message,
            } => {
                let case_insensitive = case_insensitive.unwrap_or(false);
                let allowed = values
                    .iter()
                    .map(|v| fold(v.trim(), case_insensitive))
                    .collect();
                PreparedRule::InSet {
                    field,
                    allowed,
                    case_insensitive,
                    message: message.as_deref(),
                }
            }
            ValidationRule::Unique { fields, message } => PreparedRule::Unique {
                fields,
                seen: HashSet::new(),
                message: message.as_deref(),
            },
        }
    }

    /// Evaluate against one row, returning at most one finding
    fn check(&mut self, row_index: usize, row: &Row) -> Option<RecipeError> {
        match self {
            PreparedRule::Required { field, message } => is_blank(row.get(*field)).then(|| {
                RecipeError::row(
                    row_index,
                    Some(*field),
                    ErrorCode::Required,
                    message.map_or_else(|| format!("{field} is required"), str::to_string),
                )
            }),
            PreparedRule::Regex {
                field,
                pattern,
                compiled,
                message,
            } => {
                if is_blank(row.get(*field)) {
                    return None;
                }
                match compiled {
                    Ok(re) => {
                        let text = value_text(row.get(*field));
                        (!re.is_match(&text)).then(|| {
                            RecipeError::row(
                                row_index,
                                Some(*field),
                                ErrorCode::Regex,
                                message.map_or_else(
                                    || format!("{field} does not match pattern {pattern}"),
                                    str::to_string,
                                ),
                            )
                        })
                    }
                    Err(reason) => Some(RecipeError::row(
                        row_index,
                        Some(*field),
                        ErrorCode::RegexType,
                        format!("Invalid pattern {pattern}: {reason}"),
                    )),
                }
            }
            PreparedRule::InSet {
                field,
                allowed,
                case_insensitive,
                message,
            } => {
                if is_blank(row.get(*field)) {
                    return None;
                }
                let text = value_text(row.get(*field));
                (!allowed.contains(&fold(text.trim(), *case_insensitive))).then(|| {
                    RecipeError::row(
                        row_index,
                        Some(*field),
                        ErrorCode::InSet,
                        message.map_or_else(
                            || format!("{field} value '{text}' is not an allowed value"),
                            str::to_string,
                        ),
                    )
                })
            }
            PreparedRule::Unique {
                fields,
                seen,
                message,
            } => {
                let signature = composite_signature(row, *fields, UNIQUE_DELIMITER)?;
                let label = fields.join(",");
                (!seen.insert(signature)).then(|| {
                    RecipeError::row(
                        row_index,
                        Some(&label),
                        ErrorCode::Unique,
                        message.map_or_else(
                            || format!("Duplicate value for {label}"),
                            str::to_string,
                        ),
                    )
                })
            }
        }
    }
}

fn fold(text: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

/// Evaluate every rule against every row.
///
/// `unique` state lives only for the duration of this call.
pub fn validate_rows(rows: &[Row], config: &ValidateConfig) -> Vec<RecipeError> {
    let mut rules: Vec<PreparedRule<'_>> = config.rules.iter().map(PreparedRule::prepare).collect();
    let mut errors = Vec::new();

    for (row_index, row) in rows.iter().enumerate() {
        for rule in rules.iter_mut() {
            if let Some(error) = rule.check(row_index, row) {
                errors.push(error);
            }
        }
    }

    debug!(
        "Validated {} rows against {} rules: {} findings",
        rows.len(),
        config.rules.len(),
        errors.len()
    );
    errors
}
