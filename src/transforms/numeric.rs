//! Number, currency, percentage and boolean transforms

use crate::models::{number_value, Row, TransformOptions, Value};

const CURRENCY_PRECISION: u32 = 2;
const DEFAULT_ROUND_PRECISION: u32 = 2;

/// Group and decimal separators for a locale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub group: char,
    pub decimal: char,
}

impl NumberFormat {
    pub const EN: NumberFormat = NumberFormat {
        group: ',',
        decimal: '.',
    };

    /// Separators a locale uses when formatting `1234.5`.
    ///
    /// Only the language/region subtags matter; unknown locales fall back to `en`.
    pub fn for_locale(locale: &str) -> Self {
        let normalized = locale.replace('_', "-").to_lowercase();
        let mut parts = normalized.split('-');
        let language = parts.next().unwrap_or("");
        let region = parts.next().unwrap_or("");

        match (language, region) {
            ("de", "ch") | ("it", "ch") | ("fr", "ch") => NumberFormat {
                group: '\'',
                decimal: '.',
            },
            ("en", "za") => NumberFormat {
                group: ' ',
                decimal: ',',
            },
            ("es", "mx") => NumberFormat::EN,
            ("fr" | "ru" | "pl" | "sv" | "fi" | "nb" | "no" | "cs" | "sk" | "uk" | "hu", _) => {
                NumberFormat {
                    group: ' ',
                    decimal: ',',
                }
            }
            ("de" | "es" | "it" | "pt" | "nl" | "id" | "tr" | "da" | "el" | "ro" | "hr", _) => {
                NumberFormat {
                    group: '.',
                    decimal: ',',
                }
            }
            _ => NumberFormat::EN,
        }
    }

    /// Guess separators from the text itself when no locale is given.
    ///
    /// The right-most of `.`/`,` is the decimal mark when both appear; a lone
    /// comma followed by exactly three digits (possibly repeated) is grouping.
    pub fn detect(text: &str) -> Self {
        let last_dot = text.rfind('.');
        let last_comma = text.rfind(',');
        match (last_dot, last_comma) {
            (Some(d), Some(c)) if c > d => NumberFormat {
                group: '.',
                decimal: ',',
            },
            (Some(_), Some(_)) => NumberFormat::EN,
            (None, Some(c)) => {
                let comma_count = text.matches(',').count();
                let digits_after = text[c + 1..].chars().filter(|ch| ch.is_ascii_digit()).count();
                if comma_count > 1 || digits_after == 3 {
                    NumberFormat::EN
                } else {
                    NumberFormat {
                        group: '.',
                        decimal: ',',
                    }
                }
            }
            (Some(d), None) => {
                let dot_count = text.matches('.').count();
                let digits_after = text[d + 1..].chars().filter(|ch| ch.is_ascii_digit()).count();
                if dot_count > 1 && digits_after == 3 {
                    NumberFormat {
                        group: '.',
                        decimal: ',',
                    }
                } else {
                    NumberFormat::EN
                }
            }
            (None, None) => NumberFormat::EN,
        }
    }
}

/// Parse a human-formatted number ("$1,234.50", "1.234,5", "(12)", "1 000").
///
/// Returns `None` for anything that is not entirely a number once currency
/// symbols, spaces and grouping are removed, and for values too large to
/// hold as a finite `f64`.
pub fn parse_locale_number(text: &str, locale: Option<&str>) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative_parens, inner) = match trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let stripped: String = inner
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | '₹' | '\u{00A0}' | '\u{202F}'))
        .collect();
    let stripped = stripped.trim();

    let format = match locale {
        Some(l) => NumberFormat::for_locale(l),
        None => NumberFormat::detect(stripped),
    };

    let mut canonical = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c == format.group || (format.group == ' ' && c.is_whitespace()) {
            continue;
        } else if c == format.decimal {
            canonical.push('.');
        } else {
            canonical.push(c);
        }
    }

    let canonical = canonical.strip_prefix('+').unwrap_or(&canonical);
    let valid = {
        let body = canonical.strip_prefix('-').unwrap_or(canonical);
        !body.is_empty()
            && body.chars().all(|c| c.is_ascii_digit() || c == '.')
            && body.matches('.').count() <= 1
            && body.chars().any(|c| c.is_ascii_digit())
    };
    if !valid {
        return None;
    }

    let parsed: f64 = canonical.parse().ok().filter(|n: &f64| n.is_finite())?;
    Some(if negative_parens { -parsed } else { parsed })
}

/// Numeric view of a value: numbers as-is, strings via [`parse_locale_number`]
fn numeric_of(value: &Value, locale: Option<&str>) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_locale_number(s, locale),
        _ => None,
    }
}

/// Round half away from zero on the decimal representation, so 2.345 -> 2.35
fn round_to(n: f64, precision: u32) -> f64 {
    let p = precision.min(12);
    let factor = 10f64.powi(p as i32);
    let shifted: f64 = format!("{n}e{p}").parse().unwrap_or(n * factor);
    let rounded = shifted.round();
    format!("{rounded}e-{p}").parse().unwrap_or(rounded / factor)
}

pub fn number_parse(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    match value {
        Value::String(s) => parse_locale_number(s, options.locale.as_deref())
            .map(number_value)
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

pub fn round_numeric(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    let precision = options.precision.unwrap_or(DEFAULT_ROUND_PRECISION);
    numeric_of(value, options.locale.as_deref())
        .map(|n| number_value(round_to(n, precision)))
        .unwrap_or_else(|| value.clone())
}

pub fn round_to_currency(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    numeric_of(value, options.locale.as_deref())
        .map(|n| number_value(round_to(n, CURRENCY_PRECISION)))
        .unwrap_or_else(|| value.clone())
}

/// "45%" -> 0.45, 45 -> 0.45, 0.45 -> 0.45
pub fn normalize_percentage(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    let explicit_percent = matches!(value, Value::String(s) if s.trim_end().ends_with('%'));
    let numeric = match value {
        Value::String(s) => {
            parse_locale_number(s.trim().trim_end_matches('%'), options.locale.as_deref())
        }
        other => numeric_of(other, None),
    };
    let Some(n) = numeric else {
        return value.clone();
    };

    let fraction = if explicit_percent || n > 1.0 { n / 100.0 } else { n };
    // Keep 45% -> 0.45 exact instead of 0.45000000000000001
    number_value(round_to(fraction, 10))
}

pub fn boolean_standardize(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    match value {
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "on" | "x" | "checked" | "✓" => Value::Bool(true),
            "false" | "f" | "no" | "n" | "0" | "off" | "unchecked" => Value::Bool(false),
            _ => value.clone(),
        },
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Value::Bool(true),
            Some(v) if v == 0.0 => Value::Bool(false),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

pub fn currency_code(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_uppercase().chars().take(3).collect()),
        other => other.clone(),
    }
}
