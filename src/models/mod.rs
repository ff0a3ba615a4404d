//! Core data model shared by every pipeline step
//!
//! A [`Row`] is an insertion-ordered map of field name to JSON value. Steps
//! never mutate a row they were handed; each step builds a fresh row set.

use indexmap::IndexMap;

pub mod recipe;
pub mod results;

pub use recipe::*;
pub use results::*;
pub use serde_json::Value;

/// One logical record flowing through a recipe
pub type Row = IndexMap<String, Value>;

/// Render a value the way signatures and transforms see it.
///
/// Strings are returned as-is, numbers and booleans in their JSON spelling,
/// null/missing as the empty string. Nested structures are serialized.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// True when the value is missing, null, or a whitespace-only string
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Build a number value from an f64, falling back to null for NaN/inf
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Lowercased values of `fields` joined with `delimiter`, or `None` when every
/// field is blank. Used by the `unique` rule and exact dedupe.
pub fn composite_signature(row: &Row, fields: &[String], delimiter: &str) -> Option<String> {
    if fields.iter().all(|f| is_blank(row.get(f))) {
        return None;
    }
    Some(
        fields
            .iter()
            .map(|f| value_text(row.get(f)).trim().to_lowercase())
            .collect::<Vec<_>>()
            .join(delimiter),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(Some(&json!("Ann"))), "Ann");
        assert_eq!(value_text(Some(&json!(42))), "42");
        assert_eq!(value_text(Some(&json!(true))), "true");
        assert_eq!(value_text(Some(&Value::Null)), "");
        assert_eq!(value_text(None), "");
    }

    #[test]
    fn test_blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!("   "))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
    }

    #[test]
    fn test_number_value_prefers_integers() {
        assert_eq!(number_value(3.0), json!(3));
        assert_eq!(number_value(0.45), json!(0.45));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_composite_signature() {
        let fields = vec!["first".to_string(), "last".to_string()];
        let r = row(json!({"first": "Ann", "last": " LEE "}));
        assert_eq!(composite_signature(&r, &fields, "|").as_deref(), Some("ann|lee"));

        let empty = row(json!({"first": "", "other": "x"}));
        assert_eq!(composite_signature(&empty, &fields, "|"), None);
    }
}
