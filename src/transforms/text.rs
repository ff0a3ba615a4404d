//! String-shaped transforms: casing, whitespace, emails, slugs, HTML, names, addresses

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::FieldUpdate;
use crate::models::{Row, TransformOptions, Value};

const DEFAULT_FIRST_NAME_FIELD: &str = "first_name";
const DEFAULT_LAST_NAME_FIELD: &str = "last_name";

/// Apply `f` to string values, pass everything else through untouched
fn map_str(value: &Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

pub fn title_case(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    map_str(value, title_case_str)
}

/// Lowercase, then uppercase the first letter of every whitespace-delimited token.
/// Whitespace is preserved as-is.
pub(crate) fn title_case_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_token_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_token_start = true;
            out.push(c);
        } else if at_token_start {
            out.extend(c.to_uppercase());
            at_token_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

pub fn email_normalize(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    map_str(value, |s| {
        let lowered = s.trim().to_lowercase();
        match lowered.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() => {
                let without_tag = local.split('+').next().unwrap_or(local);
                let compact: String = without_tag.chars().filter(|c| *c != '.').collect();
                format!("{compact}@{domain}")
            }
            _ => lowered,
        }
    })
}

pub fn trim_collapse_whitespace(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    map_str(value, collapse_whitespace)
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_alphanumeric_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"))
}

pub fn slugify(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    let separator = options.separator.as_deref().unwrap_or("-");
    map_str(value, |s| {
        let lowered = s.to_lowercase();
        let replaced = non_alphanumeric_runs().replace_all(&lowered, separator);
        let mut slug = replaced.into_owned();
        if !separator.is_empty() {
            let doubled = separator.repeat(2);
            while slug.contains(&doubled) {
                slug = slug.replace(&doubled, separator);
            }
            while let Some(rest) = slug.strip_prefix(separator) {
                slug = rest.to_string();
            }
            while let Some(rest) = slug.strip_suffix(separator) {
                slug = rest.to_string();
            }
        }
        slug
    })
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    ) || c.is_control()
}

pub fn remove_special_characters(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    map_str(value, |s| s.chars().filter(|c| !is_invisible(*c)).collect())
}

fn html_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid html regex")
    })
}

fn html_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid html regex"))
}

pub fn sanitize_html(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    map_str(value, |s| {
        if !s.contains('<') && !s.contains('&') {
            return s.to_string();
        }
        let without_blocks = html_block_regex().replace_all(s, "");
        let text = html_tag_regex().replace_all(&without_blocks, "");
        decode_entities(&text).trim().to_string()
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Split a full name into first/last sibling fields, keeping the source trimmed
pub fn split_name(field: &str, value: &Value, options: &TransformOptions) -> Vec<FieldUpdate> {
    let Value::String(full) = value else {
        return Vec::new();
    };
    let trimmed = full.trim();
    let mut tokens = trimmed.split_whitespace();
    let Some(first) = tokens.next() else {
        return Vec::new();
    };
    let last = tokens.collect::<Vec<_>>().join(" ");

    let first_field = options
        .first_name_field
        .as_deref()
        .unwrap_or(DEFAULT_FIRST_NAME_FIELD);
    let last_field = options
        .last_name_field
        .as_deref()
        .unwrap_or(DEFAULT_LAST_NAME_FIELD);

    vec![
        (field.to_string(), Value::String(trimmed.to_string())),
        (first_field.to_string(), Value::String(first.to_string())),
        (last_field.to_string(), Value::String(last)),
    ]
}

fn address_abbreviations() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            ("street", "St"),
            ("st", "St"),
            ("avenue", "Ave"),
            ("ave", "Ave"),
            ("av", "Ave"),
            ("road", "Rd"),
            ("rd", "Rd"),
            ("boulevard", "Blvd"),
            ("blvd", "Blvd"),
            ("drive", "Dr"),
            ("dr", "Dr"),
            ("lane", "Ln"),
            ("ln", "Ln"),
            ("court", "Ct"),
            ("ct", "Ct"),
            ("place", "Pl"),
            ("pl", "Pl"),
            ("terrace", "Ter"),
            ("highway", "Hwy"),
            ("hwy", "Hwy"),
            ("parkway", "Pkwy"),
            ("pkwy", "Pkwy"),
            ("suite", "Ste"),
            ("ste", "Ste"),
            ("apartment", "Apt"),
            ("apt", "Apt"),
            ("building", "Bldg"),
            ("floor", "Fl"),
            ("north", "N"),
            ("south", "S"),
            ("east", "E"),
            ("west", "W"),
            ("n", "N"),
            ("s", "S"),
            ("e", "E"),
            ("w", "W"),
            ("ne", "NE"),
            ("nw", "NW"),
            ("se", "SE"),
            ("sw", "SW"),
            ("northeast", "NE"),
            ("northwest", "NW"),
            ("southeast", "SE"),
            ("southwest", "SW"),
            ("po", "PO"),
        ]
        .into_iter()
        .collect()
    })
}

/// Light-weight address tidy-up: collapse whitespace, title case, and
/// canonical street-suffix/directional abbreviations. Not a parser.
pub fn normalize_address(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    map_str(value, |s| {
        collapse_whitespace(s)
            .split(' ')
            .map(normalize_address_token)
            .collect::<Vec<_>>()
            .join(" ")
    })
}

fn normalize_address_token(token: &str) -> String {
    let trailing_comma = token.ends_with(',');
    let core = token.trim_end_matches(',');
    let key = core.trim_end_matches('.').to_lowercase();

    let mut normalized = match address_abbreviations().get(key.as_str()) {
        Some(abbrev) => abbrev.to_string(),
        None if core.chars().any(|c| c.is_ascii_digit()) => normalize_numeric_token(core),
        None if core.eq_ignore_ascii_case("p.o.") => "PO".to_string(),
        None => title_case_str(core),
    };
    if trailing_comma {
        normalized.push(',');
    }
    normalized
}

/// "5TH" -> "5th", "#4b" -> "#4B", "12-a" -> "12-A"
fn normalize_numeric_token(token: &str) -> String {
    let ordinal = ["st", "nd", "rd", "th"]
        .iter()
        .any(|suffix| token.to_lowercase().ends_with(suffix))
        && token.chars().next().is_some_and(|c| c.is_ascii_digit());
    if ordinal {
        token.to_lowercase()
    } else {
        token.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn opts() -> TransformOptions {
        TransformOptions::default()
    }

    fn run(f: fn(&Value, &TransformOptions, &Row) -> Value, input: &str) -> Value {
        f(&json!(input), &opts(), &Row::new())
    }

    #[rstest]
    #[case("jOHN  o'neil", "John  O'neil")]
    #[case("ADA LOVELACE", "Ada Lovelace")]
    #[case("", "")]
    fn test_title_case(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(run(title_case, input), json!(expected));
    }

    #[rstest]
    #[case("John.Doe+news@Gmail.com", "johndoe@gmail.com")]
    #[case("a@b.com", "a@b.com")]
    #[case("first.last@sub.example.org", "firstlast@sub.example.org")]
    #[case("NOT-AN-EMAIL", "not-an-email")]
    fn test_email_normalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(run(email_normalize, input), json!(expected));
    }

    #[test]
    fn test_email_normalize_is_idempotent() {
        let once = run(email_normalize, "J.Doe+x@Example.COM");
        let twice = email_normalize(&once, &opts(), &Row::new());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_trim_collapse_whitespace() {
        assert_eq!(
            run(trim_collapse_whitespace, "  a \t b\n\nc  "),
            json!("a b c")
        );
    }

    #[rstest]
    #[case("Hello, World!", "-", "hello-world")]
    #[case("  --Already-slugged--  ", "-", "already-slugged")]
    #[case("Crème Brûlée 2024", "_", "cr_me_br_l_e_2024")]
    fn test_slugify(#[case] input: &str, #[case] sep: &str, #[case] expected: &str) {
        let options = TransformOptions {
            separator: Some(sep.to_string()),
            ..opts()
        };
        assert_eq!(slugify(&json!(input), &options, &Row::new()), json!(expected));
    }

    #[test]
    fn test_remove_special_characters() {
        assert_eq!(
            run(remove_special_characters, "a\u{200b}b\u{0007}c\u{feff}"),
            json!("abc")
        );
    }

    #[test]
    fn test_sanitize_html() {
        assert_eq!(
            run(
                sanitize_html,
                "<p>Hello <b>world</b> &amp; friends</p><script>alert(1)</script>"
            ),
            json!("Hello world & friends")
        );
        assert_eq!(run(sanitize_html, "plain text"), json!("plain text"));
    }

    #[test]
    fn test_split_name_defaults() {
        let updates = split_name("name", &json!("  Ada King Lovelace "), &opts());
        assert_eq!(
            updates,
            vec![
                ("name".to_string(), json!("Ada King Lovelace")),
                ("first_name".to_string(), json!("Ada")),
                ("last_name".to_string(), json!("King Lovelace")),
            ]
        );
    }

    #[test]
    fn test_split_name_custom_fields() {
        let options = TransformOptions {
            first_name_field: Some("given".to_string()),
            last_name_field: Some("family".to_string()),
            ..opts()
        };
        let updates = split_name("name", &json!("Cher"), &options);
        assert_eq!(updates[1], ("given".to_string(), json!("Cher")));
        assert_eq!(updates[2], ("family".to_string(), json!("")));
    }

    #[rstest]
    #[case("123 main street", "123 Main St")]
    #[case("45  north  5TH avenue, apt #4b", "45 N 5th Ave, Apt #4B")]
    #[case("PO box 12", "PO Box 12")]
    fn test_normalize_address(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(run(normalize_address, input), json!(expected));
    }

    #[test]
    fn test_non_strings_pass_through() {
        assert_eq!(title_case(&json!(5), &opts(), &Row::new()), json!(5));
        assert_eq!(slugify(&Value::Null, &opts(), &Row::new()), Value::Null);
    }
}
