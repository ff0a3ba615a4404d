//! E.164 phone normalization

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Row, TransformOptions, Value};
use crate::transforms::geo::country_code_for;

const DEFAULT_COUNTRY: &str = "US";
const MIN_E164_DIGITS: usize = 8;
const MAX_E164_DIGITS: usize = 15;

/// ISO 3166 alpha-2 -> calling code
const CALLING_CODES: &[(&str, &str)] = &[
    ("US", "1"),
    ("CA", "1"),
    ("GB", "44"),
    ("IE", "353"),
    ("FR", "33"),
    ("DE", "49"),
    ("ES", "34"),
    ("IT", "39"),
    ("PT", "351"),
    ("NL", "31"),
    ("BE", "32"),
    ("CH", "41"),
    ("AT", "43"),
    ("SE", "46"),
    ("NO", "47"),
    ("DK", "45"),
    ("FI", "358"),
    ("PL", "48"),
    ("CZ", "420"),
    ("GR", "30"),
    ("TR", "90"),
    ("RU", "7"),
    ("UA", "380"),
    ("IL", "972"),
    ("AE", "971"),
    ("SA", "966"),
    ("IN", "91"),
    ("PK", "92"),
    ("CN", "86"),
    ("HK", "852"),
    ("TW", "886"),
    ("JP", "81"),
    ("KR", "82"),
    ("SG", "65"),
    ("MY", "60"),
    ("TH", "66"),
    ("VN", "84"),
    ("PH", "63"),
    ("ID", "62"),
    ("AU", "61"),
    ("NZ", "64"),
    ("ZA", "27"),
    ("NG", "234"),
    ("KE", "254"),
    ("EG", "20"),
    ("MX", "52"),
    ("BR", "55"),
    ("AR", "54"),
    ("CL", "56"),
    ("CO", "57"),
    ("PE", "51"),
];

fn extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*(?:ext\.?|extension|x|#)\s*\d+\s*$").expect("valid extension regex")
    })
}

fn calling_code(country: &str) -> Option<&'static str> {
    CALLING_CODES
        .iter()
        .find(|(iso, _)| iso.eq_ignore_ascii_case(country))
        .map(|(_, code)| *code)
}

fn valid_nanp(national: &str) -> bool {
    let bytes = national.as_bytes();
    national.len() == 10 && bytes[0] >= b'2' && bytes[3] >= b'2'
}

fn is_plausible(digits: &str) -> bool {
    (MIN_E164_DIGITS..=MAX_E164_DIGITS).contains(&digits.len()) && !digits.starts_with('0')
}

/// Digits-only E.164 body (without `+`) for a raw phone string
fn to_e164_digits(raw: &str, country: &str) -> Option<String> {
    let without_ext = extension_regex().replace(raw.trim(), "");
    let trimmed = without_ext.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_alphabetic()) {
        return None;
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if trimmed.starts_with('+') {
        return is_plausible(&digits).then_some(digits);
    }
    if let Some(international) = digits.strip_prefix("00") {
        return is_plausible(international).then(|| international.to_string());
    }

    let code = calling_code(country)?;
    if code == "1" {
        let national = match digits.len() {
            11 if digits.starts_with('1') => &digits[1..],
            10 => digits.as_str(),
            _ => return None,
        };
        return valid_nanp(national).then(|| format!("1{national}"));
    }

    // Italy keeps the leading zero of landlines in international form
    let national = if country.eq_ignore_ascii_case("IT") {
        digits.as_str()
    } else {
        digits.strip_prefix('0').unwrap_or(&digits)
    };
    let national = national.strip_prefix(code).filter(|_| digits.len() > 10).unwrap_or(national);

    let full = format!("{code}{national}");
    is_plausible(&full).then_some(full)
}

/// Normalize to `+<country code><number>`.
///
/// The default country comes from `defaultCountry` (name or ISO code) and
/// falls back to US. Numbers that cannot be interpreted are left unchanged.
pub fn phone_e164(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_u64() => n.to_string(),
        other => return other.clone(),
    };

    let country = options
        .default_country
        .as_deref()
        .and_then(country_code_for)
        .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());

    match to_e164_digits(&raw, &country) {
        Some(digits) => Value::String(format!("+{digits}")),
        None => value.clone(),
    }
}
