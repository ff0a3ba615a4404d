//! Date and timestamp transforms

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt::Write;

use crate::models::{Row, TransformOptions, Value};

const DEFAULT_OUTPUT_FORMAT: &str = "yyyy-MM-dd";

/// Formats tried in order when no explicit input format is configured.
/// Month-first wins over day-first for ambiguous slashes.
const FREE_FORM_DATETIMES: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const FREE_FORM_DATES: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%m/%d/%y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A, %B %d, %Y",
    "%Y%m%d",
];

/// Translate a `yyyy-MM-dd`-style pattern into a chrono strftime string.
///
/// Patterns that already contain `%` are taken to be strftime and returned
/// unchanged. Text in single quotes is copied literally.
pub fn to_strftime(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                out.push(chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        let token = match (c, run) {
            ('y', 2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1) => Some("%-m"),
            ('M', 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1) => Some("%-d"),
            ('d', _) => Some("%d"),
            ('H', 1) => Some("%-H"),
            ('H', _) => Some("%H"),
            ('h', 1) => Some("%-I"),
            ('h', _) => Some("%I"),
            ('m', 1) => Some("%-M"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('a', _) => Some("%p"),
            ('E', 1..=3) => Some("%a"),
            ('E', _) => Some("%A"),
            _ => None,
        };

        match token {
            Some(t) => out.push_str(t),
            None => {
                for _ in 0..run {
                    out.push(c);
                }
            }
        }
        i += run;
    }
    out
}

fn parse_with(text: &str, fmt: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, fmt)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_free_form(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    FREE_FORM_DATETIMES
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            FREE_FORM_DATES.iter().find_map(|fmt| {
                NaiveDate::parse_from_str(text, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
}

/// Render with a possibly user-supplied format without ever panicking
fn render(dt: &NaiveDateTime, strftime: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(strftime)).ok()?;
    Some(out)
}

pub fn date_parse(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let text = raw.trim();
    if text.is_empty() {
        return value.clone();
    }

    let parsed = match options.input_format.as_deref() {
        Some(fmt) => parse_with(text, &to_strftime(fmt)),
        None => parse_free_form(text),
    };

    let output = to_strftime(options.output_format.as_deref().unwrap_or(DEFAULT_OUTPUT_FORMAT));
    parsed
        .and_then(|dt| render(&dt, &output))
        .map(Value::String)
        .unwrap_or_else(|| value.clone())
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M%z",
    "%Y-%m-%dT%H:%M%z",
];

fn parse_offset_aware(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_in_zone(text: &str, zone: &str) -> Option<DateTime<Utc>> {
    let tz: Tz = zone.parse().ok()?;
    let naive = FREE_FORM_DATETIMES
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Offset-aware timestamp -> `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Timestamps without an offset are only converted when `sourceTimezone` names
/// an IANA zone; otherwise they pass through.
pub fn timezone_to_utc(value: &Value, options: &TransformOptions, _row: &Row) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let text = raw.trim();

    parse_offset_aware(text)
        .or_else(|| {
            options
                .source_timezone
                .as_deref()
                .and_then(|zone| parse_in_zone(text, zone))
        })
        .map(|utc| Value::String(utc.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .unwrap_or_else(|| value.clone())
}
