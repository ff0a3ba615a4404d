//! Format transform library
//!
//! Every transform is a pure function of one field value (plus its options
//! and, for a couple of kinds, sibling fields of the same row). Transforms are
//! total: input they do not understand is returned unchanged rather than
//! reported as an error.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::models::{Row, TransformOptions, Value};

pub mod dates;
pub mod geo;
pub mod numeric;
pub mod phone;
pub mod text;

/// Signature shared by all single-field transforms
pub type FieldTransformFn = fn(&Value, &TransformOptions, &Row) -> Value;

/// A field name and the value a transform wants written to it
pub type FieldUpdate = (String, Value);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransformKind {
    TitleCase,
    EmailNormalize,
    PhoneE164,
    DateParse,
    IsoCountry,
    IsoState,
    CurrencyCode,
    NumberParse,
    TrimCollapseWhitespace,
    BooleanStandardize,
    TimezoneToUtc,
    Slugify,
    RoundNumeric,
    RoundToCurrency,
    NormalizePercentage,
    RemoveSpecialCharacters,
    SplitName,
    NormalizeAddress,
    SanitizeHtml,
}

impl TransformKind {
    /// Look up the single-field function for this kind.
    ///
    /// Returns `None` for transforms that write more than one field.
    pub fn field_fn(&self) -> Option<FieldTransformFn> {
        let f: FieldTransformFn = match self {
            TransformKind::TitleCase => text::title_case,
            TransformKind::EmailNormalize => text::email_normalize,
            TransformKind::PhoneE164 => phone::phone_e164,
            TransformKind::DateParse => dates::date_parse,
            TransformKind::IsoCountry => geo::iso_country,
            TransformKind::IsoState => geo::iso_state,
            TransformKind::CurrencyCode => numeric::currency_code,
            TransformKind::NumberParse => numeric::number_parse,
            TransformKind::TrimCollapseWhitespace => text::trim_collapse_whitespace,
            TransformKind::BooleanStandardize => numeric::boolean_standardize,
            TransformKind::TimezoneToUtc => dates::timezone_to_utc,
            TransformKind::Slugify => text::slugify,
            TransformKind::RoundNumeric => numeric::round_numeric,
            TransformKind::RoundToCurrency => numeric::round_to_currency,
            TransformKind::NormalizePercentage => numeric::normalize_percentage,
            TransformKind::RemoveSpecialCharacters => text::remove_special_characters,
            TransformKind::NormalizeAddress => text::normalize_address,
            TransformKind::SanitizeHtml => text::sanitize_html,
            TransformKind::SplitName => return None,
        };
        Some(f)
    }
}

/// Apply `kind` to `field` of `row`, returning the field writes it produces.
///
/// Rows missing `field` produce no writes. The row itself is never modified;
/// callers decide how to fold the updates into a new row.
pub fn apply_transform(
    kind: TransformKind,
    row: &Row,
    field: &str,
    options: &TransformOptions,
) -> Vec<FieldUpdate> {
    let Some(value) = row.get(field) else {
        return Vec::new();
    };

    match kind.field_fn() {
        Some(f) => vec![(field.to_string(), f(value, options, row))],
        None => text::split_name(field, value, options),
    }
}
