//! Country and state/province normalization

use crate::models::{value_text, Row, TransformOptions, Value};
use crate::transforms::text::collapse_whitespace;

const DEFAULT_STATE_COUNTRY: &str = "US";

/// Lowercased country name or code -> ISO 3166 alpha-2
const COUNTRY_SYNONYMS: &[(&str, &str)] = &[
    ("us", "US"),
    ("usa", "US"),
    ("united states", "US"),
    ("united states of america", "US"),
    ("america", "US"),
    ("ca", "CA"),
    ("can", "CA"),
    ("canada", "CA"),
    ("gb", "GB"),
    ("uk", "GB"),
    ("gbr", "GB"),
    ("united kingdom", "GB"),
    ("great britain", "GB"),
    ("britain", "GB"),
    ("england", "GB"),
    ("scotland", "GB"),
    ("wales", "GB"),
    ("northern ireland", "GB"),
    ("ie", "IE"),
    ("ireland", "IE"),
    ("fr", "FR"),
    ("france", "FR"),
    ("de", "DE"),
    ("deu", "DE"),
    ("germany", "DE"),
    ("deutschland", "DE"),
    ("es", "ES"),
    ("spain", "ES"),
    ("espana", "ES"),
    ("españa", "ES"),
    ("it", "IT"),
    ("italy", "IT"),
    ("italia", "IT"),
    ("pt", "PT"),
    ("portugal", "PT"),
    ("nl", "NL"),
    ("netherlands", "NL"),
    ("the netherlands", "NL"),
    ("holland", "NL"),
    ("be", "BE"),
    ("belgium", "BE"),
    ("ch", "CH"),
    ("switzerland", "CH"),
    ("at", "AT"),
    ("austria", "AT"),
    ("se", "SE"),
    ("sweden", "SE"),
    ("no", "NO"),
    ("norway", "NO"),
    ("dk", "DK"),
    ("denmark", "DK"),
    ("fi", "FI"),
    ("finland", "FI"),
    ("pl", "PL"),
    ("poland", "PL"),
    ("cz", "CZ"),
    ("czech republic", "CZ"),
    ("czechia", "CZ"),
    ("gr", "GR"),
    ("greece", "GR"),
    ("tr", "TR"),
    ("turkey", "TR"),
    ("turkiye", "TR"),
    ("ru", "RU"),
    ("russia", "RU"),
    ("russian federation", "RU"),
    ("ua", "UA"),
    ("ukraine", "UA"),
    ("il", "IL"),
    ("israel", "IL"),
    ("ae", "AE"),
    ("uae", "AE"),
    ("united arab emirates", "AE"),
    ("sa", "SA"),
    ("saudi arabia", "SA"),
    ("in", "IN"),
    ("india", "IN"),
    ("pk", "PK"),
    ("pakistan", "PK"),
    ("cn", "CN"),
    ("china", "CN"),
    ("prc", "CN"),
    ("hk", "HK"),
    ("hong kong", "HK"),
    ("tw", "TW"),
    ("taiwan", "TW"),
    ("jp", "JP"),
    ("japan", "JP"),
    ("kr", "KR"),
    ("korea", "KR"),
    ("south korea", "KR"),
    ("republic of korea", "KR"),
    ("sg", "SG"),
    ("singapore", "SG"),
    ("my", "MY"),
    ("malaysia", "MY"),
    ("th", "TH"),
    ("thailand", "TH"),
    ("vn", "VN"),
    ("vietnam", "VN"),
    ("viet nam", "VN"),
    ("ph", "PH"),
    ("philippines", "PH"),
    ("id", "ID"),
    ("indonesia", "ID"),
    ("au", "AU"),
    ("aus", "AU"),
    ("australia", "AU"),
    ("nz", "NZ"),
    ("new zealand", "NZ"),
    ("za", "ZA"),
    ("south africa", "ZA"),
    ("ng", "NG"),
    ("nigeria", "NG"),
    ("ke", "KE"),
    ("kenya", "KE"),
    ("eg", "EG"),
    ("egypt", "EG"),
    ("mx", "MX"),
    ("mexico", "MX"),
    ("méxico", "MX"),
    ("br", "BR"),
    ("brazil", "BR"),
    ("brasil", "BR"),
    ("ar", "AR"),
    ("argentina", "AR"),
    ("cl", "CL"),
    ("chile", "CL"),
    ("co", "CO"),
    ("colombia", "CO"),
    ("pe", "PE"),
    ("peru", "PE"),
];

const US_STATES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("district of columbia", "DC"),
    ("washington dc", "DC"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
    ("puerto rico", "PR"),
    ("guam", "GU"),
    ("us virgin islands", "VI"),
];

const CA_PROVINCES: &[(&str, &str)] = &[
    ("alberta", "AB"),
    ("british columbia", "BC"),
    ("manitoba", "MB"),
    ("new brunswick", "NB"),
    ("newfoundland and labrador", "NL"),
    ("newfoundland", "NL"),
    ("nova scotia", "NS"),
    ("ontario", "ON"),
    ("prince edward island", "PE"),
    ("quebec", "QC"),
    ("québec", "QC"),
    ("saskatchewan", "SK"),
    ("northwest territories", "NT"),
    ("nunavut", "NU"),
    ("yukon", "YT"),
];

const AU_STATES: &[(&str, &str)] = &[
    ("new south wales", "NSW"),
    ("victoria", "VIC"),
    ("queensland", "QLD"),
    ("western australia", "WA"),
    ("south australia", "SA"),
    ("tasmania", "TAS"),
    ("australian capital territory", "ACT"),
    ("northern territory", "NT"),
];

/// Lowercase, drop dots, collapse whitespace: "U.S.A." -> "usa"
fn lookup_key(text: &str) -> String {
    collapse_whitespace(&text.replace('.', " ").to_lowercase())
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| *code)
}

/// Resolve a country name or code to ISO alpha-2, if known
pub fn country_code_for(text: &str) -> Option<String> {
    let key = lookup_key(text);
    if let Some(code) = lookup(COUNTRY_SYNONYMS, &key) {
        return Some(code.to_string());
    }
    // "u s a" after dot removal
    lookup(COUNTRY_SYNONYMS, &key.replace(' ', "")).map(str::to_string)
}

pub fn iso_country(value: &Value, _options: &TransformOptions, _row: &Row) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return value.clone();
    }
    Value::String(country_code_for(trimmed).unwrap_or_else(|| trimmed.to_uppercase()))
}

fn state_table(country: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match country {
        "US" => Some(US_STATES),
        "CA" => Some(CA_PROVINCES),
        "AU" => Some(AU_STATES),
        _ => None,
    }
}

/// Country for state lookup: `country` option, then `countryField` on the row, then US
fn resolve_country(options: &TransformOptions, row: &Row) -> String {
    let explicit = options.country.clone().or_else(|| {
        options
            .country_field
            .as_ref()
            .map(|field| value_text(row.get(field)))
            .filter(|text| !text.trim().is_empty())
    });
    explicit
        .map(|text| country_code_for(&text).unwrap_or_else(|| text.trim().to_uppercase()))
        .unwrap_or_else(|| DEFAULT_STATE_COUNTRY.to_string())
}

pub fn iso_state(value: &Value, options: &TransformOptions, row: &Row) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return value.clone();
    }

    let country = resolve_country(options, row);
    let code = state_table(&country).and_then(|table| lookup(table, &lookup_key(trimmed)));
    Value::String(code.map(str::to_string).unwrap_or_else(|| trimmed.to_uppercase()))
}
