//! Recipe definition: an ordered, straight-line list of typed steps

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

use crate::errors::{EngineError, EngineResult};
use crate::transforms::TransformKind;

/// A versioned recipe as stored and exchanged as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub steps: Vec<RecipeStep>,
}

/// Step discriminator as it appears in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum StepKind {
    MapColumns,
    Format,
    Validate,
    Dedupe,
    WriteBack,
}

/// One pipeline step, serialized as `{"type": "...", "config": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum RecipeStep {
    MapColumns(MapColumnsConfig),
    Format(FormatConfig),
    Validate(ValidateConfig),
    Dedupe(DedupeConfig),
    WriteBack(WriteBackConfig),
}

impl RecipeStep {
    pub fn kind(&self) -> StepKind {
        match self {
            RecipeStep::MapColumns(_) => StepKind::MapColumns,
            RecipeStep::Format(_) => StepKind::Format,
            RecipeStep::Validate(_) => StepKind::Validate,
            RecipeStep::Dedupe(_) => StepKind::Dedupe,
            RecipeStep::WriteBack(_) => StepKind::WriteBack,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapColumnsConfig {
    /// source field -> target field
    pub mapping: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_unknown: Option<bool>,
}

impl MapColumnsConfig {
    pub fn drop_unknown(&self) -> bool {
        self.drop_unknown.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatConfig {
    pub transforms: Vec<FieldTransform>,
}

/// A single transform applied to one field of every row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTransform {
    pub field: String,
    pub kind: TransformKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<TransformOptions>,
}

/// Per-transform knobs. Each transform reads only the options it understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    /// ISO alpha-2 hint for phone parsing (default "US")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_country: Option<String>,
    /// Explicit input pattern for date_parse (`yyyy`, `MM`, `dd` tokens or strftime)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,
    /// Output pattern for date_parse (default `yyyy-MM-dd`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// IANA zone applied by timezone_to_utc to timestamps without an offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_timezone: Option<String>,
    /// Locale tag for number parsing, e.g. "de-DE"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Decimal places for round_numeric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    /// Separator for slugify (default "-")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Fixed country for iso_state lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Sibling field holding the country for iso_state lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_field: Option<String>,
    /// Target field for split_name's first token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name_field: Option<String>,
    /// Target field for split_name's remaining tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name_field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateConfig {
    pub rules: Vec<ValidationRule>,
}

/// Declarative validation rules, evaluated in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    Required {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Regex {
        field: String,
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    InSet {
        field: String,
        values: Vec<String>,
        #[serde(
            default,
            rename = "caseInsensitive",
            skip_serializing_if = "Option::is_none"
        )]
        case_insensitive: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Unique {
        fields: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeConfig {
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<FuzzyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzyConfig {
    pub enabled: bool,
    /// Minimum similarity in [0, 1] for two rows to count as duplicates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<SimilarityAlgorithm>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SimilarityAlgorithm {
    #[default]
    JaroWinkler,
    Levenshtein,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WriteBackStrategy {
    ExternalUpsert,
    Export,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBackConfig {
    pub strategy: WriteBackStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    /// Logical field used for update-vs-create identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,
    /// External column id the key column resolves to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column_id: Option<String>,
    /// logical field -> external column id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_mapping: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name_field: Option<String>,
}

impl WriteBackConfig {
    /// Names of required fields that are absent for this strategy
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.strategy == WriteBackStrategy::ExternalUpsert {
            if self.board_id.as_deref().map_or(true, |b| b.trim().is_empty()) {
                missing.push("boardId");
            }
            if self.column_mapping.is_none() {
                missing.push("columnMapping");
            }
        }
        missing
    }

    /// Fail with a configuration error when required fields are missing
    pub fn ensure_ready(&self) -> EngineResult<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::configuration(format!(
                "write_back strategy '{}' requires {}",
                self.strategy,
                missing.join(" and ")
            )))
        }
    }
}

impl Recipe {
    /// Parse a recipe from JSON text
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a recipe from an already-decoded JSON value.
    ///
    /// Unknown step types and write-back strategies are reported as
    /// [`EngineError::UnsupportedStep`] / [`EngineError::UnsupportedStrategy`]
    /// instead of a generic decode error. Unrecognized fields on the recipe or
    /// a step config are accepted and not carried into the parsed recipe, so
    /// [`Recipe::to_json`] omits them.
    pub fn from_value(value: serde_json::Value) -> EngineResult<Self> {
        if let Some(steps) = value.get("steps").and_then(|s| s.as_array()) {
            for step in steps {
                let step_type = step.get("type").and_then(|t| t.as_str()).unwrap_or("");
                match StepKind::from_str(step_type) {
                    Err(_) => return Err(EngineError::unsupported_step(step_type)),
                    Ok(StepKind::WriteBack) => {
                        let strategy = step.pointer("/config/strategy").and_then(|s| s.as_str());
                        if let Some(strategy) = strategy {
                            if WriteBackStrategy::from_str(strategy).is_err() {
                                return Err(EngineError::UnsupportedStrategy {
                                    strategy: strategy.to_string(),
                                });
                            }
                        }
                    }
                    Ok(_) => {}
                }
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Every write-back step whose configuration is incomplete, with its step index
    pub fn incomplete_write_backs(&self) -> Vec<(usize, Vec<&'static str>)> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| match step {
                RecipeStep::WriteBack(cfg) => {
                    let missing = cfg.missing_fields();
                    (!missing.is_empty()).then_some((i, missing))
                }
                _ => None,
            })
            .collect()
    }

    /// Preflight for callers that want to reject a recipe before running it
    pub fn check_write_back_ready(&self) -> EngineResult<()> {
        match self.incomplete_write_backs().first() {
            None => Ok(()),
            Some((index, missing)) => Err(EngineError::configuration(format!(
                "write_back step {} requires {}",
                index,
                missing.join(" and ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_recipe_json() -> serde_json::Value {
        json!({
            "id": "r-1",
            "name": "Contacts cleanup",
            "version": 3,
            "steps": [
                {"type": "map_columns", "config": {"mapping": {"E-mail": "email"}, "dropUnknown": true}},
                {"type": "format", "config": {"transforms": [
                    {"field": "email", "kind": "email_normalize"},
                    {"field": "phone", "kind": "phone_e164", "options": {"defaultCountry": "US"}}
                ]}},
                {"type": "validate", "config": {"rules": [
                    {"type": "required", "field": "email"},
                    {"type": "in_set", "field": "tier", "values": ["gold", "silver"], "caseInsensitive": true},
                    {"type": "unique", "fields": ["email"]}
                ]}},
                {"type": "dedupe", "config": {"keys": ["email"], "fuzzy": {"enabled": true, "threshold": 0.92}}},
                {"type": "write_back", "config": {
                    "strategy": "external_upsert",
                    "boardId": "123",
                    "keyColumn": "email",
                    "columnMapping": {"email": "email_col"}
                }}
            ]
        })
    }

    #[test]
    fn test_recipe_round_trip_is_lossless() {
        let original = sample_recipe_json();
        let recipe = Recipe::from_value(original.clone()).unwrap();
        assert_eq!(recipe.steps.len(), 5);

        let reserialized: serde_json::Value =
            serde_json::from_str(&recipe.to_json().unwrap()).unwrap();
        assert_eq!(reserialized, original);
    }

    #[test]
    fn test_round_trip_keeps_mapping_declaration_order() {
        let json = r#"{"id":"r-2","name":"Order","version":1,"steps":[{"type":"map_columns","config":{"mapping":{"Zeta":"zeta","Alpha":"alpha"}}},{"type":"write_back","config":{"strategy":"external_upsert","boardId":"9","columnMapping":{"zeta":"z_col","alpha":"a_col"}}}]}"#;
        let recipe = Recipe::from_json(json).unwrap();
        assert_eq!(recipe.to_json().unwrap(), json);
    }

    #[test]
    fn test_unrecognized_fields_are_dropped() {
        let mut value = sample_recipe_json();
        value["owner"] = json!("ops");
        value["steps"][0]["config"]["comment"] = json!("legacy import");

        let recipe = Recipe::from_value(value).unwrap();
        let reserialized: serde_json::Value =
            serde_json::from_str(&recipe.to_json().unwrap()).unwrap();
        assert_eq!(reserialized, sample_recipe_json());
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let mut value = sample_recipe_json();
        value["steps"][1]["type"] = json!("enrich");

        match Recipe::from_value(value) {
            Err(EngineError::UnsupportedStep { step_type }) => assert_eq!(step_type, "enrich"),
            other => panic!("expected UnsupportedStep, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let mut value = sample_recipe_json();
        value["steps"][4]["config"]["strategy"] = json!("carrier_pigeon");
        assert!(matches!(
            Recipe::from_value(value),
            Err(EngineError::UnsupportedStrategy { strategy }) if strategy == "carrier_pigeon"
        ));
    }

    #[test]
    fn test_write_back_missing_fields() {
        let cfg = WriteBackConfig {
            strategy: WriteBackStrategy::ExternalUpsert,
            board_id: None,
            key_column: None,
            key_column_id: None,
            column_mapping: None,
            item_name_field: None,
        };
        assert_eq!(cfg.missing_fields(), vec!["boardId", "columnMapping"]);
        assert!(cfg.ensure_ready().is_err());

        let export = WriteBackConfig {
            strategy: WriteBackStrategy::Export,
            ..cfg
        };
        assert!(export.ensure_ready().is_ok());
    }

    #[test]
    fn test_check_write_back_ready_reports_step() {
        let mut value = sample_recipe_json();
        value["steps"][4]["config"]
            .as_object_mut()
            .unwrap()
            .remove("boardId");
        let recipe = Recipe::from_value(value).unwrap();

        assert_eq!(recipe.incomplete_write_backs(), vec![(4, vec!["boardId"])]);
        let err = recipe.check_write_back_ready().unwrap_err();
        assert!(err.to_string().contains("boardId"));

        assert!(Recipe::from_value(sample_recipe_json())
            .unwrap()
            .check_write_back_ready()
            .is_ok());
    }

    #[test]
    fn test_step_kind_names() {
        assert_eq!(StepKind::WriteBack.to_string(), "write_back");
        assert_eq!(StepKind::from_str("map_columns").unwrap(), StepKind::MapColumns);
    }
}
