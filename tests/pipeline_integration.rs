//! End-to-end recipe runs through the public engine API

use async_trait::async_trait;
use recipe_engine::models::{ErrorCode, Row, Value, WriteBackConfig, DEDUPE_DIFF_FIELD};
use recipe_engine::upsert::{ExportWriteBack, StrategyRouter};
use recipe_engine::{EngineError, EngineResult, Recipe, RecipeEngine, RunOptions, WriteBackHandler};
use serde_json::json;
use std::sync::Mutex;

/// Handler that fails the run if it is ever called
struct MustNotWrite;

#[async_trait]
impl WriteBackHandler for MustNotWrite {
    async fn write_back(&self, _rows: &[Row], _config: &WriteBackConfig) -> EngineResult<()> {
        Err(EngineError::write_back("preview must not write"))
    }
}

#[derive(Default)]
struct Captured {
    rows: Mutex<Vec<Vec<Row>>>,
}

#[async_trait]
impl WriteBackHandler for Captured {
    async fn write_back(&self, rows: &[Row], _config: &WriteBackConfig) -> EngineResult<()> {
        self.rows.lock().unwrap().push(rows.to_vec());
        Ok(())
    }
}

fn rows(value: Value) -> Vec<Row> {
    serde_json::from_value(value).unwrap()
}

fn contacts_recipe() -> Recipe {
    Recipe::from_value(json!({
        "id": "contacts",
        "name": "Contact cleanup",
        "version": 3,
        "steps": [
            {"type": "map_columns", "config": {"mapping": {
                "E-mail": "email", "Full Name": "name", "Phone": "phone"
            }}},
            {"type": "format", "config": {"transforms": [
                {"field": "email", "kind": "email_normalize"},
                {"field": "name", "kind": "title_case"},
                {"field": "phone", "kind": "phone_e164"}
            ]}},
            {"type": "validate", "config": {"rules": [
                {"type": "required", "field": "email"}
            ]}},
            {"type": "dedupe", "config": {"keys": ["email"]}},
            {"type": "write_back", "config": {
                "strategy": "external_upsert",
                "boardId": "123",
                "keyColumn": "email",
                "columnMapping": {"email": "email_col", "name": "text_col"}
            }}
        ]
    }))
    .unwrap()
}

fn contact_rows() -> Vec<Row> {
    rows(json!([
        {"E-mail": "Jane.Doe+news@Example.com", "Full Name": "jane doe", "Phone": "(415) 555-1234"},
        {"E-mail": "janedoe@example.com", "Full Name": "J. DOE", "Phone": "415 555 1234"},
        {"E-mail": "", "Full Name": "no email", "Phone": null}
    ]))
}

#[tokio::test]
async fn test_preview_normalizes_dedupes_and_never_writes() {
    let engine = RecipeEngine::new();
    let result = engine
        .preview(&contacts_recipe(), &contact_rows(), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0]["email"], json!("janedoe@example.com"));
    assert_eq!(result.rows[0]["name"], json!("Jane Doe"));
    assert_eq!(result.rows[0]["phone"], json!("+14155551234"));

    let codes: Vec<ErrorCode> = result.errors.iter().map(|e| e.code).collect();
    assert_eq!(codes, vec![ErrorCode::Required, ErrorCode::DedupeExact]);
    assert_eq!(result.errors[0].row_index, 2);
    assert_eq!(result.errors[1].row_index, 1);

    assert!(result
        .diff
        .iter()
        .any(|d| d.row_index == 0 && d.field == "email"));
    assert!(result.diff.iter().any(|d| d.field == DEDUPE_DIFF_FIELD));

    // handing a failing handler to execute shows preview never needed one
    let err = engine
        .execute(&contacts_recipe(), &contact_rows(), RunOptions::default(), &MustNotWrite)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WriteBack { .. }));
}

#[tokio::test]
async fn test_preview_is_repeatable() {
    let engine = RecipeEngine::new();
    let input = contact_rows();
    let first = engine
        .preview(&contacts_recipe(), &input, RunOptions::default())
        .await
        .unwrap();
    let second = engine
        .preview(&contacts_recipe(), &input, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(input, contact_rows());
}

#[tokio::test]
async fn test_execute_hands_surviving_rows_to_handler() {
    let engine = RecipeEngine::new();
    let handler = Captured::default();
    let result = engine
        .execute(&contacts_recipe(), &contact_rows(), RunOptions::default(), &handler)
        .await
        .unwrap();

    assert_eq!(result.rows_processed, 3);
    assert_eq!(result.rows_written, 2);
    assert_eq!(result.errors.len(), 2);

    let written = handler.rows.lock().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].len(), 2);
}

#[tokio::test]
async fn test_fuzzy_dedupe_is_gated_by_caller_capability() {
    let recipe = Recipe::from_value(json!({
        "id": "companies",
        "name": "Companies",
        "version": 1,
        "steps": [
            {"type": "dedupe", "config": {
                "keys": ["company"],
                "fuzzy": {"enabled": true, "threshold": 0.9}
            }}
        ]
    }))
    .unwrap();
    let input = rows(json!([
        {"company": "Acme Corporation"},
        {"company": "Acme Corporatoin"},
        {"company": "Globex"}
    ]));
    let engine = RecipeEngine::new();

    let blocked = engine
        .preview(&recipe, &input, RunOptions::with_fuzzy(false))
        .await
        .unwrap();
    assert_eq!(blocked.rows.len(), 3);
    assert_eq!(blocked.errors.len(), 1);
    assert!(blocked.errors[0].is_recipe_level());
    assert_eq!(blocked.errors[0].code, ErrorCode::DedupeFuzzyBlocked);

    let allowed = engine
        .preview(&recipe, &input, RunOptions::with_fuzzy(true))
        .await
        .unwrap();
    assert_eq!(allowed.rows.len(), 2);
    assert_eq!(allowed.errors[0].code, ErrorCode::DedupeFuzzy);
    assert_eq!(allowed.errors[0].row_index, 1);
}

#[tokio::test]
async fn test_mapping_missing_source_yields_null() {
    let recipe = Recipe::from_value(json!({
        "id": "m",
        "name": "Mapping",
        "version": 1,
        "steps": [
            {"type": "map_columns", "config": {"mapping": {"Zip": "postal_code"}}}
        ]
    }))
    .unwrap();
    let result = RecipeEngine::new()
        .preview(&recipe, &rows(json!([{"City": "Oslo"}])), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(result.rows[0]["postal_code"], Value::Null);
    assert_eq!(result.rows[0]["City"], json!("Oslo"));
}

#[tokio::test]
async fn test_unknown_step_type_is_rejected() {
    let err = Recipe::from_json(
        r#"{"id":"x","name":"x","version":1,"steps":[{"type":"enrich","config":{}}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedStep { step_type } if step_type == "enrich"));
}

#[tokio::test]
async fn test_export_strategy_through_router() {
    let recipe = Recipe::from_value(json!({
        "id": "e",
        "name": "Export",
        "version": 1,
        "steps": [
            {"type": "format", "config": {"transforms": [
                {"field": "country", "kind": "iso_country"}
            ]}},
            {"type": "write_back", "config": {"strategy": "export"}}
        ]
    }))
    .unwrap();
    let export = ExportWriteBack::new();
    let router = StrategyRouter::new().export(&export);

    RecipeEngine::new()
        .execute(
            &recipe,
            &rows(json!([{"name": "Ann", "country": "United States"}])),
            RunOptions::default(),
            &router,
        )
        .await
        .unwrap();

    assert_eq!(export.output().as_deref(), Some("name,country\nAnn,US\n"));
}
