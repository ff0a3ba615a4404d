//! Column mapping: rename, keep or drop fields per a declared mapping

use tracing::debug;

use crate::models::{MapColumnsConfig, Row, Value};

/// Rename fields of every row according to `config.mapping`.
///
/// Unmapped fields are kept unless `dropUnknown` is set. Every declared target
/// exists on every output row; targets whose source was absent are `null`.
pub fn map_columns(rows: &[Row], config: &MapColumnsConfig) -> Vec<Row> {
    let drop_unknown = config.drop_unknown();
    debug!(
        "Mapping {} rows with {} column mappings (drop_unknown={})",
        rows.len(),
        config.mapping.len(),
        drop_unknown
    );

    rows.iter()
        .map(|row| map_row(row, config, drop_unknown))
        .collect()
}

fn map_row(row: &Row, config: &MapColumnsConfig, drop_unknown: bool) -> Row {
    let mut mapped = Row::with_capacity(row.len().max(config.mapping.len()));

    for (key, value) in row {
        match config.mapping.get(key) {
            Some(target) => {
                mapped.insert(target.clone(), value.clone());
            }
            None if drop_unknown => {}
            None => {
                mapped.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    for (source, target) in &config.mapping {
        if !row.contains_key(source) {
            mapped.entry(target.clone()).or_insert(Value::Null);
        }
    }

    mapped
}
