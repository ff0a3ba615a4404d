//! Format step: apply field transforms and record what changed

use tracing::debug;

use crate::models::{DiffEntry, FormatConfig, Row, TransformOptions, Value};
use crate::transforms::apply_transform;

/// Apply every configured transform, in order, to every row.
///
/// Each transform sees the row as left by the previous one. A diff entry is
/// produced for each field write that changes the value; writes that leave
/// the value equal produce nothing.
pub fn format_rows(rows: &[Row], config: &FormatConfig) -> (Vec<Row>, Vec<DiffEntry>) {
    let default_options = TransformOptions::default();
    let mut diff = Vec::new();
    let mut formatted = Vec::with_capacity(rows.len());

    for (row_index, row) in rows.iter().enumerate() {
        let mut current = row.clone();
        for transform in &config.transforms {
            let options = transform.options.as_ref().unwrap_or(&default_options);
            for (field, after) in apply_transform(transform.kind, &current, &transform.field, options)
            {
                let before = current.get(&field).cloned().unwrap_or(Value::Null);
                if let Some(entry) = DiffEntry::change(row_index, &field, before, after.clone()) {
                    diff.push(entry);
                    current.insert(field, after);
                }
            }
        }
        formatted.push(current);
    }

    debug!(
        "Formatted {} rows with {} transforms, {} changes",
        formatted.len(),
        config.transforms.len(),
        diff.len()
    );
    (formatted, diff)
}
