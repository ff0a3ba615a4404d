//! Per-invocation map of normalized key -> external id

use std::collections::HashMap;

use super::client::{ExistingItem, ItemId};

/// Trimmed, lowercased key text; `None` for blank keys
pub fn normalize_key(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Uniqueness oracle for update-vs-create decisions during one upsert run.
///
/// Built from a single snapshot of the board and extended as records are
/// created, so later rows with the same key update instead of duplicating.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    ids: HashMap<String, ItemId>,
}

impl KeyIndex {
    /// First record wins when the board already holds duplicate keys
    pub fn from_items(items: impl IntoIterator<Item = ExistingItem>) -> Self {
        let mut ids = HashMap::new();
        for item in items {
            if let Some(key) = normalize_key(&item.key_text) {
                ids.entry(key).or_insert(item.id);
            }
        }
        Self { ids }
    }

    pub fn get(&self, key: &str) -> Option<&ItemId> {
        self.ids.get(key)
    }

    pub fn insert(&mut self, key: String, id: ItemId) {
        self.ids.insert(key, id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, key: &str) -> ExistingItem {
        ExistingItem {
            id: id.to_string(),
            key_text: key.to_string(),
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  A@X.com "), Some("a@x.com".to_string()));
        assert_eq!(normalize_key("   "), None);
    }

    #[test]
    fn test_from_items_skips_blank_and_keeps_first() {
        let index = KeyIndex::from_items(vec![
            item("1", "A@x.com"),
            item("2", "a@x.com "),
            item("3", ""),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a@x.com").map(String::as_str), Some("1"));
    }
}
