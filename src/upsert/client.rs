//! The write side of an external column-oriented board

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::errors::BoardResult;
use crate::models::Value;

/// External record id
pub type ItemId = String;

/// external column id -> value
pub type ColumnValues = IndexMap<String, Value>;

/// A record already on the board, as seen through its key column
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingItem {
    pub id: ItemId,
    /// Raw text of the key column
    pub key_text: String,
}

#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Up to `limit` records of `board_id` with the text of `key_column_id`
    async fn fetch_items(
        &self,
        board_id: &str,
        key_column_id: &str,
        limit: usize,
    ) -> BoardResult<Vec<ExistingItem>>;

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        column_values: &ColumnValues,
    ) -> BoardResult<ItemId>;

    async fn update_item(
        &self,
        board_id: &str,
        item_id: &str,
        column_values: &ColumnValues,
    ) -> BoardResult<ItemId>;
}

#[async_trait]
impl<T> BoardClient for std::sync::Arc<T>
where
    T: BoardClient + ?Sized,
{
    async fn fetch_items(
        &self,
        board_id: &str,
        key_column_id: &str,
        limit: usize,
    ) -> BoardResult<Vec<ExistingItem>> {
        (**self).fetch_items(board_id, key_column_id, limit).await
    }

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        column_values: &ColumnValues,
    ) -> BoardResult<ItemId> {
        (**self).create_item(board_id, item_name, column_values).await
    }

    async fn update_item(
        &self,
        board_id: &str,
        item_id: &str,
        column_values: &ColumnValues,
    ) -> BoardResult<ItemId> {
        (**self).update_item(board_id, item_id, column_values).await
    }
}
