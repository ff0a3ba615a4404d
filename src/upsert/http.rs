//! GraphQL board client over reqwest

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use super::client::{BoardClient, ColumnValues, ExistingItem, ItemId};
use crate::config::BoardConfig;
use crate::errors::{BoardError, BoardResult, EngineError, EngineResult};
use crate::models::{value_text, Value};

/// Largest page the items endpoint hands out
const MAX_PAGE_SIZE: usize = 500;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const FIRST_PAGE_QUERY: &str = "query ($boardId: [ID!], $limit: Int!, $columnIds: [String!]) { \
    boards(ids: $boardId) { items_page(limit: $limit) { cursor items { id column_values(ids: $columnIds) { id text } } } } }";

const NEXT_PAGE_QUERY: &str = "query ($cursor: String!, $limit: Int!, $columnIds: [String!]) { \
    next_items_page(cursor: $cursor, limit: $limit) { cursor items { id column_values(ids: $columnIds) { id text } } } }";

const CREATE_ITEM_MUTATION: &str = "mutation ($boardId: ID!, $itemName: String!, $columnValues: JSON!) { \
    create_item(board_id: $boardId, item_name: $itemName, column_values: $columnValues) { id } }";

const UPDATE_ITEM_MUTATION: &str = "mutation ($boardId: ID!, $itemId: ID!, $columnValues: JSON!) { \
    change_multiple_column_values(board_id: $boardId, item_id: $itemId, column_values: $columnValues) { id } }";

/// Board client speaking the monday.com-style GraphQL API
#[derive(Debug, Clone)]
pub struct HttpBoardClient {
    client: Client,
    api_url: Url,
    token: String,
    api_version: Option<String>,
}

impl HttpBoardClient {
    pub fn new(token: impl Into<String>, config: &BoardConfig) -> EngineResult<Self> {
        let api_url = Url::parse(&config.api_url).map_err(|e| {
            EngineError::configuration(format!("Invalid board api_url '{}': {}", config.api_url, e))
        })?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(BoardError::from)?;

        Ok(Self {
            client,
            api_url,
            token: token.into(),
            api_version: config.api_version.clone(),
        })
    }

    /// POST one GraphQL document and return its `data` object
    async fn graphql(&self, query: &str, variables: Value) -> BoardResult<Value> {
        let mut request = self
            .client
            .post(self.api_url.clone())
            .header(AUTHORIZATION, &self.token)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(version) = &self.api_version {
            request = request.header("API-Version", version);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(BoardError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BoardError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BoardError::decode(format!("response is not JSON: {e}")))?;
        trace!("Board response: {}", body);

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .map(|e| value_text(e.get("message")))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(BoardError::api(message));
            }
        }
        if let Some(message) = body.get("error_message").and_then(Value::as_str) {
            return Err(BoardError::api(message));
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| BoardError::decode("response has no data"))
    }
}

/// Ids come back as strings, but tolerate numbers
fn id_of(value: Option<&Value>) -> BoardResult<ItemId> {
    match value {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(BoardError::decode("missing item id")),
    }
}

fn parse_page(page: &Value) -> BoardResult<(Vec<ExistingItem>, Option<String>)> {
    let items = page
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BoardError::decode("items page without items"))?;

    let parsed = items
        .iter()
        .map(|item| {
            let key_text = item
                .get("column_values")
                .and_then(Value::as_array)
                .and_then(|columns| columns.first())
                .map(|column| value_text(column.get("text")))
                .unwrap_or_default();
            Ok(ExistingItem {
                id: id_of(item.get("id"))?,
                key_text,
            })
        })
        .collect::<BoardResult<Vec<_>>>()?;

    let cursor = page
        .get("cursor")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((parsed, cursor))
}

fn encode_columns(column_values: &ColumnValues) -> BoardResult<String> {
    serde_json::to_string(column_values).map_err(|e| BoardError::decode(e.to_string()))
}

#[async_trait]
impl BoardClient for HttpBoardClient {
    async fn fetch_items(
        &self,
        board_id: &str,
        key_column_id: &str,
        limit: usize,
    ) -> BoardResult<Vec<ExistingItem>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        while items.len() < limit {
            let page_size = (limit - items.len()).min(MAX_PAGE_SIZE);
            let page = match &cursor {
                None => {
                    let data = self
                        .graphql(
                            FIRST_PAGE_QUERY,
                            json!({ "boardId": [board_id], "limit": page_size, "columnIds": [key_column_id] }),
                        )
                        .await?;
                    data.pointer("/boards/0/items_page")
                        .cloned()
                        .ok_or_else(|| BoardError::decode(format!("board {board_id} not found")))?
                }
                Some(cursor) => {
                    let data = self
                        .graphql(
                            NEXT_PAGE_QUERY,
                            json!({ "cursor": cursor, "limit": page_size, "columnIds": [key_column_id] }),
                        )
                        .await?;
                    data.get("next_items_page")
                        .cloned()
                        .ok_or_else(|| BoardError::decode("missing next_items_page"))?
                }
            };

            let (page_items, next) = parse_page(&page)?;
            let exhausted = page_items.is_empty();
            items.extend(page_items);
            cursor = next;
            if exhausted || cursor.is_none() {
                break;
            }
        }

        items.truncate(limit);
        debug!("Fetched {} existing items from board {}", items.len(), board_id);
        Ok(items)
    }

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        column_values: &ColumnValues,
    ) -> BoardResult<ItemId> {
        let data = self
            .graphql(
                CREATE_ITEM_MUTATION,
                json!({
                    "boardId": board_id,
                    "itemName": item_name,
                    "columnValues": encode_columns(column_values)?,
                }),
            )
            .await?;
        id_of(data.pointer("/create_item/id"))
    }

    async fn update_item(
        &self,
        board_id: &str,
        item_id: &str,
        column_values: &ColumnValues,
    ) -> BoardResult<ItemId> {
        let data = self
            .graphql(
                UPDATE_ITEM_MUTATION,
                json!({
                    "boardId": board_id,
                    "itemId": item_id,
                    "columnValues": encode_columns(column_values)?,
                }),
            )
            .await?;
        id_of(data.pointer("/change_multiple_column_values/id"))
    }
}
