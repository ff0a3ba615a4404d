//! Writing normalized rows to an external board
//!
//! [`BatchUpserter`] owns the create-vs-update logic, throttling and
//! retries. [`BoardClient`] is the seam to the board itself; the
//! [`HttpBoardClient`] implementation talks GraphQL over HTTP. The handlers
//! adapt all of this to the pipeline's write-back step.

pub mod batch;
pub mod client;
pub mod handlers;
pub mod http;
pub mod key_index;
pub mod retry;

pub use batch::{BatchUpsertResult, BatchUpserter, RowOutcome, UpsertAction, FALLBACK_ITEM_NAME};
pub use client::{BoardClient, ColumnValues, ExistingItem, ItemId};
pub use handlers::{BoardWriteBack, ExportWriteBack, StrategyRouter};
pub use http::HttpBoardClient;
pub use key_index::{normalize_key, KeyIndex};
pub use retry::{Attempted, RetryPolicy};
