//! Document store client
//!
//! Typed wrapper around the hosted document database. All persistence,
//! query evaluation and access control live on the platform; this crate
//! only shapes requests and decodes responses.
//!
//! - [`AppwriteStore`]: REST client for the hosted platform
//! - [`MemoryStore`]: in-process twin evaluating the same predicates
//!
//! # Example
//!
//! ```no_run
//! use document_store::{AppwriteStore, CollectionRef, Credentials, DocumentStore, Query};
//!
//! # async fn run() -> Result<(), document_store::StoreError> {
//! let store = AppwriteStore::builder("https://cloud.appwrite.io/v1", "project")
//!     .credentials(Credentials::ApiKey("secret".to_string()))
//!     .build()?;
//!
//! let comments = CollectionRef::new("main", "comments");
//! let page = store
//!     .list_documents(&comments, &[Query::equal("post_id", "p1"), Query::order_desc("created_at")])
//!     .await?;
//! println!("{} comments", page.total);
//! # Ok(())
//! # }
//! ```

mod appwrite;
mod document;
mod error;
mod memory;
mod query;

pub use appwrite::{AppwriteStore, AppwriteStoreBuilder, Credentials};
pub use document::{CollectionRef, Document, DocumentId, DocumentList};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use query::{Query, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Remote document collection operations
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document and return it with its store-assigned attributes
    async fn create_document(
        &self,
        collection: &CollectionRef,
        document_id: DocumentId,
        data: Map<String, Value>,
    ) -> StoreResult<Document>;

    /// Fetch one document; `None` when it does not exist
    async fn get_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
    ) -> StoreResult<Option<Document>>;

    /// List documents matching `queries`
    async fn list_documents(
        &self,
        collection: &CollectionRef,
        queries: &[Query],
    ) -> StoreResult<DocumentList>;

    /// Patch attributes of an existing document
    async fn update_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
        data: Map<String, Value>,
    ) -> StoreResult<Document>;

    async fn delete_document(&self, collection: &CollectionRef, document_id: &str)
        -> StoreResult<()>;
}

/// Timestamp format used for stored date attributes.
///
/// Fixed millisecond precision keeps lexicographic and chronological order equal.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
