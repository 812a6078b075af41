//! Document store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport failure (DNS, TLS, timeout, connection reset)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-2xx status
    #[error("Store API error ({status} {kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A document was returned but does not have the expected shape
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Document not found: {collection}/{document_id}")]
    NotFound {
        collection: String,
        document_id: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
