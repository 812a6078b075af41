//! Document and collection types shared by every store implementation

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{StoreError, StoreResult};

/// Database + collection pair addressing one remote collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    pub database_id: String,
    pub collection_id: String,
}

impl CollectionRef {
    pub fn new(database_id: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            collection_id: collection_id.into(),
        }
    }
}

impl std::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.database_id, self.collection_id)
    }
}

/// Id requested for a new document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentId {
    /// Let the store generate the id
    Unique,
    Custom(String),
}

impl DocumentId {
    /// Wire value understood by the platform as "generate one for me"
    pub const UNIQUE_MARKER: &'static str = "unique()";

    pub fn unique() -> Self {
        DocumentId::Unique
    }

    pub fn custom(id: impl Into<String>) -> Self {
        DocumentId::Custom(id.into())
    }

    pub fn as_wire(&self) -> &str {
        match self {
            DocumentId::Unique => Self::UNIQUE_MARKER,
            DocumentId::Custom(id) => id,
        }
    }
}

/// One stored record: system attributes plus free-form data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$collectionId", default)]
    pub collection_id: String,
    #[serde(rename = "$databaseId", default)]
    pub database_id: String,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "$updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name).filter(|v| !v.is_null())
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Required string attribute
    pub fn require_str(&self, name: &str) -> StoreResult<&str> {
        self.str_field(name).ok_or_else(|| {
            StoreError::InvalidDocument(format!(
                "document {} is missing string attribute '{}'",
                self.id, name
            ))
        })
    }

    /// Decode one attribute into a typed value
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Option<T>> {
        match self.field(name) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Attribute lookup that also resolves system attributes (`$id`, `$createdAt`, ...)
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "$id" => Some(Value::String(self.id.clone())),
            "$createdAt" => Some(Value::String(crate::format_timestamp(self.created_at))),
            "$updatedAt" => Some(Value::String(crate::format_timestamp(self.updated_at))),
            _ => self.data.get(name).cloned(),
        }
    }
}

/// Result page of a list call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentList {
    /// Total matching documents, ignoring limit/offset
    pub total: u64,
    pub documents: Vec<Document>,
}
