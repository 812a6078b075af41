//! In-process document store
//!
//! Evaluates the same predicates as the hosted platform. Equal sort keys keep
//! insertion order.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::query::page_window;
use crate::{
    CollectionRef, Document, DocumentId, DocumentList, DocumentStore, Query, StoreError,
    StoreResult,
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<DashMap<CollectionRef, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored in `collection`
    pub fn len(&self, collection: &CollectionRef) -> usize {
        self.collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &CollectionRef) -> bool {
        self.len(collection) == 0
    }

    fn generate_id() -> String {
        // 20 hex chars, same shape as platform-generated ids
        uuid::Uuid::new_v4().simple().to_string()[..20].to_string()
    }
}

fn matches(doc: &Document, query: &Query) -> bool {
    match query {
        Query::Equal { attribute, values } => doc
            .attribute(attribute)
            .map(|v| values.contains(&v))
            .unwrap_or(false),
        Query::NotEqual { attribute, values } => doc
            .attribute(attribute)
            .map(|v| !values.contains(&v))
            .unwrap_or(true),
        _ => true,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn sort_documents(docs: &mut [Document], queries: &[Query]) {
    let orders: Vec<(&str, bool)> = queries
        .iter()
        .filter_map(|q| match q {
            Query::OrderAsc(attr) => Some((attr.as_str(), false)),
            Query::OrderDesc(attr) => Some((attr.as_str(), true)),
            _ => None,
        })
        .collect();

    if orders.is_empty() {
        return;
    }

    // sort_by is stable: ties keep insertion order
    docs.sort_by(|a, b| {
        for (attr, descending) in &orders {
            let ordering = compare_values(a.attribute(attr).as_ref(), b.attribute(attr).as_ref());
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        collection: &CollectionRef,
        document_id: DocumentId,
        data: Map<String, Value>,
    ) -> StoreResult<Document> {
        let id = match document_id {
            DocumentId::Unique => Self::generate_id(),
            DocumentId::Custom(id) => id,
        };

        let mut docs = self.collections.entry(collection.clone()).or_default();
        if docs.iter().any(|d| d.id == id) {
            return Err(StoreError::Api {
                status: 409,
                kind: "document_already_exists".to_string(),
                message: format!("Document with the requested ID '{}' already exists", id),
            });
        }

        let now = Utc::now();
        let document = Document {
            id,
            collection_id: collection.collection_id.clone(),
            database_id: collection.database_id.clone(),
            created_at: now,
            updated_at: now,
            data,
        };
        docs.push(document.clone());

        debug!(collection = %collection, document_id = %document.id, "Stored document");
        Ok(document)
    }

    async fn get_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
    ) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == document_id).cloned()))
    }

    async fn list_documents(
        &self,
        collection: &CollectionRef,
        queries: &[Query],
    ) -> StoreResult<DocumentList> {
        let mut matched: Vec<Document> = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| queries.iter().all(|q| matches(doc, q)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        sort_documents(&mut matched, queries);
        let total = matched.len() as u64;

        let cursor_start = queries.iter().rev().find_map(|q| match q {
            Query::CursorAfter(id) => Some(id.as_str()),
            _ => None,
        });
        let start = match cursor_start {
            Some(id) => match matched.iter().position(|d| d.id == id) {
                Some(pos) => pos + 1,
                None => {
                    return Err(StoreError::Api {
                        status: 400,
                        kind: "general_cursor_not_found".to_string(),
                        message: format!("Document '{}' for the 'cursorAfter' value not found", id),
                    })
                }
            },
            None => 0,
        };

        let (limit, offset) = page_window(queries);
        let documents = matched
            .into_iter()
            .skip(start + offset)
            .take(limit)
            .collect();

        Ok(DocumentList { total, documents })
    }

    async fn update_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
        data: Map<String, Value>,
    ) -> StoreResult<Document> {
        let not_found = || StoreError::NotFound {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
        };

        let mut docs = self.collections.get_mut(collection).ok_or_else(not_found)?;
        let document = docs
            .iter_mut()
            .find(|d| d.id == document_id)
            .ok_or_else(not_found)?;

        for (key, value) in data {
            document.data.insert(key, value);
        }
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn delete_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
    ) -> StoreResult<()> {
        let removed = self
            .collections
            .get_mut(collection)
            .map(|mut docs| {
                let before = docs.len();
                docs.retain(|d| d.id != document_id);
                before != docs.len()
            })
            .unwrap_or(false);

        if !removed {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                document_id: document_id.to_string(),
            });
        }

        debug!(collection = %collection, document_id, "Removed document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn comments() -> CollectionRef {
        CollectionRef::new("main", "comments")
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamps() {
        let store = MemoryStore::new();
        let doc = store
            .create_document(&comments(), DocumentId::unique(), fields(json!({"content": "hi"})))
            .await
            .unwrap();

        assert_eq!(doc.id.len(), 20);
        assert_eq!(doc.collection_id, "comments");
        assert_eq!(doc.str_field("content"), Some("hi"));
        assert_eq!(store.len(&comments()), 1);
    }

    #[tokio::test]
    async fn test_duplicate_custom_id_conflicts() {
        let store = MemoryStore::new();
        store
            .create_document(&comments(), DocumentId::custom("a"), Map::new())
            .await
            .unwrap();
        let err = store
            .create_document(&comments(), DocumentId::custom("a"), Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_filter_sort_and_page() {
        let store = MemoryStore::new();
        for (id, post, ts) in [
            ("a", "p1", "2024-01-01T00:00:01.000Z"),
            ("b", "p2", "2024-01-01T00:00:02.000Z"),
            ("c", "p1", "2024-01-01T00:00:03.000Z"),
            ("d", "p1", "2024-01-01T00:00:02.500Z"),
        ] {
            store
                .create_document(
                    &comments(),
                    DocumentId::custom(id),
                    fields(json!({"post_id": post, "created_at": ts})),
                )
                .await
                .unwrap();
        }

        let page = store
            .list_documents(
                &comments(),
                &[Query::equal("post_id", "p1"), Query::order_desc("created_at")],
            )
            .await
            .unwrap();
        let ids: Vec<&str> = page.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(page.total, 3);
        assert_eq!(ids, vec!["c", "d", "a"]);

        let limited = store
            .list_documents(
                &comments(),
                &[
                    Query::equal("post_id", "p1"),
                    Query::order_asc("created_at"),
                    Query::limit(1),
                    Query::offset(1),
                ],
            )
            .await
            .unwrap();
        assert_eq!(limited.total, 3);
        assert_eq!(limited.documents.len(), 1);
        assert_eq!(limited.documents[0].id, "d");

        let after = store
            .list_documents(
                &comments(),
                &[Query::order_desc("created_at"), Query::cursor_after("d")],
            )
            .await
            .unwrap();
        let ids: Vec<&str> = after.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_default_page_size_applies() {
        let store = MemoryStore::new();
        for i in 0..30 {
            store
                .create_document(&comments(), DocumentId::custom(format!("c{i}")), Map::new())
                .await
                .unwrap();
        }
        let page = store.list_documents(&comments(), &[]).await.unwrap();
        assert_eq!(page.total, 30);
        assert_eq!(page.documents.len(), crate::DEFAULT_PAGE_SIZE as usize);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        store
            .create_document(&comments(), DocumentId::custom("a"), fields(json!({"n": 1})))
            .await
            .unwrap();

        let updated = store
            .update_document(&comments(), "a", fields(json!({"n": 2})))
            .await
            .unwrap();
        assert_eq!(updated.data["n"], json!(2));

        store.delete_document(&comments(), "a").await.unwrap();
        assert!(store.get_document(&comments(), "a").await.unwrap().is_none());

        let err = store.delete_document(&comments(), "a").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
