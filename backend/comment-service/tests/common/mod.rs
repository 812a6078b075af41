//! Shared fixtures for comment-service integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use comment_service::services::{ChannelNotifier, CommentQueries, Toast};
use comment_service::CommentRepository;
use document_store::{
    CollectionRef, Document, DocumentId, DocumentList, DocumentStore, MemoryStore, Query,
    StoreError, StoreResult,
};
use query_cache::QueryClient;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Memory store that counts calls and fails on demand
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_create: Arc<AtomicBool>,
    fail_list: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
    creates: Arc<AtomicUsize>,
    lists: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn unavailable() -> StoreError {
        StoreError::Api {
            status: 503,
            kind: "general_service_unavailable".to_string(),
            message: "simulated network failure".to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create_document(
        &self,
        collection: &CollectionRef,
        document_id: DocumentId,
        data: Map<String, Value>,
    ) -> StoreResult<Document> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.create_document(collection, document_id, data).await
    }

    async fn get_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
    ) -> StoreResult<Option<Document>> {
        self.inner.get_document(collection, document_id).await
    }

    async fn list_documents(
        &self,
        collection: &CollectionRef,
        queries: &[Query],
    ) -> StoreResult<DocumentList> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.list_documents(collection, queries).await
    }

    async fn update_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
        data: Map<String, Value>,
    ) -> StoreResult<Document> {
        self.inner.update_document(collection, document_id, data).await
    }

    async fn delete_document(&self, collection: &CollectionRef, document_id: &str) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.delete_document(collection, document_id).await
    }
}

pub fn comments_collection() -> CollectionRef {
    CollectionRef::new("main", "comments")
}

/// Clock advancing one second per call, so every comment has a distinct timestamp
pub fn ticking_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
    let tick = Arc::new(AtomicI64::new(0));
    let base = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    move || base + Duration::seconds(tick.fetch_add(1, Ordering::SeqCst))
}

pub struct Fixture {
    pub store: FlakyStore,
    pub repository: CommentRepository,
    pub queries: CommentQueries,
    pub notifier: Arc<ChannelNotifier>,
    pub toasts: mpsc::UnboundedReceiver<Toast>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = FlakyStore::new();
        let repository = CommentRepository::new(Arc::new(store.clone()), comments_collection())
            .with_clock(ticking_clock());
        let queries = CommentQueries::new(QueryClient::new(), repository.clone());
        let (notifier, toasts) = ChannelNotifier::channel();

        Self {
            store,
            repository,
            queries,
            notifier: Arc::new(notifier),
            toasts,
        }
    }

    /// Toasts emitted so far
    pub fn take_toasts(&mut self) -> Vec<Toast> {
        let mut toasts = Vec::new();
        while let Ok(toast) = self.toasts.try_recv() {
            toasts.push(toast);
        }
        toasts
    }
}
