//! REST client for the hosted document database
//!
//! Endpoints: `{endpoint}/databases/{database}/collections/{collection}/documents[/{id}]`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    CollectionRef, Document, DocumentId, DocumentList, DocumentStore, Query, StoreError,
    StoreResult,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How requests authenticate against the platform
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    /// Server key (`X-Appwrite-Key`)
    ApiKey(String),
    /// Short-lived user session token (`X-Appwrite-JWT`)
    Jwt(String),
    /// Anonymous access, relies on collection permissions
    #[default]
    None,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDocumentRequest<'a> {
    document_id: &'a str,
    data: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpdateDocumentRequest<'a> {
    data: &'a Map<String, Value>,
}

/// Error body returned by the platform on non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}

pub struct AppwriteStoreBuilder {
    endpoint: String,
    project_id: String,
    credentials: Credentials,
    timeout: Duration,
}

impl AppwriteStoreBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> StoreResult<AppwriteStore> {
        if self.project_id.is_empty() {
            return Err(StoreError::Configuration(
                "project id must not be empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(self.timeout).build()?;

        Ok(AppwriteStore {
            client,
            endpoint: self.endpoint.trim_end_matches('/').to_string(),
            project_id: self.project_id,
            credentials: self.credentials,
        })
    }
}

/// Document store backed by the platform's REST API
#[derive(Clone)]
pub struct AppwriteStore {
    client: Client,
    endpoint: String,
    project_id: String,
    credentials: Credentials,
}

impl AppwriteStore {
    pub fn builder(endpoint: impl Into<String>, project_id: impl Into<String>) -> AppwriteStoreBuilder {
        AppwriteStoreBuilder {
            endpoint: endpoint.into(),
            project_id: project_id.into(),
            credentials: Credentials::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn documents_url(&self, collection: &CollectionRef) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.endpoint,
            urlencoding::encode(&collection.database_id),
            urlencoding::encode(&collection.collection_id)
        )
    }

    fn document_url(&self, collection: &CollectionRef, document_id: &str) -> String {
        format!(
            "{}/{}",
            self.documents_url(collection),
            urlencoding::encode(document_id)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("X-Appwrite-Project", &self.project_id);
        match &self.credentials {
            Credentials::ApiKey(key) => request.header("X-Appwrite-Key", key),
            Credentials::Jwt(token) => request.header("X-Appwrite-JWT", token),
            Credentials::None => request,
        }
    }

    /// Map non-2xx responses to `StoreError::Api`
    async fn check(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let (kind, message) = match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) => (body.kind, body.message),
            Err(_) => ("unknown".to_string(), text),
        };

        warn!(
            status = status.as_u16(),
            kind = %kind,
            message = %message,
            "Document store request failed"
        );

        Err(StoreError::Api {
            status: status.as_u16(),
            kind,
            message,
        })
    }
}

#[async_trait]
impl DocumentStore for AppwriteStore {
    async fn create_document(
        &self,
        collection: &CollectionRef,
        document_id: DocumentId,
        data: Map<String, Value>,
    ) -> StoreResult<Document> {
        let body = CreateDocumentRequest {
            document_id: document_id.as_wire(),
            data: &data,
        };

        debug!(collection = %collection, document_id = body.document_id, "Creating document");

        let response = self
            .authorize(self.client.post(self.documents_url(collection)))
            .json(&body)
            .send()
            .await?;

        let document = Self::check(response).await?.json::<Document>().await?;
        Ok(document)
    }

    async fn get_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
    ) -> StoreResult<Option<Document>> {
        let response = self
            .authorize(self.client.get(self.document_url(collection, document_id)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(collection = %collection, document_id, "Document not found");
            return Ok(None);
        }

        let document = Self::check(response).await?.json::<Document>().await?;
        Ok(Some(document))
    }

    async fn list_documents(
        &self,
        collection: &CollectionRef,
        queries: &[Query],
    ) -> StoreResult<DocumentList> {
        let params: Vec<(&str, String)> = queries
            .iter()
            .map(|q| ("queries[]", q.to_wire()))
            .collect();

        debug!(collection = %collection, queries = params.len(), "Listing documents");

        let response = self
            .authorize(self.client.get(self.documents_url(collection)))
            .query(&params)
            .send()
            .await?;

        let list = Self::check(response).await?.json::<DocumentList>().await?;
        Ok(list)
    }

    async fn update_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
        data: Map<String, Value>,
    ) -> StoreResult<Document> {
        let response = self
            .authorize(self.client.patch(self.document_url(collection, document_id)))
            .json(&UpdateDocumentRequest { data: &data })
            .send()
            .await?;

        let document = Self::check(response).await?.json::<Document>().await?;
        Ok(document)
    }

    async fn delete_document(
        &self,
        collection: &CollectionRef,
        document_id: &str,
    ) -> StoreResult<()> {
        debug!(collection = %collection, document_id, "Deleting document");

        let response = self
            .authorize(self.client.delete(self.document_url(collection, document_id)))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
