/// Configuration management for Comment Service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Document store configuration
    pub store: StoreConfig,
    /// Comment behaviour
    pub comments: CommentsConfig,
    /// Query cache configuration
    pub cache: CacheConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
}

/// Hosted document store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// API endpoint, e.g. https://cloud.appwrite.io/v1
    pub endpoint: String,
    pub project_id: String,
    pub database_id: String,
    pub comments_collection_id: String,
    /// Server API key; takes precedence over `jwt`
    pub api_key: Option<String>,
    /// Session JWT for user-scoped access
    pub jwt: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsConfig {
    /// Explicit list limit per post
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Comments shown in the preview block
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds an unobserved list stays cached
    #[serde(default = "default_gc_secs")]
    pub gc_secs: u64,
}

// Default values
fn default_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> u32 {
    document_store::DEFAULT_PAGE_SIZE
}

fn default_preview_limit() -> usize {
    crate::ui::DEFAULT_PREVIEW_LIMIT
}

fn default_gc_secs() -> u64 {
    300
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        };

        let store = StoreConfig {
            endpoint: std::env::var("APPWRITE_ENDPOINT")
                .context("APPWRITE_ENDPOINT environment variable not set")?,
            project_id: std::env::var("APPWRITE_PROJECT_ID")
                .context("APPWRITE_PROJECT_ID environment variable not set")?,
            database_id: std::env::var("APPWRITE_DATABASE_ID")
                .context("APPWRITE_DATABASE_ID environment variable not set")?,
            comments_collection_id: std::env::var("APPWRITE_COMMENTS_COLLECTION_ID")
                .context("APPWRITE_COMMENTS_COLLECTION_ID environment variable not set")?,
            api_key: std::env::var("APPWRITE_API_KEY").ok().filter(|s| !s.is_empty()),
            jwt: std::env::var("APPWRITE_JWT").ok().filter(|s| !s.is_empty()),
            timeout_secs: parsed("STORE_TIMEOUT_SECS").unwrap_or_else(default_timeout_secs),
        };

        let comments = CommentsConfig {
            page_size: parsed("COMMENTS_PAGE_SIZE").unwrap_or_else(default_page_size),
            preview_limit: parsed("COMMENT_PREVIEW_LIMIT").unwrap_or_else(default_preview_limit),
        };

        let cache = CacheConfig {
            gc_secs: parsed("QUERY_GC_SECS").unwrap_or_else(default_gc_secs),
        };

        Ok(Config {
            app,
            store,
            comments,
            cache,
        })
    }

    /// Defaults for running against the in-memory store
    pub fn in_memory() -> Self {
        Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            store: StoreConfig {
                endpoint: String::new(),
                project_id: String::new(),
                database_id: "local".to_string(),
                comments_collection_id: "comments".to_string(),
                api_key: None,
                jwt: None,
                timeout_secs: default_timeout_secs(),
            },
            comments: CommentsConfig {
                page_size: parsed("COMMENTS_PAGE_SIZE").unwrap_or_else(default_page_size),
                preview_limit: parsed("COMMENT_PREVIEW_LIMIT")
                    .unwrap_or_else(default_preview_limit),
            },
            cache: CacheConfig {
                gc_secs: parsed("QUERY_GC_SECS").unwrap_or_else(default_gc_secs),
            },
        }
    }
}
