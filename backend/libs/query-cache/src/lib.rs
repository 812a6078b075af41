//! Client-side server-state cache
//!
//! Provides the read/write plumbing UI components sit on:
//! - Keyed queries with observers (`QueryClient::observe`)
//! - Exact, prefix and global invalidation with refetch of observed queries
//! - Tracked mutations with success/error hooks (`Mutation`)
//! - Inactive-entry garbage collection
//! - Prometheus metrics and in-process stats
//!
//! ```no_run
//! use query_cache::{QueryClient, QueryFilter, QueryKey, QueryOptions};
//!
//! # async fn demo() {
//! let client = QueryClient::new();
//! let key = QueryKey::root("listComments").with("post-1");
//!
//! let mut observer = client.observe(key.clone(), QueryOptions::default(), || async {
//!     Ok::<_, String>(vec!["first".to_string()])
//! });
//! let snapshot = observer.wait_settled().await.unwrap();
//! assert_eq!(snapshot.data.map(|d| d.len()), Some(1));
//!
//! client.invalidate_queries(&QueryFilter::Exact(key));
//! # }
//! ```

mod client;
mod error;
mod keys;
mod metrics;
mod mutation;
mod stats;

pub use client::{
    FetchStatus, QueryClient, QueryClientConfig, QueryFn, QueryObserver, QueryOptions,
    QuerySnapshot, QueryState, QueryStatus, DEFAULT_GC_TIME,
};
pub use error::{QueryError, QueryResult};
pub use keys::{QueryFilter, QueryKey};
pub use metrics::QueryMetrics;
pub use mutation::{Mutation, MutationBuilder, MutationState, MutationStatus};
pub use stats::{CacheStats, StatsCollector};
