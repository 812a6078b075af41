//! Query keys and invalidation filters
//!
//! A key is an ordered list of segments, root first:
//! `["listComments", "<post_id>"]`. Filters match keys exactly or by prefix.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Single-segment key, usually the query name
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Append a segment
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment, used as the metrics label
    pub fn root_name(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("unknown")
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

/// Which cached queries an invalidation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    Exact(QueryKey),
    Prefix(QueryKey),
    All,
}

impl QueryFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            QueryFilter::Exact(k) => k == key,
            QueryFilter::Prefix(prefix) => key.starts_with(prefix),
            QueryFilter::All => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = QueryKey::root("listComments").with("p1");
        assert_eq!(key.to_string(), "listComments:p1");
        assert_eq!(key.root_name(), "listComments");
    }

    #[test]
    fn test_prefix_match() {
        let key = QueryKey::new(["listComments", "p1"]);
        assert!(key.starts_with(&QueryKey::root("listComments")));
        assert!(key.starts_with(&key));
        assert!(!key.starts_with(&QueryKey::root("getPost")));
        assert!(!QueryKey::root("listComments").starts_with(&key));
    }

    #[test]
    fn test_filters() {
        let p1 = QueryKey::new(["listComments", "p1"]);
        let p2 = QueryKey::new(["listComments", "p2"]);

        let exact = QueryFilter::Exact(p1.clone());
        assert!(exact.matches(&p1));
        assert!(!exact.matches(&p2));

        let prefix = QueryFilter::Prefix(QueryKey::root("listComments"));
        assert!(prefix.matches(&p1));
        assert!(prefix.matches(&p2));

        assert!(QueryFilter::All.matches(&p2));
    }
}
