//! Query cache error types

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum QueryError {
    /// The query function failed; message of the underlying error
    #[error("Query failed: {0}")]
    Fetch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The observed query has no query function (disabled observer)
    #[error("Query is disabled: {0}")]
    Disabled(String),

    /// The entry was evicted or the runtime shut down while waiting
    #[error("Query closed: {0}")]
    Closed(String),
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Serialization(err.to_string())
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::Fetch("network down".to_string());
        assert_eq!(err.to_string(), "Query failed: network down");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let err: QueryError = json_err.into();
        assert!(matches!(err, QueryError::Serialization(_)));
    }
}
