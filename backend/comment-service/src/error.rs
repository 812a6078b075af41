/// Error types for comment-service
use document_store::StoreError;
use query_cache::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommentError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The session user is not the author of the comment
    #[error("Forbidden: {user_id} may not delete comment {comment_id}")]
    Forbidden { comment_id: String, user_id: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<validator::ValidationErrors> for CommentError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CommentError::InvalidInput(errors.to_string())
    }
}

impl CommentError {
    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            CommentError::Store(StoreError::Http(_)) => true,
            CommentError::Store(StoreError::Api { status, .. }) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias for comment operations
pub type CommentResult<T> = Result<T, CommentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_display() {
        let err = CommentError::Forbidden {
            comment_id: "c1".to_string(),
            user_id: "u2".to_string(),
        };
        assert_eq!(err.to_string(), "Forbidden: u2 may not delete comment c1");
    }

    #[test]
    fn test_transient_classification() {
        let quota = CommentError::Store(StoreError::Api {
            status: 429,
            kind: "general_rate_limit_exceeded".to_string(),
            message: "Rate limit".to_string(),
        });
        assert!(quota.is_transient());

        let unauthorized = CommentError::Store(StoreError::Api {
            status: 401,
            kind: "user_unauthorized".to_string(),
            message: "Unauthorized".to_string(),
        });
        assert!(!unauthorized.is_transient());
        assert!(!CommentError::NotFound("c1".to_string()).is_transient());
    }
}
