use std::borrow::Cow;

use chrono::{DateTime, Utc};
use document_store::{Document, StoreError};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Longest comment body accepted, in characters
pub const MAX_COMMENT_LENGTH: usize = 200;

/// Comment entity - one remark attached to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Expanded `user` relationship, when the store returns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<CommentAuthor>,
}

/// Public profile fields of a comment's author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAuthor {
    #[serde(rename = "$id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "imageUrl", alias = "image_url", default)]
    pub image_url: Option<String>,
}

impl Comment {
    /// Name shown next to the content; empty when the author was not expanded
    pub fn author_name(&self) -> &str {
        self.author.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn is_authored_by(&self, session: &Session) -> bool {
        self.user_id == session.user_id
    }
}

impl TryFrom<Document> for Comment {
    type Error = StoreError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        let post_id = doc.require_str("post_id")?.to_string();
        let user_id = doc.require_str("user_id")?.to_string();
        let content = doc.require_str("content")?.to_string();

        // created_at is written by the client; fall back to the store timestamp
        let created_at = match doc.str_field("created_at") {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    StoreError::InvalidDocument(format!(
                        "document {} has invalid created_at '{}': {}",
                        doc.id, raw, e
                    ))
                })?,
            None => doc.created_at,
        };

        // relationship attributes may come back as a bare id when not expanded
        let author = match doc.field("user") {
            Some(value) if value.is_object() => doc.get::<CommentAuthor>("user")?,
            _ => None,
        };

        Ok(Comment {
            id: doc.id,
            post_id,
            user_id,
            content,
            created_at,
            author,
        })
    }
}

/// Authenticated user context, passed explicitly into each operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub name: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

/// Input of a create call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1))]
    pub post_id: String,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(custom(function = "validate_comment_content"))]
    pub content: String,
}

impl NewComment {
    pub fn new(
        post_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            user_id: user_id.into(),
            content: content.into(),
        }
    }
}

/// Content rule: not blank, at most 200 characters
pub fn validate_comment_content(content: &str) -> Result<(), ValidationError> {
    let (code, message) = if content.trim().is_empty() {
        ("comment_empty", "Comment cannot be empty")
    } else if content.chars().count() > MAX_COMMENT_LENGTH {
        ("comment_too_long", "Comment too long")
    } else {
        return Ok(());
    };

    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    Err(err)
}

/// Result of a delete: the removed id and the post it belonged to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedComment {
    pub comment_id: String,
    pub post_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(extra: serde_json::Value) -> Document {
        let mut value = json!({
            "$id": "c1",
            "$collectionId": "comments",
            "$databaseId": "main",
            "$createdAt": "2024-05-01T10:00:00.000+00:00",
            "$updatedAt": "2024-05-01T10:00:00.000+00:00",
            "post_id": "p1",
            "user_id": "u1",
            "content": "hello",
            "created_at": "2024-05-01T09:59:59.500Z"
        });
        if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_comment_from_document() {
        let comment = Comment::try_from(document(json!({}))).unwrap();

        assert_eq!(comment.id, "c1");
        assert_eq!(comment.post_id, "p1");
        assert_eq!(comment.user_id, "u1");
        assert_eq!(comment.content, "hello");
        assert_eq!(
            comment.created_at,
            DateTime::parse_from_rfc3339("2024-05-01T09:59:59.500Z").unwrap()
        );
        assert!(comment.author.is_none());
        assert_eq!(comment.author_name(), "");
    }

    #[test]
    fn test_expanded_author_is_decoded() {
        let comment = Comment::try_from(document(json!({
            "user": {"$id": "u1", "name": "Ada", "username": "ada", "imageUrl": null}
        })))
        .unwrap();

        let author = comment.author.as_ref().unwrap();
        assert_eq!(author.id, "u1");
        assert_eq!(author.username.as_deref(), Some("ada"));
        assert_eq!(comment.author_name(), "Ada");
    }

    #[test]
    fn test_unexpanded_relationship_is_ignored() {
        let comment = Comment::try_from(document(json!({"user": "u1"}))).unwrap();
        assert!(comment.author.is_none());
    }

    #[test]
    fn test_missing_post_id_is_invalid() {
        let comment = Comment::try_from(document(json!({"post_id": null})));
        assert!(matches!(comment, Err(StoreError::InvalidDocument(_))));
    }

    #[test]
    fn test_content_rules() {
        assert!(validate_comment_content("hi").is_ok());
        assert!(validate_comment_content(&"é".repeat(200)).is_ok());

        let empty = validate_comment_content("").unwrap_err();
        assert_eq!(empty.message.as_deref(), Some("Comment cannot be empty"));
        assert_eq!(validate_comment_content(" \t ").unwrap_err().code, "comment_empty");

        let long = validate_comment_content(&"a".repeat(201)).unwrap_err();
        assert_eq!(long.code, "comment_too_long");
        assert_eq!(long.message.as_deref(), Some("Comment too long"));
    }

    #[test]
    fn test_new_comment_validation() {
        assert!(NewComment::new("p1", "u1", "hello").validate().is_ok());
        assert!(NewComment::new("", "u1", "hello").validate().is_err());
        assert!(NewComment::new("p1", "u1", "").validate().is_err());
    }

    #[test]
    fn test_authorship() {
        let comment = Comment::try_from(document(json!({}))).unwrap();
        assert!(comment.is_authored_by(&Session::new("u1", "Ada")));
        assert!(!comment.is_authored_by(&Session::new("u2", "Bob")));
    }
}
