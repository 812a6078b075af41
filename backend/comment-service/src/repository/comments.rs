use std::sync::Arc;

use chrono::{DateTime, Utc};
use document_store::{
    format_timestamp, CollectionRef, DocumentId, DocumentStore, Query, DEFAULT_PAGE_SIZE,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::domain::models::{Comment, DeletedComment, NewComment, Session};
use crate::error::{CommentError, CommentResult};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Repository for Comment operations
#[derive(Clone)]
pub struct CommentRepository {
    store: Arc<dyn DocumentStore>,
    collection: CollectionRef,
    page_size: u32,
    clock: Clock,
}

impl CommentRepository {
    pub fn new(store: Arc<dyn DocumentStore>, collection: CollectionRef) -> Self {
        Self {
            store,
            collection,
            page_size: DEFAULT_PAGE_SIZE,
            clock: Arc::new(Utc::now),
        }
    }

    /// Maximum number of comments returned by `list_by_post`
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Source of `created_at` timestamps
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    /// Create a new comment
    pub async fn create_comment(
        &self,
        post_id: &str,
        user_id: &str,
        content: &str,
    ) -> CommentResult<Comment> {
        let new_comment = NewComment::new(post_id, user_id, content);
        new_comment.validate()?;

        let mut data = Map::new();
        data.insert("user_id".to_string(), Value::from(new_comment.user_id));
        data.insert("post_id".to_string(), Value::from(new_comment.post_id));
        data.insert("content".to_string(), Value::from(new_comment.content));
        data.insert(
            "created_at".to_string(),
            Value::from(format_timestamp((self.clock)())),
        );

        let document = self
            .store
            .create_document(&self.collection, DocumentId::unique(), data)
            .await?;
        let comment = Comment::try_from(document)?;

        info!(
            comment_id = %comment.id,
            post_id = %comment.post_id,
            user_id = %comment.user_id,
            "Comment created"
        );
        Ok(comment)
    }

    /// Get comments for a post, newest first, at most `page_size`
    pub async fn list_by_post(&self, post_id: &str) -> CommentResult<Vec<Comment>> {
        let queries = [
            Query::equal("post_id", post_id),
            Query::order_desc("created_at"),
            Query::limit(self.page_size),
        ];

        let page = self
            .store
            .list_documents(&self.collection, &queries)
            .await?;

        let comments = page
            .documents
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            post_id = %post_id,
            returned = comments.len(),
            total = page.total,
            "Comments listed"
        );
        Ok(comments)
    }

    /// Get a single comment by ID
    pub async fn get_comment(&self, comment_id: &str) -> CommentResult<Option<Comment>> {
        match self.store.get_document(&self.collection, comment_id).await? {
            Some(document) => Ok(Some(Comment::try_from(document)?)),
            None => Ok(None),
        }
    }

    /// Get comment count for a post
    pub async fn count_by_post(&self, post_id: &str) -> CommentResult<u64> {
        let page = self
            .store
            .list_documents(
                &self.collection,
                &[Query::equal("post_id", post_id), Query::limit(1)],
            )
            .await?;
        Ok(page.total)
    }

    /// Delete a comment authored by the session user.
    ///
    /// Returns the owning post id so callers can scope cache invalidation.
    pub async fn delete_comment(
        &self,
        session: &Session,
        comment_id: &str,
    ) -> CommentResult<DeletedComment> {
        let comment = self
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| CommentError::NotFound(format!("comment {}", comment_id)))?;

        if !comment.is_authored_by(session) {
            warn!(
                comment_id = %comment_id,
                user_id = %session.user_id,
                author_id = %comment.user_id,
                "Rejected delete by non-author"
            );
            return Err(CommentError::Forbidden {
                comment_id: comment_id.to_string(),
                user_id: session.user_id.clone(),
            });
        }

        self.store
            .delete_document(&self.collection, comment_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CommentError::NotFound(format!("comment {}", comment_id))
                } else {
                    CommentError::Store(e)
                }
            })?;

        info!(comment_id = %comment_id, post_id = %comment.post_id, "Comment deleted");
        Ok(DeletedComment {
            comment_id: comment.id,
            post_id: comment.post_id,
        })
    }
}
