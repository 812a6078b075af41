/// Cached query and mutation bindings for comments
///
/// The list query is keyed `listComments:<post_id>`. Both mutations
/// invalidate exactly the key of the post they touched, so observers of
/// other posts never refetch.
use std::time::Duration;

use query_cache::{
    Mutation, QueryClient, QueryFilter, QueryKey, QueryObserver, QueryOptions,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::models::{Comment, DeletedComment, NewComment, Session};
use crate::error::CommentError;
use crate::repository::CommentRepository;

pub const LIST_COMMENTS: &str = "listComments";

pub fn comments_key(post_id: &str) -> QueryKey {
    QueryKey::root(LIST_COMMENTS).with(post_id)
}

/// Input of the delete mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCommentInput {
    pub session: Session,
    pub comment_id: String,
}

#[derive(Clone)]
pub struct CommentQueries {
    client: QueryClient,
    repository: CommentRepository,
    stale_time: Duration,
}

impl CommentQueries {
    pub fn new(client: QueryClient, repository: CommentRepository) -> Self {
        Self {
            client,
            repository,
            stale_time: Duration::ZERO,
        }
    }

    /// How long a cached list counts as fresh for new observers
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn repository(&self) -> &CommentRepository {
        &self.repository
    }

    /// Observe the comment list of `post_id`; an empty id never fetches
    pub fn comments(&self, post_id: &str) -> QueryObserver<Vec<Comment>> {
        let repository = self.repository.clone();
        let owned_post_id = post_id.to_string();
        let options = QueryOptions::default()
            .enabled(!post_id.is_empty())
            .stale_time(self.stale_time);

        self.client.observe(comments_key(post_id), options, move || {
            let repository = repository.clone();
            let post_id = owned_post_id.clone();
            async move { repository.list_by_post(&post_id).await }
        })
    }

    /// Cached list of `post_id` without subscribing
    pub fn cached_comments(&self, post_id: &str) -> Option<Vec<Comment>> {
        self.client.get_query_data(&comments_key(post_id))
    }

    pub fn create_comment(&self) -> Mutation<NewComment, Comment, CommentError> {
        let repository = self.repository.clone();
        let client = self.client.clone();

        Mutation::builder("createComment", move |input: NewComment| {
            let repository = repository.clone();
            async move {
                repository
                    .create_comment(&input.post_id, &input.user_id, &input.content)
                    .await
            }
        })
        .on_success(move |comment: &Comment, _| {
            debug!(post_id = %comment.post_id, "Invalidating comments after create");
            client.invalidate_queries(&QueryFilter::Exact(comments_key(&comment.post_id)));
        })
        .build()
    }

    pub fn delete_comment(&self) -> Mutation<DeleteCommentInput, DeletedComment, CommentError> {
        let repository = self.repository.clone();
        let client = self.client.clone();

        Mutation::builder("deleteComment", move |input: DeleteCommentInput| {
            let repository = repository.clone();
            async move {
                repository
                    .delete_comment(&input.session, &input.comment_id)
                    .await
            }
        })
        .on_success(move |deleted: &DeletedComment, _| {
            debug!(post_id = %deleted.post_id, "Invalidating comments after delete");
            client.invalidate_queries(&QueryFilter::Exact(comments_key(&deleted.post_id)));
        })
        .build()
    }
}
