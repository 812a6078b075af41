pub mod comment_queries;
pub mod notifications;

pub use comment_queries::{comments_key, CommentQueries, DeleteCommentInput, LIST_COMMENTS};
pub use notifications::{ChannelNotifier, Notifier, Toast, ToastVariant, TracingNotifier};
