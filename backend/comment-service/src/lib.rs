pub mod config;
pub mod domain;
pub mod error;
pub mod repository;
pub mod services;
pub mod ui;

pub use domain::models::{Comment, CommentAuthor, DeletedComment, NewComment, Session};
pub use error::{CommentError, CommentResult};
pub use repository::CommentRepository;
pub use services::{CommentQueries, Notifier, Toast, ToastVariant};
pub use ui::{CommentSection, InputEvent};
