pub mod comments;

pub use comments::CommentRepository;
