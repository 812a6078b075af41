pub mod comment_section;

pub use comment_section::{
    CommentRow, CommentSection, CommentSectionView, Dispatch, InputEvent, PostAction,
    SectionEvent, DEFAULT_PREVIEW_LIMIT,
};
