//! Comment section view-model
//!
//! Headless model of the comment block under a post: a short preview of the
//! newest comments and a single-line input. Front ends feed it `InputEvent`s,
//! pump completions with `next_event` / `drain_events` and draw `render()`.
//!
//! Mutations run as spawned tasks. Their outcomes come back over a channel,
//! so the pending state stays observable between dispatch and completion.

use std::fmt;
use std::sync::Arc;

use query_cache::{Mutation, QueryObserver};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::models::{
    validate_comment_content, Comment, DeletedComment, NewComment, Session,
};
use crate::error::{CommentError, CommentResult};
use crate::services::comment_queries::{CommentQueries, DeleteCommentInput};
use crate::services::notifications::{Notifier, Toast};

/// Comments shown in the preview
pub const DEFAULT_PREVIEW_LIMIT: usize = 2;

pub const INPUT_PLACEHOLDER: &str = "Add a comment...";

const POST_LABEL: &str = "Post";
const PENDING_LABEL: &str = "...";

const CREATED_TITLE: &str = "Comment added successfully";
const CREATE_FAILED_TITLE: &str = "Error adding comment";
const DELETED_TITLE: &str = "Comment deleted successfully";
const DELETE_FAILED_TITLE: &str = "Error deleting comment";
const RETRY_HINT: &str = "Please try again";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Char(char),
    Backspace,
    Paste(String),
    Enter { shift: bool },
}

/// What an input or action led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Guarded or non-submitting input; nothing sent, nothing shown
    Ignored,
    /// Input text changed
    Edited,
    /// Create mutation started
    Create,
    /// Delete mutation started for the comment id
    Delete(String),
    /// Content failed validation; a notification was shown
    Rejected(String),
}

/// Completion of a spawned mutation
#[derive(Debug, Clone, PartialEq)]
pub enum SectionEvent {
    Created(Result<Comment, String>),
    Deleted {
        comment_id: String,
        result: Result<DeletedComment, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRow {
    pub id: String,
    pub author_name: String,
    pub content: String,
    /// Delete affordance shown (viewer is the author)
    pub can_delete: bool,
    /// Affordance shown but inactive while a delete is in flight
    pub delete_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAction {
    pub label: &'static str,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSectionView {
    pub post_id: String,
    /// Empty means no preview block is drawn
    pub rows: Vec<CommentRow>,
    pub input: String,
    pub placeholder: &'static str,
    /// Present only when the trimmed input is non-empty
    pub post_action: Option<PostAction>,
    pub is_loading: bool,
}

impl CommentSectionView {
    pub fn has_preview(&self) -> bool {
        !self.rows.is_empty()
    }
}

impl fmt::Display for CommentSectionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            if row.author_name.is_empty() {
                write!(f, "{}", row.content)?;
            } else {
                write!(f, "{} {}", row.author_name, row.content)?;
            }
            if row.can_delete {
                let label = if row.delete_disabled { "deleting" } else { "delete" };
                write!(f, "  [{}: {}]", label, row.id)?;
            }
            writeln!(f)?;
        }

        if self.input.is_empty() {
            write!(f, "> {}", self.placeholder)?;
        } else {
            write!(f, "> {}", self.input)?;
        }
        if let Some(action) = &self.post_action {
            write!(f, "  [{}]", action.label)?;
        }
        Ok(())
    }
}

pub struct CommentSection {
    post_id: String,
    session: Option<Session>,
    input: String,
    preview_limit: usize,
    comments: QueryObserver<Vec<Comment>>,
    create: Mutation<NewComment, Comment, CommentError>,
    delete: Mutation<DeleteCommentInput, DeletedComment, CommentError>,
    notifier: Arc<dyn Notifier>,
    events_tx: mpsc::UnboundedSender<SectionEvent>,
    events_rx: mpsc::UnboundedReceiver<SectionEvent>,
}

impl CommentSection {
    /// Mount the section for `post_id`; starts observing its comment list
    pub fn new(
        queries: &CommentQueries,
        post_id: impl Into<String>,
        session: Option<Session>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let post_id = post_id.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            comments: queries.comments(&post_id),
            create: queries.create_comment(),
            delete: queries.delete_comment(),
            post_id,
            session,
            input: String::new(),
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            notifier,
            events_tx,
            events_rx,
        }
    }

    pub fn with_preview_limit(mut self, preview_limit: usize) -> Self {
        self.preview_limit = preview_limit;
        self
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_creating(&self) -> bool {
        self.create.is_pending()
    }

    pub fn is_deleting(&self) -> bool {
        self.delete.is_pending()
    }

    pub fn handle_input(&mut self, event: InputEvent) -> Dispatch {
        match event {
            InputEvent::Char('\n') | InputEvent::Char('\r') => Dispatch::Ignored,
            InputEvent::Char(c) => {
                self.input.push(c);
                Dispatch::Edited
            }
            InputEvent::Backspace => match self.input.pop() {
                Some(_) => Dispatch::Edited,
                None => Dispatch::Ignored,
            },
            InputEvent::Paste(text) => {
                // single-line field drops line breaks
                self.input
                    .extend(text.chars().filter(|c| *c != '\n' && *c != '\r'));
                Dispatch::Edited
            }
            InputEvent::Enter { shift: false } => self.submit(),
            InputEvent::Enter { shift: true } => Dispatch::Ignored,
        }
    }

    /// Post the current input; same as pressing the post action
    pub fn submit(&mut self) -> Dispatch {
        if self.input.trim().is_empty() {
            return Dispatch::Ignored;
        }
        let Some(session) = self.session.as_ref() else {
            return Dispatch::Ignored;
        };
        if self.create.is_pending() {
            return Dispatch::Ignored;
        }

        if let Err(err) = validate_comment_content(&self.input) {
            let message = err
                .message
                .map(|m| m.into_owned())
                .unwrap_or_else(|| err.code.into_owned());
            self.notifier
                .notify(Toast::error(CREATE_FAILED_TITLE, message.clone()));
            return Dispatch::Rejected(message);
        }

        let input = NewComment::new(&self.post_id, &session.user_id, self.input.clone());
        debug!(post_id = %self.post_id, user_id = %session.user_id, "Submitting comment");

        let call = self.create.dispatch(input);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = call.await.map_err(|e| {
                debug!(transient = e.is_transient(), error = %e, "Comment create failed");
                e.to_string()
            });
            let _ = tx.send(SectionEvent::Created(result));
        });
        Dispatch::Create
    }

    /// Submit `line` as a whole comment, for line-oriented front ends.
    ///
    /// While a create is pending the line is dropped and the pending input
    /// kept. Otherwise the line replaces the input, and a line that is not
    /// dispatched is cleared rather than carried into the next one.
    pub fn submit_line(&mut self, line: &str) -> Dispatch {
        if self.is_creating() {
            return Dispatch::Ignored;
        }

        self.input.clear();
        self.handle_input(InputEvent::Paste(line.to_string()));
        let dispatch = self.submit();
        if dispatch == Dispatch::Ignored {
            self.input.clear();
        }
        dispatch
    }

    /// Delete one of the previewed comments; only the author sees the affordance
    pub fn request_delete(&mut self, comment_id: &str) -> Dispatch {
        let Some(session) = self.session.clone() else {
            return Dispatch::Ignored;
        };
        if self.delete.is_pending() {
            return Dispatch::Ignored;
        }

        let deletable = self
            .visible_comments()
            .iter()
            .any(|c| c.id == comment_id && c.is_authored_by(&session));
        if !deletable {
            return Dispatch::Ignored;
        }

        debug!(comment_id = %comment_id, user_id = %session.user_id, "Deleting comment");
        let call = self.delete.dispatch(DeleteCommentInput {
            session,
            comment_id: comment_id.to_string(),
        });
        let tx = self.events_tx.clone();
        let owned_id = comment_id.to_string();
        tokio::spawn(async move {
            let result = call.await.map_err(|e| e.to_string());
            let _ = tx.send(SectionEvent::Deleted {
                comment_id: owned_id,
                result,
            });
        });
        Dispatch::Delete(comment_id.to_string())
    }

    fn apply(&mut self, event: &SectionEvent) {
        match event {
            SectionEvent::Created(Ok(_)) => {
                self.input.clear();
                self.notifier.notify(Toast::success(CREATED_TITLE));
            }
            SectionEvent::Created(Err(_)) => {
                self.notifier
                    .notify(Toast::error(CREATE_FAILED_TITLE, RETRY_HINT));
            }
            SectionEvent::Deleted { result: Ok(_), .. } => {
                self.notifier.notify(Toast::success(DELETED_TITLE));
            }
            SectionEvent::Deleted { result: Err(_), .. } => {
                self.notifier
                    .notify(Toast::error(DELETE_FAILED_TITLE, RETRY_HINT));
            }
        }
    }

    /// Wait for the next mutation completion and apply it
    pub async fn next_event(&mut self) -> Option<SectionEvent> {
        let event = self.events_rx.recv().await?;
        self.apply(&event);
        Some(event)
    }

    /// Apply every completion already delivered; returns how many
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(&event);
            applied += 1;
        }
        applied
    }

    /// Wait for the comment list to change
    pub async fn comments_changed(&mut self) -> CommentResult<()> {
        Ok(self.comments.changed().await?)
    }

    /// Wait for whichever comes first: a mutation completion (applied and
    /// returned) or a change of the comment list (`None`)
    pub async fn next_update(&mut self) -> CommentResult<Option<SectionEvent>> {
        tokio::select! {
            event = self.events_rx.recv() => {
                match event {
                    Some(event) => {
                        self.apply(&event);
                        Ok(Some(event))
                    }
                    None => Ok(None),
                }
            }
            changed = self.comments.changed() => {
                changed?;
                Ok(None)
            }
        }
    }

    /// Wait until the current list fetch settles and return the full list
    pub async fn wait_for_comments(&mut self) -> CommentResult<Vec<Comment>> {
        let snapshot = self.comments.wait_settled().await?;
        Ok(snapshot.data.unwrap_or_default())
    }

    fn visible_comments(&self) -> Vec<Comment> {
        self.comments
            .snapshot()
            .data
            .unwrap_or_default()
            .into_iter()
            .take(self.preview_limit)
            .collect()
    }

    pub fn render(&self) -> CommentSectionView {
        let snapshot = self.comments.snapshot();
        let deleting = self.delete.is_pending();

        let rows = snapshot
            .data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .take(self.preview_limit)
            .map(|comment| {
                let can_delete = self
                    .session
                    .as_ref()
                    .map(|s| comment.is_authored_by(s))
                    .unwrap_or(false);
                CommentRow {
                    id: comment.id.clone(),
                    author_name: comment.author_name().to_string(),
                    content: comment.content.clone(),
                    can_delete,
                    delete_disabled: can_delete && deleting,
                }
            })
            .collect();

        let post_action = if self.input.trim().is_empty() {
            None
        } else {
            let creating = self.create.is_pending();
            Some(PostAction {
                label: if creating { PENDING_LABEL } else { POST_LABEL },
                disabled: creating,
            })
        };

        CommentSectionView {
            post_id: self.post_id.clone(),
            rows,
            input: self.input.clone(),
            placeholder: INPUT_PLACEHOLDER,
            post_action,
            is_loading: snapshot.is_fetching && snapshot.data.is_none(),
        }
    }
}
