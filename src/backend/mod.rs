//! "Submit vote" collaborator.
//!
//! The server keeps one signed vote per (user, item) and applies the same
//! toggle/flip rule as the local engine, so a request only names the item and
//! the clicked direction.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::vote::item::ItemId;
use crate::vote::VoteAction;

mod http;
pub mod retry;

pub use http::HttpBackend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRequest {
    pub id: ItemId,
    pub action: VoteAction,
}

impl VoteRequest {
    pub fn new(id: ItemId, action: VoteAction) -> Self {
        Self { id, action }
    }

    /// Action segment of `/api/thread/{thread}/{action}`.
    pub fn endpoint_action(&self) -> &'static str {
        match (&self.id, self.action) {
            (ItemId::Message { .. }, VoteAction::Upvote) => "upvoteMessage",
            (ItemId::Message { .. }, VoteAction::Downvote) => "downvoteMessage",
            (ItemId::Comment { .. }, VoteAction::Upvote) => "upvoteComment",
            (ItemId::Comment { .. }, VoteAction::Downvote) => "downvoteComment",
        }
    }

    pub fn endpoint(&self, base: &Url) -> Result<Url, BackendError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidEndpoint(format!("{} cannot be a base", base)))?
            .pop_if_empty()
            .extend(["api", "thread", self.id.thread(), self.endpoint_action()]);
        Ok(url)
    }

    /// Ids travel as strings.
    pub fn body(&self) -> Value {
        match &self.id {
            ItemId::Message { message_id, .. } => json!({
                "messageId": message_id.to_string(),
            }),
            ItemId::Comment {
                message_id,
                comment_id,
                ..
            } => json!({
                "messageId": message_id.to_string(),
                "commentId": comment_id.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteReceipt {
    pub status: u16,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("vote rejected with status {status}")]
    Rejected { status: u16 },

    #[error("transport failure: {message}")]
    Transport { message: String, retryable: bool },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl BackendError {
    /// Only failures that never reached the server may be retried; a status
    /// or a timeout means the toggle may already have been applied.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport { retryable, .. } => *retryable,
            BackendError::Rejected { .. } | BackendError::InvalidEndpoint(_) => false,
        }
    }
}

#[async_trait]
pub trait VoteBackend {
    async fn submit(&self, request: &VoteRequest) -> Result<VoteReceipt, BackendError>;
}

// Stub used when no API base is configured.
pub struct NullBackend;

#[async_trait]
impl VoteBackend for NullBackend {
    async fn submit(&self, _request: &VoteRequest) -> Result<VoteReceipt, BackendError> {
        Ok(VoteReceipt {
            status: 200,
            body: None,
        })
    }
}
