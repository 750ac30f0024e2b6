//! The data/cache façade: the single seam between the client core and the
//! network.
//!
//! Screens depend on [`DataFacade`] alone; HTTP, JSON, and credential storage
//! all live behind it.  Two contract points matter to callers:
//!
//! - Every mutation returns the **full updated entity**, never a diff.  The
//!   comment reconciliation in [`crate::comments`] exists because the
//!   protocol is "replace whole node", not "patch field".
//! - Failures are categorized as [`ApiError`] kinds so the UI and tests can
//!   branch on category rather than message text.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{
    Comment, Community, Conversation, DirectMessage, ImageRef, Post, PostDraft, ProfileUpdate,
    Session, User,
};

/// Categorized façade error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport/connectivity failure; retryable by user action.
    Network(String),
    /// The call reached the server but the API reported failure; the message
    /// is surfaced verbatim to the user.
    Server(String),
    /// The referenced entity no longer exists; callers re-fetch the parent
    /// list rather than silently ignoring it.
    NotFound(String),
    /// The request exceeded its budget; treated like `Network` by the UI.
    Timeout,
}

impl ApiError {
    /// Whether a plain user-initiated retry is a sensible response.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "network error: {msg}"),
            ApiError::Server(msg) => write!(f, "server error: {msg}"),
            ApiError::NotFound(what) => write!(f, "not found: {what}"),
            ApiError::Timeout => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

/// Run a façade call under the configured time budget, mapping expiry to
/// [`ApiError::Timeout`].
pub async fn with_timeout<T>(
    budget: Duration,
    fut: impl Future<Output = ApiResult<T>>,
) -> ApiResult<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout),
    }
}

/// Remote data operations the client core depends on.
///
/// All authenticated calls take the session token explicitly; there is no
/// ambient credential registry.
#[async_trait]
pub trait DataFacade: Send + Sync {
    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    async fn signup(&self, username: &str, password: &str) -> ApiResult<Session>;
    async fn login(&self, username: &str, password: &str) -> ApiResult<Session>;
    async fn logout(&self, token: &str) -> ApiResult<()>;

    // -----------------------------------------------------------------------
    // Users and profiles
    // -----------------------------------------------------------------------

    async fn fetch_user(&self, id: &str) -> ApiResult<User>;
    async fn update_profile(&self, token: &str, update: ProfileUpdate) -> ApiResult<User>;

    // -----------------------------------------------------------------------
    // Feed and posts
    // -----------------------------------------------------------------------

    /// Latest posts, newest first.  The feed is refreshed wholesale; there is
    /// no pagination cursor in this protocol.
    async fn fetch_feed(&self) -> ApiResult<Vec<Post>>;
    async fn fetch_post(&self, id: &str) -> ApiResult<Post>;
    async fn create_post(&self, token: &str, draft: PostDraft) -> ApiResult<Post>;
    async fn edit_post(&self, token: &str, id: &str, content: &str) -> ApiResult<Post>;
    async fn like_post(&self, token: &str, id: &str) -> ApiResult<Post>;
    async fn dislike_post(&self, token: &str, id: &str) -> ApiResult<Post>;
    async fn delete_post(&self, token: &str, id: &str) -> ApiResult<()>;

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    /// Full comment tree for a post, top-level comments in creation order.
    async fn fetch_comments(&self, post_id: &str) -> ApiResult<Vec<Comment>>;
    /// Create a top-level comment; returns the new root node.
    async fn create_comment(&self, token: &str, post_id: &str, content: &str)
        -> ApiResult<Comment>;
    /// Reply to a comment anywhere in the tree; returns the updated *parent*
    /// node with the new reply nested inside, ready to splice.
    async fn reply_to_comment(
        &self,
        token: &str,
        comment_id: &str,
        content: &str,
    ) -> ApiResult<Comment>;
    async fn edit_comment(&self, token: &str, id: &str, content: &str) -> ApiResult<Comment>;
    async fn like_comment(&self, token: &str, id: &str) -> ApiResult<Comment>;
    async fn dislike_comment(&self, token: &str, id: &str) -> ApiResult<Comment>;
    async fn delete_comment(&self, token: &str, id: &str) -> ApiResult<()>;
    async fn report_comment(&self, token: &str, id: &str) -> ApiResult<Comment>;

    // -----------------------------------------------------------------------
    // Communities
    // -----------------------------------------------------------------------

    async fn fetch_communities(&self) -> ApiResult<Vec<Community>>;
    async fn fetch_community(&self, id: &str) -> ApiResult<Community>;
    async fn create_community(
        &self,
        token: &str,
        name: &str,
        description: &str,
    ) -> ApiResult<Community>;
    /// Ask to join; the request sits in `pending` until moderated.
    async fn request_membership(&self, token: &str, community_id: &str) -> ApiResult<Community>;
    async fn approve_member(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community>;
    async fn reject_member(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community>;
    async fn leave_community(&self, token: &str, community_id: &str) -> ApiResult<Community>;
    async fn promote_admin(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community>;
    async fn demote_admin(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community>;

    // -----------------------------------------------------------------------
    // Direct messaging
    // -----------------------------------------------------------------------

    async fn fetch_conversations(&self, token: &str) -> ApiResult<Vec<Conversation>>;
    /// Messages in a conversation, oldest first.  Fetching marks the other
    /// party's messages as read.
    async fn fetch_messages(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> ApiResult<Vec<DirectMessage>>;
    async fn send_message(
        &self,
        token: &str,
        recipient_id: &str,
        content: &str,
    ) -> ApiResult<DirectMessage>;

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// Upload image bytes; returns the hosted reference.
    async fn upload_image(
        &self,
        token: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ApiResult<ImageRef>;
}
