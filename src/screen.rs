//! Screen-level state holders.
//!
//! Each visible screen owns exactly one actor task: commands arrive over an
//! mpsc channel, the actor owns the screen's [`StateCell`] as its single
//! writer, and observers watch the cell.  Fetches are raced — the actor
//! spawns them and applies completions through request tokens, so a
//! superseded fetch's result is discarded — while mutations are awaited
//! inline, which serializes them.  Reconciliations land in completion order:
//! when a mutation resolves, any fetch that completed during the await is
//! applied first, then the mutation's splice goes on top.
//!
//! Mutations follow one strategy everywhere: apply an optimistic local
//! overlay, await the server's full updated entity, and splice it in with
//! [`comments::replace_comment`] (or by-id replacement for posts).  On
//! failure the pre-overlay value is spliced back and the error surfaces as
//! `Failure` with data retained; on `NotFound` the whole view is re-fetched,
//! since the entity vanished concurrently.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::comments;
use crate::config::Config;
use crate::facade::{with_timeout, ApiError, ApiResult, DataFacade};
use crate::model::{Comment, Post, Session};
use crate::moderation::{self, ModerationPolicy};
use crate::state::{AsyncState, RequestToken, StateCell};
use crate::store::LocalStore;
use crate::{alog, logging};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Replace a post in a feed list by id (post equality is by id).
fn replace_post(list: &mut [Post], updated: Post) {
    if let Some(slot) = list.iter_mut().find(|p| p.id == updated.id) {
        *slot = updated;
    }
}

// ---------------------------------------------------------------------------
// Post screen
// ---------------------------------------------------------------------------

/// Everything the post screen renders: the post plus its comment tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PostView {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// Commands the post screen accepts.
#[derive(Debug)]
pub enum PostCommand {
    Load,
    Refresh,
    Retry,
    LikePost,
    DislikePost,
    SubmitComment { content: String },
    SubmitReply { parent_id: String, content: String },
    EditComment { id: String, content: String },
    LikeComment { id: String },
    DislikeComment { id: String },
    DeleteComment { id: String },
    ReportComment { id: String },
}

enum PostMsg {
    Command(PostCommand),
    FetchDone(RequestToken, ApiResult<PostView>),
}

/// Handle to a running post screen actor.  Dropping the handle (and any
/// clones of the command sender) stops the actor once in-flight work drains.
pub struct PostScreen {
    commands: mpsc::Sender<PostCommand>,
    state: watch::Receiver<AsyncState<PostView>>,
    policy: ModerationPolicy,
    viewer_id: String,
}

impl PostScreen {
    /// Spawn the actor for one post.  The screen owns its comment tree
    /// exclusively; all mutations flow through this single writer.
    pub fn spawn(
        facade: Arc<dyn DataFacade>,
        config: &Config,
        session: &Session,
        post_id: &str,
    ) -> PostScreen {
        let cell = StateCell::new();
        let state = cell.subscribe();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<PostCommand>(COMMAND_CHANNEL_CAPACITY);
        let (fetch_tx, fetch_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let mut actor = PostActor {
            facade,
            timeout: config.request_timeout,
            policy: config.moderation,
            token: session.token.clone(),
            viewer_id: session.user.id.clone(),
            post_id: post_id.to_string(),
            cell,
            fetch_tx,
            fetch_rx,
        };

        tokio::spawn(async move {
            loop {
                // Forward external commands and internal fetch completions
                // into one serialized stream; exit when the handle closes the
                // command channel.
                let msg = tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(cmd) => PostMsg::Command(cmd),
                        None => break,
                    },
                    Some((token, result)) = actor.fetch_rx.recv() => {
                        PostMsg::FetchDone(token, result)
                    }
                };
                actor.handle(msg).await;
            }
        });

        PostScreen {
            commands: cmd_tx,
            state,
            policy: config.moderation,
            viewer_id: session.user.id.clone(),
        }
    }

    /// Send a command to the actor.  Returns false if the actor is gone.
    pub async fn send(&self, command: PostCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<AsyncState<PostView>> {
        self.state.clone()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> AsyncState<PostView> {
        self.state.borrow().clone()
    }

    /// Whether the post itself should be obscured for this viewer.
    pub fn post_suppressed(&self) -> bool {
        self.snapshot()
            .data()
            .map(|view| self.policy.post_suppressed(&view.post, &self.viewer_id))
            .unwrap_or(false)
    }

    /// Ids of comments that should be obscured for this viewer, at any depth.
    pub fn suppressed_comments(&self) -> Vec<String> {
        self.snapshot()
            .data()
            .map(|view| {
                moderation::suppressed_comment_ids(&view.comments, &self.viewer_id, &self.policy)
            })
            .unwrap_or_default()
    }
}

struct PostActor {
    facade: Arc<dyn DataFacade>,
    timeout: Duration,
    policy: ModerationPolicy,
    token: String,
    viewer_id: String,
    post_id: String,
    cell: StateCell<PostView>,
    fetch_tx: mpsc::Sender<(RequestToken, ApiResult<PostView>)>,
    fetch_rx: mpsc::Receiver<(RequestToken, ApiResult<PostView>)>,
}

impl PostActor {
    async fn handle(&mut self, msg: PostMsg) {
        match msg {
            PostMsg::Command(command) => self.handle_command(command).await,
            PostMsg::FetchDone(token, result) => {
                self.apply_fetch(token, result);
            }
        }
    }

    async fn handle_command(&mut self, command: PostCommand) {
        match command {
            PostCommand::Load | PostCommand::Refresh | PostCommand::Retry => self.start_fetch(),
            PostCommand::LikePost => self.vote_post(false).await,
            PostCommand::DislikePost => self.vote_post(true).await,
            PostCommand::SubmitComment { content } => self.submit_comment(&content).await,
            PostCommand::SubmitReply { parent_id, content } => {
                self.submit_reply(&parent_id, &content).await
            }
            PostCommand::EditComment { id, content } => self.edit_comment(&id, &content).await,
            PostCommand::LikeComment { id } => self.vote_comment(&id, false).await,
            PostCommand::DislikeComment { id } => self.vote_comment(&id, true).await,
            PostCommand::DeleteComment { id } => self.delete_comment(&id).await,
            PostCommand::ReportComment { id } => self.report_comment(&id).await,
        }
    }

    fn apply_fetch(&mut self, token: RequestToken, result: ApiResult<PostView>) -> bool {
        let applied = self.cell.complete(token, result);
        if !applied {
            alog!(
                "post {}: discarding superseded fetch",
                logging::ent_id(&self.post_id)
            );
        }
        applied
    }

    /// Apply fetch completions that were queued while a mutation was awaited
    /// inline, so reconciliations land in completion order.  Returns true if
    /// any fetch result was applied.
    fn apply_pending_fetches(&mut self) -> bool {
        let mut applied = false;
        while let Ok((token, result)) = self.fetch_rx.try_recv() {
            applied |= self.apply_fetch(token, result);
        }
        applied
    }

    /// Kick off a fetch of the post and its comment tree.  The completion is
    /// delivered as a message so a newer request can supersede it.
    fn start_fetch(&mut self) {
        let request = self.cell.begin();
        let tx = self.fetch_tx.clone();
        let facade = self.facade.clone();
        let timeout = self.timeout;
        let post_id = self.post_id.clone();
        tokio::spawn(async move {
            let result = with_timeout(timeout, async {
                let post = facade.fetch_post(&post_id).await?;
                let comments = facade.fetch_comments(&post_id).await?;
                Ok(PostView { post, comments })
            })
            .await;
            let _ = tx.send((request, result)).await;
        });
    }

    /// Like/dislike the post: optimistic toggle, then reconcile with the
    /// server's full updated post.
    async fn vote_post(&mut self, dislike: bool) {
        let Some(before) = self.cell.snapshot().into_data().map(|view| view.post) else {
            return;
        };
        let toggled = if dislike {
            before.clone().with_dislike_toggled(&self.viewer_id)
        } else {
            before.clone().with_like_toggled(&self.viewer_id)
        };
        self.cell.mutate_data(|view| view.post = toggled.clone());

        let call = if dislike {
            self.facade.dislike_post(&self.token, &self.post_id)
        } else {
            self.facade.like_post(&self.token, &self.post_id)
        };
        let outcome = with_timeout(self.timeout, call).await;
        let refreshed = self.apply_pending_fetches();
        match outcome {
            Ok(post) => {
                self.cell.mutate_data(|view| view.post = post.clone());
            }
            Err(ApiError::NotFound(_)) => self.start_fetch(),
            Err(error) => {
                // A fetch applied above already brought authoritative state;
                // only revert the overlay when there was none.
                if !refreshed {
                    self.cell.mutate_data(|view| view.post = before.clone());
                }
                self.cell.fail_keeping_data(error);
            }
        }
    }

    /// Like/dislike a comment node, wherever it lives in the nesting.
    async fn vote_comment(&mut self, id: &str, dislike: bool) {
        let Some(original) = self
            .cell
            .snapshot()
            .into_data()
            .and_then(|view| comments::find_comment(&view.comments, id).cloned())
        else {
            // Not in the local tree: our copy is stale, reload.
            self.start_fetch();
            return;
        };
        let toggled = if dislike {
            original.clone().with_dislike_toggled(&self.viewer_id)
        } else {
            original.clone().with_like_toggled(&self.viewer_id)
        };
        self.splice(toggled);

        let call = if dislike {
            self.facade.dislike_comment(&self.token, id)
        } else {
            self.facade.like_comment(&self.token, id)
        };
        let outcome = with_timeout(self.timeout, call).await;
        let refreshed = self.apply_pending_fetches();
        match outcome {
            Ok(node) => self.splice(node),
            Err(ApiError::NotFound(_)) => self.start_fetch(),
            Err(error) => {
                if !refreshed {
                    self.splice(original);
                }
                self.cell.fail_keeping_data(error);
            }
        }
    }

    async fn submit_comment(&mut self, content: &str) {
        let call = self.facade.create_comment(&self.token, &self.post_id, content);
        let outcome = with_timeout(self.timeout, call).await;
        self.apply_pending_fetches();
        match outcome {
            Ok(node) => {
                self.cell.mutate_data(|view| {
                    // A fetch applied just above may already carry the node.
                    if comments::find_comment(&view.comments, &node.id).is_none() {
                        view.post.comment_ids.push(node.id.clone());
                        view.comments.push(node.clone());
                    }
                });
            }
            Err(ApiError::NotFound(_)) => self.start_fetch(),
            Err(error) => self.cell.fail_keeping_data(error),
        }
    }

    /// The server returns the updated parent with the reply nested inside;
    /// splicing the parent covers the new node.
    async fn submit_reply(&mut self, parent_id: &str, content: &str) {
        let call = self.facade.reply_to_comment(&self.token, parent_id, content);
        let outcome = with_timeout(self.timeout, call).await;
        self.apply_pending_fetches();
        match outcome {
            Ok(parent) => self.splice(parent),
            Err(ApiError::NotFound(_)) => self.start_fetch(),
            Err(error) => self.cell.fail_keeping_data(error),
        }
    }

    async fn edit_comment(&mut self, id: &str, content: &str) {
        let call = self.facade.edit_comment(&self.token, id, content);
        let outcome = with_timeout(self.timeout, call).await;
        self.apply_pending_fetches();
        match outcome {
            Ok(node) => self.splice(node),
            Err(ApiError::NotFound(_)) => self.start_fetch(),
            Err(error) => self.cell.fail_keeping_data(error),
        }
    }

    async fn delete_comment(&mut self, id: &str) {
        let Some(before) = self.cell.snapshot().into_data().map(|view| view.comments) else {
            return;
        };
        // Optimistic removal; the snapshot above is the revert point.
        self.cell.mutate_data(|view| {
            view.comments = comments::remove_comment(mem::take(&mut view.comments), id);
            view.post.comment_ids.retain(|cid| cid != id);
        });

        let call = self.facade.delete_comment(&self.token, id);
        let outcome = with_timeout(self.timeout, call).await;
        let refreshed = self.apply_pending_fetches();
        match outcome {
            Ok(()) => {
                // Re-assert the removal over any fetch applied above; it may
                // have been issued before the delete landed.
                self.cell.mutate_data(|view| {
                    view.comments = comments::remove_comment(mem::take(&mut view.comments), id);
                    view.post.comment_ids.retain(|cid| cid != id);
                });
                self.refresh_bad_flag();
            }
            // Already gone server-side, but the tree may have shifted under
            // us in other ways too, so re-fetch.
            Err(ApiError::NotFound(_)) => self.start_fetch(),
            Err(error) => {
                if !refreshed {
                    self.cell.mutate_data(|view| view.comments = before.clone());
                }
                self.cell.fail_keeping_data(error);
            }
        }
    }

    async fn report_comment(&mut self, id: &str) {
        let call = self.facade.report_comment(&self.token, id);
        let outcome = with_timeout(self.timeout, call).await;
        self.apply_pending_fetches();
        match outcome {
            Ok(node) => {
                self.splice(node);
                self.refresh_bad_flag();
            }
            Err(ApiError::NotFound(_)) => self.start_fetch(),
            Err(error) => self.cell.fail_keeping_data(error),
        }
    }

    /// Splice a server-returned node into the tree, rebuilding only its
    /// ancestor chain.
    fn splice(&self, node: Comment) {
        self.cell.mutate_data(|view| {
            view.comments = comments::replace_comment(mem::take(&mut view.comments), node.clone());
        });
    }

    /// Mirror the server's `has_bad_comments` recomputation locally so the
    /// post header updates without another round-trip.
    fn refresh_bad_flag(&self) {
        let policy = self.policy;
        self.cell.mutate_data(|view| {
            view.post.has_bad_comments = policy.tree_has_bad_comments(&view.comments);
        });
    }
}

// ---------------------------------------------------------------------------
// Feed screen
// ---------------------------------------------------------------------------

/// Commands the feed screen accepts.
#[derive(Debug)]
pub enum FeedCommand {
    Load,
    Refresh,
    Retry,
    LikePost { id: String },
    DislikePost { id: String },
}

enum FeedMsg {
    Command(FeedCommand),
    FetchDone(RequestToken, ApiResult<Vec<Post>>),
}

/// Handle to a running feed screen actor.
pub struct FeedScreen {
    commands: mpsc::Sender<FeedCommand>,
    state: watch::Receiver<AsyncState<Vec<Post>>>,
}

impl FeedScreen {
    /// Spawn the feed actor.  When a local store is supplied, the first load
    /// seeds `Loading` with the cached feed for display continuity and every
    /// successful fetch refreshes the cache.
    pub fn spawn(
        facade: Arc<dyn DataFacade>,
        config: &Config,
        session: &Session,
        cache: Option<Arc<std::sync::Mutex<LocalStore>>>,
    ) -> FeedScreen {
        let cell = StateCell::new();
        let state = cell.subscribe();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<FeedCommand>(COMMAND_CHANNEL_CAPACITY);
        let (fetch_tx, fetch_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let mut actor = FeedActor {
            facade,
            timeout: config.request_timeout,
            token: session.token.clone(),
            viewer_id: session.user.id.clone(),
            cell,
            cache,
            fetch_tx,
            fetch_rx,
        };

        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(cmd) => FeedMsg::Command(cmd),
                        None => break,
                    },
                    Some((token, result)) = actor.fetch_rx.recv() => {
                        FeedMsg::FetchDone(token, result)
                    }
                };
                actor.handle(msg).await;
            }
        });

        FeedScreen {
            commands: cmd_tx,
            state,
        }
    }

    /// Send a command to the actor.  Returns false if the actor is gone.
    pub async fn send(&self, command: FeedCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<AsyncState<Vec<Post>>> {
        self.state.clone()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> AsyncState<Vec<Post>> {
        self.state.borrow().clone()
    }
}

struct FeedActor {
    facade: Arc<dyn DataFacade>,
    timeout: Duration,
    token: String,
    viewer_id: String,
    cell: StateCell<Vec<Post>>,
    cache: Option<Arc<std::sync::Mutex<LocalStore>>>,
    fetch_tx: mpsc::Sender<(RequestToken, ApiResult<Vec<Post>>)>,
    fetch_rx: mpsc::Receiver<(RequestToken, ApiResult<Vec<Post>>)>,
}

impl FeedActor {
    async fn handle(&mut self, msg: FeedMsg) {
        match msg {
            FeedMsg::Command(command) => self.handle_command(command).await,
            FeedMsg::FetchDone(token, result) => {
                self.apply_fetch(token, result);
            }
        }
    }

    async fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Load => {
                // Cold start: show the cached feed while the fetch runs.
                if let Some(stale) = self.read_cache().filter(|posts| !posts.is_empty()) {
                    let request = self.cell.begin_with_stale(stale);
                    self.spawn_fetch(request);
                } else {
                    let request = self.cell.begin();
                    self.spawn_fetch(request);
                }
            }
            FeedCommand::Refresh | FeedCommand::Retry => {
                let request = self.cell.begin();
                self.spawn_fetch(request);
            }
            FeedCommand::LikePost { id } => self.vote_post(&id, false).await,
            FeedCommand::DislikePost { id } => self.vote_post(&id, true).await,
        }
    }

    fn apply_fetch(&mut self, token: RequestToken, result: ApiResult<Vec<Post>>) -> bool {
        let fetched = result.as_ref().map(Vec::len).ok();
        if self.cell.complete(token, result) {
            if let Some(count) = fetched {
                alog!("feed: fetched {} post(s)", count);
                self.write_cache();
            }
            true
        } else {
            alog!("feed: discarding superseded fetch");
            false
        }
    }

    /// Apply fetch completions queued while a mutation was awaited inline.
    /// Returns true if any fetch result was applied.
    fn apply_pending_fetches(&mut self) -> bool {
        let mut applied = false;
        while let Ok((token, result)) = self.fetch_rx.try_recv() {
            applied |= self.apply_fetch(token, result);
        }
        applied
    }

    fn spawn_fetch(&self, request: RequestToken) {
        let tx = self.fetch_tx.clone();
        let facade = self.facade.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = with_timeout(timeout, facade.fetch_feed()).await;
            let _ = tx.send((request, result)).await;
        });
    }

    async fn vote_post(&mut self, id: &str, dislike: bool) {
        let Some(before) = self
            .cell
            .snapshot()
            .into_data()
            .and_then(|posts| posts.into_iter().find(|p| p.id == id))
        else {
            self.start_reload();
            return;
        };
        let toggled = if dislike {
            before.clone().with_dislike_toggled(&self.viewer_id)
        } else {
            before.clone().with_like_toggled(&self.viewer_id)
        };
        self.cell
            .mutate_data(|posts| replace_post(posts, toggled.clone()));

        let call = if dislike {
            self.facade.dislike_post(&self.token, id)
        } else {
            self.facade.like_post(&self.token, id)
        };
        let outcome = with_timeout(self.timeout, call).await;
        let refreshed = self.apply_pending_fetches();
        match outcome {
            Ok(post) => {
                self.cell.mutate_data(|posts| replace_post(posts, post.clone()));
            }
            Err(ApiError::NotFound(_)) => self.start_reload(),
            Err(error) => {
                if !refreshed {
                    self.cell
                        .mutate_data(|posts| replace_post(posts, before.clone()));
                }
                self.cell.fail_keeping_data(error);
            }
        }
    }

    fn start_reload(&self) {
        let request = self.cell.begin();
        self.spawn_fetch(request);
    }

    fn read_cache(&self) -> Option<Vec<Post>> {
        let cache = self.cache.as_ref()?;
        let store = cache.lock().ok()?;
        match store.load_cached_feed() {
            Ok(posts) => Some(posts),
            Err(e) => {
                alog!("feed cache read failed: {}", e);
                None
            }
        }
    }

    fn write_cache(&self) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Some(posts) = self.cell.snapshot().into_data() else {
            return;
        };
        if let Ok(store) = cache.lock() {
            if let Err(e) = store.cache_feed(&posts) {
                alog!("feed cache write failed: {}", e);
            }
        }
    }
}
