//! In-memory implementation of the data façade.
//!
//! `MemoryFacade` is the crate's executable model of the server contract:
//! every mutation returns the full updated entity, ids are opaque strings
//! minted here (never by callers), replies nest inside their parent node, and
//! the `flagged_bad` / `has_bad_comments` assertions are recomputed on every
//! comment mutation.  Integration tests and screen actors run against it
//! directly; a production transport implements the same trait.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::alog;
use crate::comments;
use crate::config::REPORT_FLAG_LIMIT;
use crate::facade::{ApiError, ApiResult, DataFacade};
use crate::logging;
use crate::model::{
    Comment, Community, Conversation, DirectMessage, ImageRef, PendingMember, Post, PostDraft,
    ProfileUpdate, Session, User,
};
use crate::moderation::ModerationPolicy;

/// Mint a server-style opaque id: entity prefix plus random hex.
fn new_id(prefix: &str) -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}_{}", hex::encode(bytes))
}

/// Current time truncated to wire precision (milliseconds), so values
/// round-trip exactly through the wire format.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    /// username -> (password, user id)
    credentials: HashMap<String, (String, String)>,
    /// token -> user id
    sessions: HashMap<String, String>,
    posts: HashMap<String, Post>,
    /// Post ids, newest first.
    feed: Vec<String>,
    /// post id -> top-level comment tree
    comments: HashMap<String, Vec<Comment>>,
    communities: HashMap<String, Community>,
    conversations: HashMap<String, Conversation>,
    /// conversation id -> messages, oldest first
    messages: HashMap<String, Vec<DirectMessage>>,
    /// comment id -> distinct reporter ids
    comment_reports: HashMap<String, HashSet<String>>,
    /// url -> (bytes, content type)
    images: HashMap<String, (Vec<u8>, String)>,
}

/// In-memory façade state.  Interior mutability behind a std mutex; no await
/// point ever holds the lock.
pub struct MemoryFacade {
    inner: std::sync::Mutex<Inner>,
    policy: ModerationPolicy,
}

impl Default for MemoryFacade {
    fn default() -> Self {
        Self::new(ModerationPolicy::default())
    }
}

impl MemoryFacade {
    pub fn new(policy: ModerationPolicy) -> Self {
        Self {
            inner: std::sync::Mutex::new(Inner::default()),
            policy,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only happens if a panic escaped a lock scope; all lock
        // scopes here are short and panic-free.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn auth(&self, token: &str) -> ApiResult<String> {
        self.sessions
            .get(token)
            .cloned()
            .ok_or_else(|| ApiError::Server("not signed in".to_string()))
    }

    fn post(&self, id: &str) -> ApiResult<&Post> {
        self.posts
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("post {id}")))
    }

    fn community(&self, id: &str) -> ApiResult<&Community> {
        self.communities
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("community {id}")))
    }

    /// Which post's tree contains the comment, if any.
    fn post_of_comment(&self, comment_id: &str) -> ApiResult<String> {
        self.comments
            .iter()
            .find(|(_, tree)| comments::find_comment(tree, comment_id).is_some())
            .map(|(post_id, _)| post_id.clone())
            .ok_or_else(|| ApiError::NotFound(format!("comment {comment_id}")))
    }

    /// Recompute the post's `has_bad_comments` flag from its current tree.
    fn refresh_bad_comments(&mut self, post_id: &str, policy: &ModerationPolicy) {
        let has_bad = self
            .comments
            .get(post_id)
            .map(|tree| policy.tree_has_bad_comments(tree))
            .unwrap_or(false);
        if let Some(post) = self.posts.get_mut(post_id) {
            if post.has_bad_comments != has_bad {
                alog!(
                    "post {} has_bad_comments -> {}",
                    logging::ent_id(post_id),
                    has_bad
                );
            }
            post.has_bad_comments = has_bad;
        }
    }

    /// Replace one node in a post's tree and return the spliced node.
    fn splice_comment(&mut self, post_id: &str, updated: Comment) -> Comment {
        let tree = self.comments.remove(post_id).unwrap_or_default();
        let tree = comments::replace_comment(tree, updated.clone());
        self.comments.insert(post_id.to_string(), tree);
        updated
    }

    fn conversation_between(&self, a: &str, b: &str) -> Option<String> {
        self.conversations
            .values()
            .find(|c| c.involves(a) && c.involves(b))
            .map(|c| c.id.clone())
    }
}

#[async_trait]
impl DataFacade for MemoryFacade {
    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    async fn signup(&self, username: &str, password: &str) -> ApiResult<Session> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Server(
                "username and password must not be empty".to_string(),
            ));
        }
        let mut inner = self.lock();
        if inner.credentials.contains_key(username) {
            return Err(ApiError::Server("username already taken".to_string()));
        }
        let user = User {
            id: new_id("user"),
            username: username.to_string(),
            display_name: None,
            bio: None,
            avatar: None,
            created_at: now(),
        };
        let token = new_id("session");
        inner
            .credentials
            .insert(username.to_string(), (password.to_string(), user.id.clone()));
        inner.sessions.insert(token.clone(), user.id.clone());
        inner.users.insert(user.id.clone(), user.clone());
        alog!("signup: {} as {}", username, logging::user_id(&user.id));
        Ok(Session { token, user })
    }

    async fn login(&self, username: &str, password: &str) -> ApiResult<Session> {
        let mut inner = self.lock();
        let user_id = match inner.credentials.get(username) {
            Some((stored, user_id)) if stored == password => user_id.clone(),
            _ => {
                return Err(ApiError::Server(
                    "invalid username or password".to_string(),
                ))
            }
        };
        let user = inner
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))?;
        let token = new_id("session");
        inner.sessions.insert(token.clone(), user_id);
        alog!("login: {}", logging::user_id(&user.id));
        Ok(Session { token, user })
    }

    async fn logout(&self, token: &str) -> ApiResult<()> {
        // Idempotent: logging out an expired session is not an error.
        self.lock().sessions.remove(token);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users and profiles
    // -----------------------------------------------------------------------

    async fn fetch_user(&self, id: &str) -> ApiResult<User> {
        self.lock()
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("user {id}")))
    }

    async fn update_profile(&self, token: &str, update: ProfileUpdate) -> ApiResult<User> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))?;
        if let Some(display_name) = update.display_name {
            user.display_name = Some(display_name);
        }
        if let Some(bio) = update.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar) = update.avatar {
            user.avatar = Some(avatar);
        }
        Ok(user.clone())
    }

    // -----------------------------------------------------------------------
    // Feed and posts
    // -----------------------------------------------------------------------

    async fn fetch_feed(&self) -> ApiResult<Vec<Post>> {
        let inner = self.lock();
        Ok(inner
            .feed
            .iter()
            .filter_map(|id| inner.posts.get(id).cloned())
            .collect())
    }

    async fn fetch_post(&self, id: &str) -> ApiResult<Post> {
        self.lock().post(id).cloned()
    }

    async fn create_post(&self, token: &str, draft: PostDraft) -> ApiResult<Post> {
        let mut inner = self.lock();
        let author_id = inner.auth(token)?;
        if let Some(community_id) = &draft.community_id {
            let community = inner.community(community_id)?;
            if !community.is_member(&author_id) && community.manager_id != author_id {
                return Err(ApiError::Server(
                    "only members can post in a community".to_string(),
                ));
            }
        }
        let post = Post {
            id: new_id("post"),
            author_id,
            content: draft.content,
            images: draft.images,
            liked_by: HashSet::new(),
            disliked_by: HashSet::new(),
            comment_ids: Vec::new(),
            has_bad_comments: false,
            community_id: draft.community_id,
            created_at: now(),
            edited_at: None,
        };
        inner.feed.insert(0, post.id.clone());
        inner.comments.insert(post.id.clone(), Vec::new());
        inner.posts.insert(post.id.clone(), post.clone());
        alog!("post created: {}", logging::ent_id(&post.id));
        Ok(post)
    }

    async fn edit_post(&self, token: &str, id: &str, content: &str) -> ApiResult<Post> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post = inner
            .posts
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("post {id}")))?;
        if post.author_id != user_id {
            return Err(ApiError::Server("only the author can edit a post".to_string()));
        }
        post.content = content.to_string();
        post.edited_at = Some(now());
        Ok(post.clone())
    }

    async fn like_post(&self, token: &str, id: &str) -> ApiResult<Post> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post = inner.post(id)?.clone().with_like_toggled(&user_id);
        inner.posts.insert(id.to_string(), post.clone());
        Ok(post)
    }

    async fn dislike_post(&self, token: &str, id: &str) -> ApiResult<Post> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post = inner.post(id)?.clone().with_dislike_toggled(&user_id);
        inner.posts.insert(id.to_string(), post.clone());
        Ok(post)
    }

    async fn delete_post(&self, token: &str, id: &str) -> ApiResult<()> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        if inner.post(id)?.author_id != user_id {
            return Err(ApiError::Server(
                "only the author can delete a post".to_string(),
            ));
        }
        inner.posts.remove(id);
        inner.comments.remove(id);
        inner.feed.retain(|pid| pid != id);
        alog!("post deleted: {}", logging::ent_id(id));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    async fn fetch_comments(&self, post_id: &str) -> ApiResult<Vec<Comment>> {
        let inner = self.lock();
        inner.post(post_id)?;
        Ok(inner.comments.get(post_id).cloned().unwrap_or_default())
    }

    async fn create_comment(
        &self,
        token: &str,
        post_id: &str,
        content: &str,
    ) -> ApiResult<Comment> {
        let mut inner = self.lock();
        let author_id = inner.auth(token)?;
        inner.post(post_id)?;
        let comment = Comment {
            id: new_id("comment"),
            post_id: post_id.to_string(),
            author_id,
            content: content.to_string(),
            liked_by: HashSet::new(),
            disliked_by: HashSet::new(),
            replies: Vec::new(),
            replied_to_id: None,
            flagged_bad: false,
            created_at: now(),
            edited_at: None,
        };
        inner
            .comments
            .entry(post_id.to_string())
            .or_default()
            .push(comment.clone());
        if let Some(post) = inner.posts.get_mut(post_id) {
            post.comment_ids.push(comment.id.clone());
        }
        Ok(comment)
    }

    async fn reply_to_comment(
        &self,
        token: &str,
        comment_id: &str,
        content: &str,
    ) -> ApiResult<Comment> {
        let mut inner = self.lock();
        let author_id = inner.auth(token)?;
        let post_id = inner.post_of_comment(comment_id)?;
        let tree = inner.comments.get(&post_id).cloned().unwrap_or_default();
        let mut parent = comments::find_comment(&tree, comment_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("comment {comment_id}")))?;
        parent.replies.push(Comment {
            id: new_id("comment"),
            post_id: post_id.clone(),
            author_id,
            content: content.to_string(),
            liked_by: HashSet::new(),
            disliked_by: HashSet::new(),
            replies: Vec::new(),
            replied_to_id: Some(comment_id.to_string()),
            flagged_bad: false,
            created_at: now(),
            edited_at: None,
        });
        Ok(inner.splice_comment(&post_id, parent))
    }

    async fn edit_comment(&self, token: &str, id: &str, content: &str) -> ApiResult<Comment> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post_id = inner.post_of_comment(id)?;
        let tree = inner.comments.get(&post_id).cloned().unwrap_or_default();
        let mut node = comments::find_comment(&tree, id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("comment {id}")))?;
        if node.author_id != user_id {
            return Err(ApiError::Server(
                "only the author can edit a comment".to_string(),
            ));
        }
        node.content = content.to_string();
        node.edited_at = Some(now());
        Ok(inner.splice_comment(&post_id, node))
    }

    async fn like_comment(&self, token: &str, id: &str) -> ApiResult<Comment> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post_id = inner.post_of_comment(id)?;
        let tree = inner.comments.get(&post_id).cloned().unwrap_or_default();
        let node = comments::find_comment(&tree, id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("comment {id}")))?
            .with_like_toggled(&user_id);
        let node = inner.splice_comment(&post_id, node);
        inner.refresh_bad_comments(&post_id, &self.policy);
        Ok(node)
    }

    async fn dislike_comment(&self, token: &str, id: &str) -> ApiResult<Comment> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post_id = inner.post_of_comment(id)?;
        let tree = inner.comments.get(&post_id).cloned().unwrap_or_default();
        let node = comments::find_comment(&tree, id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("comment {id}")))?
            .with_dislike_toggled(&user_id);
        let node = inner.splice_comment(&post_id, node);
        inner.refresh_bad_comments(&post_id, &self.policy);
        Ok(node)
    }

    async fn delete_comment(&self, token: &str, id: &str) -> ApiResult<()> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post_id = inner.post_of_comment(id)?;
        let tree = inner.comments.remove(&post_id).unwrap_or_default();
        let author_ok = comments::find_comment(&tree, id)
            .map(|node| node.author_id == user_id)
            .unwrap_or(false);
        if !author_ok {
            inner.comments.insert(post_id, tree);
            return Err(ApiError::Server(
                "only the author can delete a comment".to_string(),
            ));
        }
        let tree = comments::remove_comment(tree, id);
        inner.comments.insert(post_id.clone(), tree);
        if let Some(post) = inner.posts.get_mut(&post_id) {
            post.comment_ids.retain(|cid| cid != id);
        }
        inner.refresh_bad_comments(&post_id, &self.policy);
        alog!("comment deleted: {}", logging::ent_id(id));
        Ok(())
    }

    async fn report_comment(&self, token: &str, id: &str) -> ApiResult<Comment> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let post_id = inner.post_of_comment(id)?;
        let tree = inner.comments.get(&post_id).cloned().unwrap_or_default();
        let mut node = comments::find_comment(&tree, id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("comment {id}")))?;
        if node.author_id == user_id {
            return Err(ApiError::Server(
                "cannot report your own comment".to_string(),
            ));
        }
        let reports = inner.comment_reports.entry(id.to_string()).or_default();
        reports.insert(user_id);
        if reports.len() >= REPORT_FLAG_LIMIT && !node.flagged_bad {
            node.flagged_bad = true;
            alog!("comment flagged bad: {}", logging::ent_id(id));
        }
        let node = inner.splice_comment(&post_id, node);
        inner.refresh_bad_comments(&post_id, &self.policy);
        Ok(node)
    }

    // -----------------------------------------------------------------------
    // Communities
    // -----------------------------------------------------------------------

    async fn fetch_communities(&self) -> ApiResult<Vec<Community>> {
        let mut all: Vec<Community> = self.lock().communities.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn fetch_community(&self, id: &str) -> ApiResult<Community> {
        self.lock().community(id).cloned()
    }

    async fn create_community(
        &self,
        token: &str,
        name: &str,
        description: &str,
    ) -> ApiResult<Community> {
        if name.trim().is_empty() {
            return Err(ApiError::Server(
                "community name must not be empty".to_string(),
            ));
        }
        let mut inner = self.lock();
        let manager_id = inner.auth(token)?;
        let community = Community {
            id: new_id("community"),
            name: name.to_string(),
            description: description.to_string(),
            avatar: None,
            manager_id,
            member_ids: HashSet::new(),
            admin_ids: HashSet::new(),
            pending: Vec::new(),
            created_at: now(),
        };
        inner
            .communities
            .insert(community.id.clone(), community.clone());
        alog!("community created: {}", logging::ent_id(&community.id));
        Ok(community)
    }

    async fn request_membership(&self, token: &str, community_id: &str) -> ApiResult<Community> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let community = inner.community(community_id)?;
        if community.is_member(&user_id) || community.manager_id == user_id {
            return Err(ApiError::Server("already a member".to_string()));
        }
        if community.has_pending_request(&user_id) {
            return Err(ApiError::Server(
                "membership request already pending".to_string(),
            ));
        }
        let community = inner
            .communities
            .get_mut(community_id)
            .ok_or_else(|| ApiError::NotFound(format!("community {community_id}")))?;
        community.pending.push(PendingMember {
            user_id,
            requested_at: now(),
        });
        Ok(community.clone())
    }

    async fn approve_member(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community> {
        let mut inner = self.lock();
        let moderator = inner.auth(token)?;
        let community = inner.community(community_id)?;
        if !community.can_moderate(&moderator) {
            return Err(ApiError::Server(
                "only admins can moderate membership".to_string(),
            ));
        }
        if !community.has_pending_request(user_id) {
            return Err(ApiError::NotFound(format!("pending request for {user_id}")));
        }
        let community = inner
            .communities
            .get_mut(community_id)
            .ok_or_else(|| ApiError::NotFound(format!("community {community_id}")))?;
        community.pending.retain(|p| p.user_id != user_id);
        community.member_ids.insert(user_id.to_string());
        alog!(
            "community {}: approved {}",
            logging::ent_id(community_id),
            logging::user_id(user_id)
        );
        Ok(community.clone())
    }

    async fn reject_member(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community> {
        let mut inner = self.lock();
        let moderator = inner.auth(token)?;
        let community = inner.community(community_id)?;
        if !community.can_moderate(&moderator) {
            return Err(ApiError::Server(
                "only admins can moderate membership".to_string(),
            ));
        }
        if !community.has_pending_request(user_id) {
            return Err(ApiError::NotFound(format!("pending request for {user_id}")));
        }
        let community = inner
            .communities
            .get_mut(community_id)
            .ok_or_else(|| ApiError::NotFound(format!("community {community_id}")))?;
        community.pending.retain(|p| p.user_id != user_id);
        Ok(community.clone())
    }

    async fn leave_community(&self, token: &str, community_id: &str) -> ApiResult<Community> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let community = inner.community(community_id)?;
        if community.manager_id == user_id {
            return Err(ApiError::Server(
                "the manager cannot leave their community".to_string(),
            ));
        }
        if !community.is_member(&user_id) {
            return Err(ApiError::Server("not a member".to_string()));
        }
        let community = inner
            .communities
            .get_mut(community_id)
            .ok_or_else(|| ApiError::NotFound(format!("community {community_id}")))?;
        community.member_ids.remove(&user_id);
        community.admin_ids.remove(&user_id);
        Ok(community.clone())
    }

    async fn promote_admin(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community> {
        let mut inner = self.lock();
        let caller = inner.auth(token)?;
        let community = inner.community(community_id)?;
        if community.manager_id != caller {
            return Err(ApiError::Server(
                "only the manager can promote admins".to_string(),
            ));
        }
        if !community.member_ids.contains(user_id) {
            return Err(ApiError::Server("not a member".to_string()));
        }
        let community = inner
            .communities
            .get_mut(community_id)
            .ok_or_else(|| ApiError::NotFound(format!("community {community_id}")))?;
        community.admin_ids.insert(user_id.to_string());
        Ok(community.clone())
    }

    async fn demote_admin(
        &self,
        token: &str,
        community_id: &str,
        user_id: &str,
    ) -> ApiResult<Community> {
        let mut inner = self.lock();
        let caller = inner.auth(token)?;
        let community = inner.community(community_id)?;
        if community.manager_id != caller {
            return Err(ApiError::Server(
                "only the manager can demote admins".to_string(),
            ));
        }
        let community = inner
            .communities
            .get_mut(community_id)
            .ok_or_else(|| ApiError::NotFound(format!("community {community_id}")))?;
        community.admin_ids.remove(user_id);
        Ok(community.clone())
    }

    // -----------------------------------------------------------------------
    // Direct messaging
    // -----------------------------------------------------------------------

    async fn fetch_conversations(&self, token: &str) -> ApiResult<Vec<Conversation>> {
        let inner = self.lock();
        let user_id = inner.auth(token)?;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.involves(&user_id))
            .cloned()
            .map(|mut c| {
                c.unread_count = inner
                    .messages
                    .get(&c.id)
                    .map(|msgs| {
                        msgs.iter()
                            .filter(|m| !m.read && m.sender_id != user_id)
                            .count() as u32
                    })
                    .unwrap_or(0);
                c
            })
            .collect();
        conversations.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(conversations)
    }

    async fn fetch_messages(
        &self,
        token: &str,
        conversation_id: &str,
    ) -> ApiResult<Vec<DirectMessage>> {
        let mut inner = self.lock();
        let user_id = inner.auth(token)?;
        let conversation = inner
            .conversations
            .get(conversation_id)
            .ok_or_else(|| ApiError::NotFound(format!("conversation {conversation_id}")))?;
        if !conversation.involves(&user_id) {
            return Err(ApiError::Server(
                "not a participant in this conversation".to_string(),
            ));
        }
        let messages = inner
            .messages
            .get_mut(conversation_id)
            .map(|msgs| {
                // Fetching marks the other party's messages as read.
                for msg in msgs.iter_mut() {
                    if msg.sender_id != user_id {
                        msg.read = true;
                    }
                }
                msgs.clone()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn send_message(
        &self,
        token: &str,
        recipient_id: &str,
        content: &str,
    ) -> ApiResult<DirectMessage> {
        let mut inner = self.lock();
        let sender_id = inner.auth(token)?;
        if !inner.users.contains_key(recipient_id) {
            return Err(ApiError::NotFound(format!("user {recipient_id}")));
        }
        if sender_id == recipient_id {
            return Err(ApiError::Server(
                "cannot message yourself".to_string(),
            ));
        }
        let conversation_id = match inner.conversation_between(&sender_id, recipient_id) {
            Some(id) => id,
            None => {
                let conversation = Conversation {
                    id: new_id("conv"),
                    participant_ids: [sender_id.clone(), recipient_id.to_string()],
                    last_message: None,
                    last_activity: None,
                    unread_count: 0,
                };
                let id = conversation.id.clone();
                inner.conversations.insert(id.clone(), conversation);
                id
            }
        };
        let message = DirectMessage {
            id: new_id("dm"),
            conversation_id: conversation_id.clone(),
            sender_id,
            content: content.to_string(),
            sent_at: now(),
            read: false,
        };
        inner
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(message.clone());
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.last_message = Some(message.content.clone());
            conversation.last_activity = Some(message.sent_at);
        }
        Ok(message)
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    async fn upload_image(
        &self,
        token: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ApiResult<ImageRef> {
        let mut inner = self.lock();
        inner.auth(token)?;
        if bytes.is_empty() {
            return Err(ApiError::Server("empty image upload".to_string()));
        }
        let url = format!("https://images.agora.example/{}", new_id("img"));
        inner
            .images
            .insert(url.clone(), (bytes, content_type.to_string()));
        Ok(ImageRef {
            url,
            content_type: Some(content_type.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minted_ids_are_prefixed_and_unique() {
        let a = new_id("post");
        let b = new_id("post");
        assert!(a.starts_with("post_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_unauthenticated_mutation_is_rejected() {
        let facade = MemoryFacade::default();
        let err = facade
            .create_post("bogus-token", PostDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Server(_)));
    }

    #[tokio::test]
    async fn test_feed_is_newest_first() {
        let facade = MemoryFacade::default();
        let session = facade.signup("alice", "pw").await.unwrap();
        for content in ["first", "second", "third"] {
            facade
                .create_post(
                    &session.token,
                    PostDraft {
                        content: content.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        let feed = facade.fetch_feed().await.unwrap();
        let contents: Vec<&str> = feed.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["third", "second", "first"]);
    }
}
