//! Core entity types shared by the façade, the comment tree, and the screen
//! state holders.
//!
//! All entity IDs are opaque strings minted by the server; the client never
//! parses, orders, or generates them.  Wire timestamps arrive in the fixed
//! format `yyyy-MM-ddTHH:mm:ss.SSSZ`, always UTC, and are serialized back in
//! the identical format via the [`wire_time`] serde helpers.

use std::collections::HashSet;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed wire format for all timestamps: `yyyy-MM-ddTHH:mm:ss.SSSZ`.
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parse a wire timestamp string as UTC.
pub fn parse_wire_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, WIRE_TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// Format a timestamp in the wire format.
pub fn format_wire_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(WIRE_TIMESTAMP_FORMAT).to_string()
}

/// Adjust a UTC timestamp to the local offset for display.
pub fn to_local(ts: DateTime<Utc>) -> DateTime<Local> {
    ts.with_timezone(&Local)
}

/// Serde adapter for `DateTime<Utc>` fields in the wire format.
pub mod wire_time {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&format_wire_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(de)?;
        parse_wire_timestamp(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional wire timestamps.
pub mod wire_time_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => ser.serialize_some(&format_wire_timestamp(*ts)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let s: Option<String> = Option::deserialize(de)?;
        s.map(|s| parse_wire_timestamp(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Vote sets
// ---------------------------------------------------------------------------

/// Toggle `user` in the `liked` set, keeping the like and dislike sets
/// mutually exclusive: liking removes a standing dislike and vice versa.
fn toggle_vote(toggled: &mut HashSet<String>, opposite: &mut HashSet<String>, user: &str) {
    if !toggled.remove(user) {
        toggled.insert(user.to_string());
        opposite.remove(user);
    }
}

// ---------------------------------------------------------------------------
// Users and sessions
// ---------------------------------------------------------------------------

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<ImageRef>,
    #[serde(with = "wire_time")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name shown in the UI: display name when set, username otherwise.
    pub fn shown_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<ImageRef>,
}

/// An authenticated session returned by signup/login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Reference to an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// A feed post.
///
/// Equality and hashing are by `id` alone: two `Post` values with the same id
/// are the same logical post regardless of field staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub liked_by: HashSet<String>,
    #[serde(default)]
    pub disliked_by: HashSet<String>,
    /// IDs of top-level comments; only the count is displayed.
    #[serde(default)]
    pub comment_ids: Vec<String>,
    #[serde(default)]
    pub has_bad_comments: bool,
    #[serde(default)]
    pub community_id: Option<String>,
    #[serde(with = "wire_time")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "wire_time_opt")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Post {}

impl std::hash::Hash for Post {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Post {
    /// Aggregate moderation score: likes minus dislikes.
    pub fn score(&self) -> i64 {
        self.liked_by.len() as i64 - self.disliked_by.len() as i64
    }

    pub fn comment_count(&self) -> usize {
        self.comment_ids.len()
    }

    /// Copy with the viewer's like toggled (optimistic overlay).
    pub fn with_like_toggled(mut self, user: &str) -> Post {
        toggle_vote(&mut self.liked_by, &mut self.disliked_by, user);
        self
    }

    /// Copy with the viewer's dislike toggled (optimistic overlay).
    pub fn with_dislike_toggled(mut self, user: &str) -> Post {
        toggle_vote(&mut self.disliked_by, &mut self.liked_by, user);
        self
    }
}

/// Payload for creating a new post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostDraft {
    pub content: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub community_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

/// A comment, possibly with nested replies.
///
/// IDs are unique across the whole tree rooted at a post's top-level comment
/// list.  `replies` form a tree (each node is created once server-side and
/// fetched as a fresh tree); `replied_to_id` is set only on non-root nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub liked_by: HashSet<String>,
    #[serde(default)]
    pub disliked_by: HashSet<String>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub replied_to_id: Option<String>,
    /// Server-asserted moderation flag.
    #[serde(default)]
    pub flagged_bad: bool,
    #[serde(with = "wire_time")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "wire_time_opt")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Aggregate moderation score: likes minus dislikes.
    pub fn score(&self) -> i64 {
        self.liked_by.len() as i64 - self.disliked_by.len() as i64
    }

    /// Copy with the viewer's like toggled (optimistic overlay).
    pub fn with_like_toggled(mut self, user: &str) -> Comment {
        toggle_vote(&mut self.liked_by, &mut self.disliked_by, user);
        self
    }

    /// Copy with the viewer's dislike toggled (optimistic overlay).
    pub fn with_dislike_toggled(mut self, user: &str) -> Comment {
        toggle_vote(&mut self.disliked_by, &mut self.liked_by, user);
        self
    }
}

// ---------------------------------------------------------------------------
// Communities
// ---------------------------------------------------------------------------

/// A user's standing within a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipRole {
    /// Created the community; moderates but is not counted as a plain member.
    Manager,
    Admin,
    Member,
    Visitor,
}

/// A pending membership request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMember {
    pub user_id: String,
    #[serde(with = "wire_time")]
    pub requested_at: DateTime<Utc>,
}

/// A community.
///
/// Invariants: `admin_ids` is a subset of `member_ids`; `manager_id` appears
/// in neither set.  Role derivation checks manager, then admin, then member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub avatar: Option<ImageRef>,
    pub manager_id: String,
    #[serde(default)]
    pub member_ids: HashSet<String>,
    #[serde(default)]
    pub admin_ids: HashSet<String>,
    #[serde(default)]
    pub pending: Vec<PendingMember>,
    #[serde(with = "wire_time")]
    pub created_at: DateTime<Utc>,
}

impl PartialEq for Community {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Community {}

impl Community {
    pub fn role_of(&self, user: &str) -> MembershipRole {
        if self.manager_id == user {
            MembershipRole::Manager
        } else if self.admin_ids.contains(user) {
            MembershipRole::Admin
        } else if self.member_ids.contains(user) {
            MembershipRole::Member
        } else {
            MembershipRole::Visitor
        }
    }

    /// Whether `user` counts as a plain member for permission purposes.
    /// The manager moderates but is not a member.
    pub fn is_member(&self, user: &str) -> bool {
        matches!(
            self.role_of(user),
            MembershipRole::Admin | MembershipRole::Member
        )
    }

    /// Whether `user` may approve/reject pending members and flag content.
    pub fn can_moderate(&self, user: &str) -> bool {
        matches!(
            self.role_of(user),
            MembershipRole::Manager | MembershipRole::Admin
        )
    }

    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }

    pub fn has_pending_request(&self, user: &str) -> bool {
        self.pending.iter().any(|p| p.user_id == user)
    }
}

// ---------------------------------------------------------------------------
// Direct messaging
// ---------------------------------------------------------------------------

/// A two-party conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participant_ids: [String; 2],
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, with = "wire_time_opt")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// The other participant from `me`'s point of view.
    pub fn other_participant(&self, me: &str) -> &str {
        if self.participant_ids[0] == me {
            &self.participant_ids[1]
        } else {
            &self.participant_ids[0]
        }
    }

    pub fn involves(&self, user: &str) -> bool {
        self.participant_ids.iter().any(|p| p == user)
    }
}

/// A single direct message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(with = "wire_time")]
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap()
    }

    fn post(id: &str, content: &str) -> Post {
        Post {
            id: id.to_string(),
            author_id: "author".to_string(),
            content: content.to_string(),
            images: Vec::new(),
            liked_by: HashSet::new(),
            disliked_by: HashSet::new(),
            comment_ids: Vec::new(),
            has_bad_comments: false,
            community_id: None,
            created_at: ts(),
            edited_at: None,
        }
    }

    #[test]
    fn test_wire_timestamp_roundtrip() {
        let parsed = parse_wire_timestamp("2026-01-15T12:30:45.123Z").unwrap();
        assert_eq!(format_wire_timestamp(parsed), "2026-01-15T12:30:45.123Z");
    }

    #[test]
    fn test_wire_timestamp_is_utc() {
        let parsed = parse_wire_timestamp("2026-01-15T00:00:00.000Z").unwrap();
        assert_eq!(parsed.timezone(), Utc);
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_wire_timestamp_rejects_other_formats() {
        assert!(parse_wire_timestamp("2026-01-15 12:30:45").is_err());
        assert!(parse_wire_timestamp("2026-01-15T12:30:45Z").is_err());
    }

    #[test]
    fn test_post_equality_is_by_id_alone() {
        let a = post("p1", "original");
        let mut b = post("p1", "stale copy with different text");
        b.liked_by.insert("someone".to_string());
        assert_eq!(a, b);
        assert_ne!(a, post("p2", "original"));
    }

    #[test]
    fn test_like_toggle_clears_dislike() {
        let p = post("p1", "x").with_dislike_toggled("u1");
        assert!(p.disliked_by.contains("u1"));

        let p = p.with_like_toggled("u1");
        assert!(p.liked_by.contains("u1"));
        assert!(!p.disliked_by.contains("u1"));

        // Toggling again removes the like without reinstating the dislike.
        let p = p.with_like_toggled("u1");
        assert!(!p.liked_by.contains("u1"));
        assert!(!p.disliked_by.contains("u1"));
    }

    #[test]
    fn test_community_roles() {
        let mut c = Community {
            id: "c1".to_string(),
            name: "rustaceans".to_string(),
            description: String::new(),
            avatar: None,
            manager_id: "mgr".to_string(),
            member_ids: HashSet::new(),
            admin_ids: HashSet::new(),
            pending: Vec::new(),
            created_at: ts(),
        };
        c.member_ids.insert("alice".to_string());
        c.member_ids.insert("bob".to_string());
        c.admin_ids.insert("bob".to_string());

        assert_eq!(c.role_of("mgr"), MembershipRole::Manager);
        assert_eq!(c.role_of("bob"), MembershipRole::Admin);
        assert_eq!(c.role_of("alice"), MembershipRole::Member);
        assert_eq!(c.role_of("nobody"), MembershipRole::Visitor);

        // The manager is not counted as a plain member.
        assert!(!c.is_member("mgr"));
        assert!(c.can_moderate("mgr"));
        assert!(c.can_moderate("bob"));
        assert!(!c.can_moderate("alice"));
    }

    #[test]
    fn test_conversation_other_participant() {
        let conv = Conversation {
            id: "v1".to_string(),
            participant_ids: ["alice".to_string(), "bob".to_string()],
            last_message: None,
            last_activity: None,
            unread_count: 0,
        };
        assert_eq!(conv.other_participant("alice"), "bob");
        assert_eq!(conv.other_participant("bob"), "alice");
        assert!(conv.involves("alice"));
        assert!(!conv.involves("carol"));
    }

    #[test]
    fn test_comment_serde_wire_format() {
        let c = Comment {
            id: "c1".to_string(),
            post_id: "p1".to_string(),
            author_id: "alice".to_string(),
            content: "hello".to_string(),
            liked_by: HashSet::new(),
            disliked_by: HashSet::new(),
            replies: Vec::new(),
            replied_to_id: None,
            flagged_bad: false,
            created_at: ts(),
            edited_at: None,
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["created_at"], "2026-01-15T12:30:45.000Z");
        let back: Comment = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }
}
