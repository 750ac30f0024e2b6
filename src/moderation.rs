//! Content suppression heuristic.
//!
//! Content whose aggregate score (likes minus dislikes) sinks to the policy
//! threshold, or that the server has flagged, is visually obscured for
//! everyone except its author.  The predicate here has no side effects and is
//! re-evaluated by the UI whenever vote sets change; the reveal-on-tap
//! behaviour lives entirely in the presentation layer.

use crate::model::{Comment, Post};

/// Suppression thresholds, per entity kind.
///
/// The defaults come from product policy, not derivation; construct a custom
/// policy rather than assuming the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// A post is suppressed at `score <= post_threshold`.
    pub post_threshold: i64,
    /// A comment is suppressed at `score <= comment_threshold`.
    pub comment_threshold: i64,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            post_threshold: crate::config::DEFAULT_POST_SUPPRESS_THRESHOLD,
            comment_threshold: crate::config::DEFAULT_COMMENT_SUPPRESS_THRESHOLD,
        }
    }
}

/// Whether a piece of content should be visually suppressed for `viewer`.
///
/// Authors always see their own content unsuppressed, regardless of score or
/// flags.
pub fn is_suppressed(
    viewer_id: &str,
    author_id: &str,
    like_count: usize,
    dislike_count: usize,
    flagged_bad: bool,
    threshold: i64,
) -> bool {
    if viewer_id == author_id {
        return false;
    }
    let score = like_count as i64 - dislike_count as i64;
    score <= threshold || flagged_bad
}

impl ModerationPolicy {
    /// Suppression check for a post.  A post is also suppressed when its
    /// comment tree has been flagged bad (`has_bad_comments`).
    pub fn post_suppressed(&self, post: &Post, viewer_id: &str) -> bool {
        is_suppressed(
            viewer_id,
            &post.author_id,
            post.liked_by.len(),
            post.disliked_by.len(),
            post.has_bad_comments,
            self.post_threshold,
        )
    }

    /// Suppression check for a single comment node.
    pub fn comment_suppressed(&self, comment: &Comment, viewer_id: &str) -> bool {
        is_suppressed(
            viewer_id,
            &comment.author_id,
            comment.liked_by.len(),
            comment.disliked_by.len(),
            comment.flagged_bad,
            self.comment_threshold,
        )
    }

    /// Recompute the `has_bad_comments` flag for a post from its reconciled
    /// comment tree: true when any node, at any depth, is flagged or has sunk
    /// to the comment threshold.
    pub fn tree_has_bad_comments(&self, tree: &[Comment]) -> bool {
        tree.iter().any(|node| {
            node.flagged_bad
                || node.score() <= self.comment_threshold
                || self.tree_has_bad_comments(&node.replies)
        })
    }
}

/// Comments in a tree that are suppressed for `viewer`, by id.  Convenience
/// for screens that obscure nodes in a flattened render.
pub fn suppressed_comment_ids(
    tree: &[Comment],
    viewer_id: &str,
    policy: &ModerationPolicy,
) -> Vec<String> {
    let mut out = Vec::new();
    collect_suppressed(tree, viewer_id, policy, &mut out);
    out
}

fn collect_suppressed(
    tree: &[Comment],
    viewer_id: &str,
    policy: &ModerationPolicy,
    out: &mut Vec<String>,
) {
    for node in tree {
        if policy.comment_suppressed(node, viewer_id) {
            out.push(node.id.clone());
        }
        collect_suppressed(&node.replies, viewer_id, policy, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn policy() -> ModerationPolicy {
        ModerationPolicy::default()
    }

    fn votes(n: usize, prefix: &str) -> HashSet<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn post_with_votes(likes: usize, dislikes: usize) -> Post {
        Post {
            id: "p1".to_string(),
            author_id: "author".to_string(),
            content: "post".to_string(),
            images: Vec::new(),
            liked_by: votes(likes, "l"),
            disliked_by: votes(dislikes, "d"),
            comment_ids: Vec::new(),
            has_bad_comments: false,
            community_id: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            edited_at: None,
        }
    }

    fn comment_with_votes(id: &str, likes: usize, dislikes: usize) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: "p1".to_string(),
            author_id: "author".to_string(),
            content: "comment".to_string(),
            liked_by: votes(likes, "l"),
            disliked_by: votes(dislikes, "d"),
            replies: Vec::new(),
            replied_to_id: None,
            flagged_bad: false,
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            edited_at: None,
        }
    }

    #[test]
    fn test_author_always_sees_own_content() {
        // Regardless of score and flag.
        assert!(!is_suppressed("author", "author", 0, 1000, true, -1));
    }

    #[test]
    fn test_flagged_content_always_suppressed_for_others() {
        assert!(is_suppressed("viewer", "author", 1000, 0, true, -1));
    }

    #[test]
    fn test_threshold_boundary() {
        // score == threshold suppresses; one above does not.
        assert!(is_suppressed("viewer", "author", 0, 1, false, -1));
        assert!(!is_suppressed("viewer", "author", 0, 0, false, -1));
    }

    #[test]
    fn test_post_score_nine_not_suppressed() {
        // 12 likes, 3 dislikes -> score 9, threshold -10.
        let post = post_with_votes(12, 3);
        assert!(!policy().post_suppressed(&post, "viewer"));
    }

    #[test]
    fn test_post_score_minus_eleven_suppressed_except_for_author() {
        // 12 likes, 23 dislikes -> score -11, threshold -10.
        let post = post_with_votes(12, 23);
        assert!(policy().post_suppressed(&post, "viewer"));
        assert!(!policy().post_suppressed(&post, "author"));
    }

    #[test]
    fn test_post_with_bad_comments_suppressed() {
        let mut post = post_with_votes(50, 0);
        post.has_bad_comments = true;
        assert!(policy().post_suppressed(&post, "viewer"));
        assert!(!policy().post_suppressed(&post, "author"));
    }

    #[test]
    fn test_comment_threshold_is_minus_one() {
        assert!(policy().comment_suppressed(&comment_with_votes("c1", 0, 1), "viewer"));
        assert!(!policy().comment_suppressed(&comment_with_votes("c1", 1, 1), "viewer"));
    }

    #[test]
    fn test_tree_has_bad_comments_from_nested_flag() {
        let mut deep = comment_with_votes("c3", 5, 0);
        deep.flagged_bad = true;
        let mut mid = comment_with_votes("c2", 5, 0);
        mid.replies.push(deep);
        let mut root = comment_with_votes("c1", 5, 0);
        root.replies.push(mid);

        assert!(policy().tree_has_bad_comments(&[root]));
        assert!(!policy().tree_has_bad_comments(&[comment_with_votes("c1", 5, 0)]));
    }

    #[test]
    fn test_tree_has_bad_comments_from_score() {
        let sunk = comment_with_votes("c2", 0, 4);
        let mut root = comment_with_votes("c1", 5, 0);
        root.replies.push(sunk);
        assert!(policy().tree_has_bad_comments(&[root]));
    }

    #[test]
    fn test_suppressed_comment_ids_collects_nested() {
        let mut flagged = comment_with_votes("c3", 10, 0);
        flagged.flagged_bad = true;
        let mut root = comment_with_votes("c1", 1, 0);
        root.replies.push(comment_with_votes("c2", 0, 2));
        root.replies.push(flagged);

        let ids = suppressed_comment_ids(&[root], "viewer", &policy());
        assert_eq!(ids, vec!["c2".to_string(), "c3".to_string()]);
    }

    #[test]
    fn test_custom_policy_thresholds() {
        let strict = ModerationPolicy {
            post_threshold: 0,
            comment_threshold: 0,
        };
        let post = post_with_votes(1, 1); // score 0
        assert!(strict.post_suppressed(&post, "viewer"));
        assert!(!policy().post_suppressed(&post, "viewer"));
    }
}
