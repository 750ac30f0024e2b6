//! Comment tree reconciliation.
//!
//! Every mutation endpoint returns the full updated comment node, never a
//! diff, so after a like/dislike/edit/reply the client must locate that
//! node's position in the locally held tree and splice in the replacement.
//! The functions here do that as pure transformations: the input tree is
//! consumed by value, untouched sibling subtrees are moved (never cloned or
//! mutated in place), and only the ancestor chain of the affected node is
//! rebuilt.
//!
//! Search order is depth-first: each node's id is checked before recursing
//! into its replies, and only the first match is affected (ids are unique
//! across a post's tree, so at most one node ever matches).
//!
//! These functions are total: a missing id is not an error, the tree comes
//! back unchanged.  Callers that need to distinguish "not found" (e.g. the
//! node was deleted concurrently) check with [`find_comment`] and re-fetch.

use std::mem;

use crate::model::Comment;

/// Locate a comment by id anywhere in the tree.
pub fn find_comment<'a>(tree: &'a [Comment], id: &str) -> Option<&'a Comment> {
    for node in tree {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_comment(&node.replies, id) {
            return Some(found);
        }
    }
    None
}

/// Replace the node whose id matches `updated.id`, wherever it lives in the
/// nesting, with `updated` (subtree included).  Returns the tree unchanged if
/// the id is not present.
pub fn replace_comment(tree: Vec<Comment>, updated: Comment) -> Vec<Comment> {
    let mut pending = Some(updated);
    replace_inner(tree, &mut pending)
}

fn replace_inner(tree: Vec<Comment>, pending: &mut Option<Comment>) -> Vec<Comment> {
    tree.into_iter()
        .map(|mut node| {
            if pending.as_ref().is_some_and(|u| u.id == node.id) {
                // `take` can only yield the value we just matched.
                return pending.take().unwrap_or(node);
            }
            // Once spliced, remaining siblings pass through untouched.
            if pending.is_some() {
                node.replies = replace_inner(mem::take(&mut node.replies), pending);
            }
            node
        })
        .collect()
}

/// Remove the node with the given id, wherever it lives in the nesting,
/// dropping its whole subtree.  Returns the tree unchanged if the id is not
/// present.
pub fn remove_comment(tree: Vec<Comment>, id: &str) -> Vec<Comment> {
    let mut removed = false;
    remove_inner(tree, id, &mut removed)
}

fn remove_inner(tree: Vec<Comment>, id: &str, removed: &mut bool) -> Vec<Comment> {
    tree.into_iter()
        .filter_map(|mut node| {
            if !*removed && node.id == id {
                *removed = true;
                return None;
            }
            if !*removed {
                node.replies = remove_inner(mem::take(&mut node.replies), id, removed);
            }
            Some(node)
        })
        .collect()
}

/// Append `reply` to the reply list of the node with id `parent_id`.
/// Used for the optimistic overlay before the server confirms a reply; the
/// confirmed parent node replaces the whole subtree via [`replace_comment`].
/// Returns the tree unchanged if the parent is not present.
pub fn insert_reply(tree: Vec<Comment>, parent_id: &str, reply: Comment) -> Vec<Comment> {
    let mut pending = Some(reply);
    insert_inner(tree, parent_id, &mut pending)
}

fn insert_inner(tree: Vec<Comment>, parent_id: &str, pending: &mut Option<Comment>) -> Vec<Comment> {
    tree.into_iter()
        .map(|mut node| {
            if let Some(reply) = pending.take() {
                if node.id == parent_id {
                    node.replies.push(reply);
                } else {
                    *pending = Some(reply);
                    node.replies = insert_inner(mem::take(&mut node.replies), parent_id, pending);
                }
            }
            node
        })
        .collect()
}

/// Total number of comments in the tree, replies included.
pub fn comment_count(tree: &[Comment]) -> usize {
    tree.iter()
        .map(|node| 1 + comment_count(&node.replies))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn comment(id: &str, replies: Vec<Comment>) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: "p1".to_string(),
            author_id: "author".to_string(),
            content: format!("comment {id}"),
            liked_by: HashSet::new(),
            disliked_by: HashSet::new(),
            replies,
            replied_to_id: None,
            flagged_bad: false,
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            edited_at: None,
        }
    }

    /// c1 ── c2 ── c4
    ///  │     └── c5
    ///  └── c3
    /// c6
    fn sample_tree() -> Vec<Comment> {
        vec![
            comment(
                "c1",
                vec![
                    comment("c2", vec![comment("c4", vec![]), comment("c5", vec![])]),
                    comment("c3", vec![]),
                ],
            ),
            comment("c6", vec![]),
        ]
    }

    #[test]
    fn test_find_comment_at_any_depth() {
        let tree = sample_tree();
        for id in ["c1", "c2", "c3", "c4", "c5", "c6"] {
            assert_eq!(find_comment(&tree, id).map(|c| c.id.as_str()), Some(id));
        }
        assert!(find_comment(&tree, "missing").is_none());
    }

    #[test]
    fn test_replace_nested_node() {
        let tree = sample_tree();
        let mut updated = comment("c5", vec![]);
        updated.liked_by.insert("u1".to_string());

        let result = replace_comment(tree, updated.clone());

        let spliced = find_comment(&result, "c5").unwrap();
        assert_eq!(spliced, &updated);
        // Untouched nodes are unchanged.
        assert_eq!(result, {
            let mut expected = sample_tree();
            expected[0].replies[0].replies[1]
                .liked_by
                .insert("u1".to_string());
            expected
        });
    }

    #[test]
    fn test_replace_top_level_node_keeps_position() {
        let tree = sample_tree();
        let mut updated = comment("c6", vec![]);
        updated.content = "edited".to_string();

        let result = replace_comment(tree, updated);
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].id, "c6");
        assert_eq!(result[1].content, "edited");
    }

    #[test]
    fn test_replace_brings_whole_subtree() {
        // Server returns the parent with a freshly nested reply.
        let tree = sample_tree();
        let updated = comment("c3", vec![comment("c7", vec![])]);

        let result = replace_comment(tree, updated);
        assert!(find_comment(&result, "c7").is_some());
        assert_eq!(comment_count(&result), 7);
    }

    #[test]
    fn test_replace_missing_id_returns_tree_unchanged() {
        let tree = sample_tree();
        let result = replace_comment(tree, comment("nope", vec![]));
        assert_eq!(result, sample_tree());
    }

    #[test]
    fn test_untouched_branch_is_moved_not_copied() {
        let tree = sample_tree();
        // Buffer pointer of c1's reply list; replacing c6 must not touch it.
        let before = tree[0].replies.as_ptr();

        let result = replace_comment(tree, comment("c6", vec![]));
        assert_eq!(result[0].replies.as_ptr(), before);
    }

    #[test]
    fn test_remove_nested_node_drops_subtree() {
        let result = remove_comment(sample_tree(), "c2");
        assert!(find_comment(&result, "c2").is_none());
        assert!(find_comment(&result, "c4").is_none());
        assert!(find_comment(&result, "c5").is_none());
        assert!(find_comment(&result, "c3").is_some());
        assert_eq!(comment_count(&result), 3);
    }

    #[test]
    fn test_remove_every_id_leaves_it_unfindable() {
        for id in ["c1", "c2", "c3", "c4", "c5", "c6"] {
            let result = remove_comment(sample_tree(), id);
            assert!(find_comment(&result, id).is_none(), "id {id} still present");
        }
    }

    #[test]
    fn test_remove_missing_id_returns_tree_unchanged() {
        let result = remove_comment(sample_tree(), "missing");
        assert_eq!(result, sample_tree());
    }

    #[test]
    fn test_insert_reply_under_nested_parent() {
        let mut reply = comment("c8", vec![]);
        reply.replied_to_id = Some("c4".to_string());

        let result = insert_reply(sample_tree(), "c4", reply);
        let parent = find_comment(&result, "c4").unwrap();
        assert_eq!(parent.replies.len(), 1);
        assert_eq!(parent.replies[0].id, "c8");
    }

    #[test]
    fn test_insert_reply_missing_parent_returns_tree_unchanged() {
        let result = insert_reply(sample_tree(), "missing", comment("c8", vec![]));
        assert_eq!(result, sample_tree());
    }

    #[test]
    fn test_comment_count() {
        assert_eq!(comment_count(&sample_tree()), 6);
        assert_eq!(comment_count(&[]), 0);
    }

    #[test]
    fn test_nested_like_splice() {
        // [ {id:"c1", replies:[{id:"c2"}]} ] reconciled with updated c2.
        let tree = vec![comment("c1", vec![comment("c2", vec![])])];
        let mut updated = comment("c2", vec![]);
        updated.liked_by.insert("u1".to_string());

        let result = replace_comment(tree, updated);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "c1");
        assert_eq!(result[0].replies.len(), 1);
        assert!(result[0].replies[0].liked_by.contains("u1"));
    }
}
