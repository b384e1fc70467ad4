//! Comment domain model.
//!
//! # Responsibility
//! - Define the persisted comment record and the transient `children` tree.
//! - Provide read helpers used by the tree assembler and callers.
//!
//! # Invariants
//! - `id` and `created_at` are assigned by the store and never change.
//! - `deleted` only ever transitions from `false` to `true`.
//! - `children` is never persisted; each node exclusively owns its replies.
//! - Dropping, comparing and walking a tree never recurse, so reply chains
//!   of any depth are safe.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Store-assigned comment identifier. Always positive once persisted.
pub type CommentId = i64;

/// Comment record, optionally carrying its assembled reply tree.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    /// `None` marks a root comment.
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub content: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last mutation (the soft delete).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Tombstone marker.
    pub deleted: bool,
    /// Immediate replies, populated only by the tree assembler.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Comment>,
}

impl Comment {
    /// Returns whether this comment has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Returns whether this comment should be considered visible.
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// Counts this node and every assembled descendant.
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Visits this node and every assembled descendant in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Comment)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            visit(node);
            stack.extend(node.children.iter().rev());
        }
    }
}

impl PartialEq for Comment {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((left, right)) = pending.pop() {
            let same_record = left.id == right.id
                && left.parent_id == right.parent_id
                && left.author == right.author
                && left.content == right.content
                && left.created_at == right.created_at
                && left.updated_at == right.updated_at
                && left.deleted == right.deleted
                && left.children.len() == right.children.len();
            if !same_record {
                return false;
            }
            pending.extend(left.children.iter().zip(&right.children));
        }
        true
    }
}

impl Drop for Comment {
    fn drop(&mut self) {
        // Detach descendants onto a heap stack; each popped node is dropped
        // with no children left.
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// Input for persisting a new comment.
///
/// Values are expected to be validated by the comment service already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub content: String,
}

impl NewComment {
    pub fn new(
        parent_id: Option<CommentId>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            parent_id,
            author: author.into(),
            content: content.into(),
        }
    }
}

/// Sort direction for paginated comment levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl SortOrder {
    /// Parses a caller-provided sort value.
    ///
    /// Only `asc` (case-insensitive, surrounding whitespace ignored) selects
    /// ascending order; every other value, including empty, means descending.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Current wall-clock time as Unix epoch milliseconds.
///
/// Clocks set before the epoch collapse to `0`.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
