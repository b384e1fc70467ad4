//! Comment use-case service.
//!
//! # Responsibility
//! - Validate comment input and apply business rules.
//! - Delegate reads, cascade deletes and search to their components.
//!
//! # Invariants
//! - Author and content are non-blank after normalization.
//! - A reply's parent exists and is not tombstoned at creation time.
//! - Store errors are passed through, never swallowed.

use crate::model::comment::{Comment, CommentId, NewComment};
use crate::repo::comment_repo::CommentStore;
use crate::retry::RetryPolicy;
use crate::search::adapter::SearchAdapter;
use crate::service::cascade_deleter::{CascadeDeleter, DeleteOutcome};
use crate::service::error::{CommentServiceError, ServiceResult};
use crate::service::tree_assembler::{ThreadConfig, ThreadRequest, TreeAssembler};
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;

/// Longest accepted author display name, in characters.
pub const MAX_AUTHOR_CHARS: usize = 100;
/// Longest accepted comment body, in characters.
pub const MAX_CONTENT_CHARS: usize = 10_000;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Comment service facade over a comment store.
pub struct CommentService<S: CommentStore> {
    store: S,
    retry: RetryPolicy,
    thread: ThreadConfig,
}

impl<S: CommentStore> CommentService<S> {
    /// Creates a service with default retry and thread settings.
    pub fn new(store: S) -> Self {
        Self::with_config(store, RetryPolicy::default(), ThreadConfig::default())
    }

    pub fn with_config(store: S, retry: RetryPolicy, thread: ThreadConfig) -> Self {
        Self {
            store,
            retry,
            thread,
        }
    }

    /// Borrows the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates one comment, as a root when `parent_id` is `None`.
    ///
    /// # Errors
    /// - `InvalidArgument` for blank or oversized author/content, a
    ///   non-positive parent id or a tombstoned parent.
    /// - `NotFound` when the parent does not exist.
    pub fn create_comment(
        &self,
        parent_id: Option<CommentId>,
        author: &str,
        content: &str,
    ) -> ServiceResult<Comment> {
        let author = normalize_author(author)?;
        let content = normalize_content(content)?;
        if let Some(parent_id) = parent_id.filter(|id| *id <= 0) {
            return Err(CommentServiceError::invalid(format!(
                "parent id must be positive, got {parent_id}"
            )));
        }

        // Parent existence and liveness are checked inside the insert
        // transaction.
        let comment = self
            .store
            .save(&NewComment::new(parent_id, author, content))
            .map_err(|err| {
                error!(
                    "event=comment_create module=service status=error parent={:?} error={}",
                    parent_id, err
                );
                CommentServiceError::from(err)
            })?;

        info!(
            "event=comment_create module=service status=ok id={} parent={:?}",
            comment.id, comment.parent_id
        );
        Ok(comment)
    }

    /// Loads one paginated thread level with nested replies.
    pub fn get_thread(&self, request: &ThreadRequest) -> ServiceResult<Vec<Comment>> {
        self.assembler().get_thread(request)
    }

    /// Loads one comment with its reply tree; `None` when absent.
    pub fn get_comment(&self, id: CommentId) -> ServiceResult<Option<Comment>> {
        self.assembler().get_comment(id)
    }

    /// Tombstones a comment and its whole subtree.
    pub fn delete_thread(&self, id: CommentId) -> ServiceResult<()> {
        self.delete_thread_with_outcome(id).map(|_| ())
    }

    /// Same as [`Self::delete_thread`], reporting how many rows changed.
    pub fn delete_thread_with_outcome(&self, id: CommentId) -> ServiceResult<DeleteOutcome> {
        CascadeDeleter::new(&self.store, self.retry).delete_thread(id)
    }

    /// Flat search over content and author.
    pub fn search_comments(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> ServiceResult<Vec<Comment>> {
        SearchAdapter::new(&self.store, self.retry).search_comments(query, limit, offset)
    }

    fn assembler(&self) -> TreeAssembler<'_, S> {
        TreeAssembler::new(&self.store, self.retry, self.thread)
    }
}

fn normalize_author(value: &str) -> ServiceResult<String> {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    if collapsed.is_empty() {
        return Err(CommentServiceError::invalid("author must not be empty"));
    }
    if collapsed.chars().count() > MAX_AUTHOR_CHARS {
        return Err(CommentServiceError::invalid(format!(
            "author must be at most {MAX_AUTHOR_CHARS} characters"
        )));
    }
    Ok(collapsed.into_owned())
}

fn normalize_content(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CommentServiceError::invalid("content must not be empty"));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(CommentServiceError::invalid(format!(
            "content must be at most {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{normalize_author, normalize_content, MAX_AUTHOR_CHARS};
    use crate::service::error::CommentServiceError;

    #[test]
    fn author_whitespace_is_collapsed() {
        assert_eq!(normalize_author("  Ada \t\n Lovelace ").unwrap(), "Ada Lovelace");
    }

    #[test]
    fn blank_values_are_invalid_arguments() {
        assert!(matches!(
            normalize_author(" \n "),
            Err(CommentServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            normalize_content(""),
            Err(CommentServiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn oversized_author_is_rejected() {
        let long = "a".repeat(MAX_AUTHOR_CHARS + 1);
        let err = normalize_author(&long).unwrap_err();
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn content_keeps_inner_newlines() {
        assert_eq!(normalize_content("\n line one\nline two \n").unwrap(), "line one\nline two");
    }
}
