//! Cascade soft delete for comment subtrees.
//!
//! # Responsibility
//! - Tombstone a comment and every transitive reply as one store operation.
//!
//! # Invariants
//! - `id` must be positive.
//! - Either the whole subtree transitions or nothing does.
//! - Repeating a delete is a successful no-op.

use crate::model::comment::{now_epoch_ms, CommentId};
use crate::repo::comment_repo::CommentStore;
use crate::retry::RetryPolicy;
use crate::service::error::{CommentServiceError, ServiceResult};
use log::{error, info};
use std::time::Instant;

/// Result of one cascade delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub id: CommentId,
    /// Rows that moved from live to tombstoned; `0` on a repeated delete.
    pub affected: usize,
    /// Timestamp written to `updated_at` of every affected row.
    pub deleted_at: i64,
}

pub struct CascadeDeleter<'s, S: CommentStore> {
    store: &'s S,
    retry: RetryPolicy,
}

impl<'s, S: CommentStore> CascadeDeleter<'s, S> {
    pub fn new(store: &'s S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Tombstones `id` and all of its descendants.
    ///
    /// # Errors
    /// - `InvalidArgument` when `id <= 0`.
    /// - `Store` with the store error after retries are exhausted.
    pub fn delete_thread(&self, id: CommentId) -> ServiceResult<DeleteOutcome> {
        if id <= 0 {
            return Err(CommentServiceError::invalid(format!(
                "id must be positive, got {id}"
            )));
        }

        let started_at = Instant::now();
        let deleted_at = now_epoch_ms();
        match self
            .retry
            .run("delete_subtree", || self.store.delete_subtree(id, deleted_at))
        {
            Ok(affected) => {
                info!(
                    "event=thread_delete module=cascade status=ok id={} affected={} duration_ms={}",
                    id,
                    affected,
                    started_at.elapsed().as_millis()
                );
                Ok(DeleteOutcome {
                    id,
                    affected,
                    deleted_at,
                })
            }
            Err(err) => {
                error!(
                    "event=thread_delete module=cascade status=error id={} duration_ms={} error={}",
                    id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(CommentServiceError::Store(err))
            }
        }
    }
}
