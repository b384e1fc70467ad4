//! Comment search use case.
//!
//! # Responsibility
//! - Validate and normalize search input.
//! - Prefer full-text matching and degrade to substring matching when the
//!   index cannot serve the query.
//!
//! # Invariants
//! - Results are flat: `children` is always empty.
//! - Tombstoned comments are never returned.

use crate::model::comment::Comment;
use crate::repo::comment_repo::{
    CommentStore, SearchMode, SearchRequest, StoreError, StoreResult,
};
use crate::retry::RetryPolicy;
use crate::service::error::{CommentServiceError, ServiceResult};
use crate::service::normalize_page_limit;
use log::{error, info, warn};
use std::time::Instant;

pub struct SearchAdapter<'s, S: CommentStore> {
    store: &'s S,
    retry: RetryPolicy,
}

impl<'s, S: CommentStore> SearchAdapter<'s, S> {
    pub fn new(store: &'s S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Searches comment content and author.
    ///
    /// # Errors
    /// - `InvalidArgument` for a blank query.
    /// - `Store` when both matching strategies fail.
    pub fn search_comments(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> ServiceResult<Vec<Comment>> {
        let text = query.trim();
        if text.is_empty() {
            return Err(CommentServiceError::invalid("search query must not be empty"));
        }

        let started_at = Instant::now();
        let mut request = SearchRequest {
            text: text.to_string(),
            limit: normalize_page_limit(limit),
            offset,
            mode: SearchMode::FullText,
        };

        let result = match self.run(&request) {
            Err(StoreError::SearchUnavailable(reason)) => {
                warn!(
                    "event=comment_search module=search status=degraded fallback=substring error={}",
                    reason
                );
                request.mode = SearchMode::Substring;
                self.run(&request)
            }
            other => other,
        };

        match result {
            Ok(mut hits) => {
                hits.retain(Comment::is_active);
                for hit in &mut hits {
                    hit.children.clear();
                }
                info!(
                    "event=comment_search module=search status=ok mode={:?} hits={} duration_ms={}",
                    request.mode,
                    hits.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(hits)
            }
            Err(err) => {
                error!(
                    "event=comment_search module=search status=error mode={:?} duration_ms={} error={}",
                    request.mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(CommentServiceError::Store(err))
            }
        }
    }

    fn run(&self, request: &SearchRequest) -> StoreResult<Vec<Comment>> {
        self.retry.run("search", || self.store.search(request))
    }
}
