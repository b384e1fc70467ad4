//! Thread assembly over the flat `comments` table.
//!
//! # Responsibility
//! - Load one paginated level of a thread (roots or replies of a comment).
//! - Expand every loaded comment into its full reply tree.
//!
//! # Invariants
//! - Sibling order at every level is the store order: the requested
//!   direction for the paginated level, `created_at ASC` below it.
//! - Tombstones never appear in the paginated level.
//! - A failing subtree expansion is logged and leaves that node with the
//!   children it obtained; the fetch itself still succeeds.
//! - A comment id is attached at most once per subtree, so a cyclic
//!   `parent_id` chain cannot loop the expansion.

use crate::model::comment::{Comment, CommentId, SortOrder};
use crate::repo::comment_repo::{ChildrenQuery, CommentStore};
use crate::retry::RetryPolicy;
use crate::service::error::{CommentServiceError, ServiceResult};
use crate::service::normalize_page_limit;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Instant;

/// How far a thread fetch expands the paginated level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionMode {
    /// Load every descendant of every returned comment.
    #[default]
    Eager,
    /// Return the paginated level only; `children` stays empty.
    RootsOnly,
}

/// Tuning for thread assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub expansion: ExpansionMode,
    /// Maximum subtree workers running at once; `0` or `1` is sequential.
    pub fanout: usize,
    /// Keep tombstoned replies in the assembled structure.
    pub include_tombstoned_replies: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            expansion: ExpansionMode::Eager,
            fanout: 8,
            include_tombstoned_replies: true,
        }
    }
}

/// One thread fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadRequest {
    /// `None` pages over root comments.
    pub parent_id: Option<CommentId>,
    /// Page size; normalized with [`normalize_page_limit`].
    pub limit: u32,
    pub offset: u32,
    pub sort: SortOrder,
}

impl ThreadRequest {
    pub fn roots(limit: u32, offset: u32, sort: SortOrder) -> Self {
        Self {
            parent_id: None,
            limit,
            offset,
            sort,
        }
    }

    pub fn replies_of(parent_id: CommentId, limit: u32, offset: u32, sort: SortOrder) -> Self {
        Self {
            parent_id: Some(parent_id),
            limit,
            offset,
            sort,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ExpansionStats {
    loaded: usize,
    failed: usize,
    cycles: usize,
}

impl ExpansionStats {
    fn merge(&mut self, other: ExpansionStats) {
        self.loaded += other.loaded;
        self.failed += other.failed;
        self.cycles += other.cycles;
    }
}

/// Builds nested comment trees from the comment store.
pub struct TreeAssembler<'s, S: CommentStore> {
    store: &'s S,
    retry: RetryPolicy,
    config: ThreadConfig,
}

impl<'s, S: CommentStore> TreeAssembler<'s, S> {
    pub fn new(store: &'s S, retry: RetryPolicy, config: ThreadConfig) -> Self {
        Self {
            store,
            retry,
            config,
        }
    }

    /// Loads one paginated level and expands it according to the config.
    ///
    /// # Errors
    /// - `InvalidArgument` for a non-positive `parent_id`.
    /// - `Store` when the paginated level itself cannot be loaded.
    pub fn get_thread(&self, request: &ThreadRequest) -> ServiceResult<Vec<Comment>> {
        if let Some(parent_id) = request.parent_id {
            if parent_id <= 0 {
                return Err(CommentServiceError::invalid(format!(
                    "parent id must be positive, got {parent_id}"
                )));
            }
        }

        let started_at = Instant::now();
        let query = ChildrenQuery::page(
            request.parent_id,
            normalize_page_limit(request.limit),
            request.offset,
            request.sort,
        );
        let mut level = self
            .retry
            .run("find_children", || self.store.find_children(&query))
            .map_err(|err| {
                error!(
                    "event=thread_fetch module=tree status=error parent={} duration_ms={} error={}",
                    fmt_parent(request.parent_id),
                    started_at.elapsed().as_millis(),
                    err
                );
                CommentServiceError::from(err)
            })?;

        let stats = match self.config.expansion {
            ExpansionMode::Eager => self.expand_level(&mut level),
            ExpansionMode::RootsOnly => ExpansionStats::default(),
        };

        info!(
            "event=thread_fetch module=tree status=ok parent={} page={} descendants={} failed_expansions={} cycles={} duration_ms={}",
            fmt_parent(request.parent_id),
            level.len(),
            stats.loaded,
            stats.failed,
            stats.cycles,
            started_at.elapsed().as_millis()
        );
        Ok(level)
    }

    /// Loads one comment, tombstoned or not, with its full reply tree.
    pub fn get_comment(&self, id: CommentId) -> ServiceResult<Option<Comment>> {
        if id <= 0 {
            return Err(CommentServiceError::invalid(format!(
                "id must be positive, got {id}"
            )));
        }

        let Some(mut comment) = self
            .retry
            .run("find_by_id", || self.store.find_by_id(id))?
        else {
            return Ok(None);
        };
        let stats = self.expand_subtree(&mut comment);
        info!(
            "event=comment_fetch module=tree status=ok id={} descendants={} failed_expansions={}",
            id, stats.loaded, stats.failed
        );
        Ok(Some(comment))
    }

    /// Expands every comment of `level` in place.
    ///
    /// Each worker owns one disjoint slot, so results land in the original
    /// order without locking.
    fn expand_level(&self, level: &mut [Comment]) -> ExpansionStats {
        let mut total = ExpansionStats::default();
        let fanout = self.config.fanout.max(1);
        if fanout == 1 || level.len() <= 1 {
            for node in level.iter_mut() {
                total.merge(self.expand_subtree(node));
            }
            return total;
        }

        for chunk in level.chunks_mut(fanout) {
            thread::scope(|scope| {
                let workers = chunk
                    .iter_mut()
                    .map(|node| {
                        let id = node.id;
                        (id, scope.spawn(move || self.expand_subtree(node)))
                    })
                    .collect::<Vec<_>>();

                for (id, worker) in workers {
                    match worker.join() {
                        Ok(stats) => total.merge(stats),
                        Err(_) => {
                            total.failed += 1;
                            error!(
                                "event=subtree_expand module=tree status=error root={} error_code=worker_panicked",
                                id
                            );
                        }
                    }
                }
            });
        }
        total
    }

    /// Depth-first expansion of `root` using an explicit stack.
    ///
    /// Replies are fetched in discovery order, then attached bottom-up so no
    /// call recursion is needed however deep the thread is.
    fn expand_subtree(&self, root: &mut Comment) -> ExpansionStats {
        let mut stats = ExpansionStats::default();
        let mut visited = HashSet::from([root.id]);
        let mut discovery = Vec::new();
        let mut fetched: HashMap<CommentId, Vec<Comment>> = HashMap::new();
        let mut stack = vec![root.id];

        while let Some(id) = stack.pop() {
            discovery.push(id);
            let query = ChildrenQuery::replies(id, self.config.include_tombstoned_replies);
            let replies = match self
                .retry
                .run("find_children", || self.store.find_children(&query))
            {
                Ok(replies) => replies,
                Err(err) => {
                    stats.failed += 1;
                    warn!(
                        "event=subtree_expand module=tree status=degraded root={} node={} error={}",
                        root.id, id, err
                    );
                    continue;
                }
            };

            let mut kept = Vec::with_capacity(replies.len());
            for reply in replies {
                if !visited.insert(reply.id) {
                    stats.cycles += 1;
                    warn!(
                        "event=subtree_expand module=tree status=degraded root={} node={} error_code=cycle_detected",
                        root.id, reply.id
                    );
                    continue;
                }
                kept.push(reply);
            }

            stats.loaded += kept.len();
            // Reverse push keeps the first reply on top of the stack.
            stack.extend(kept.iter().rev().map(|reply| reply.id));
            fetched.insert(id, kept);
        }

        // Every node is discovered after its parent, so walking discovery
        // order backwards finishes children before their parent.
        let mut assembled: HashMap<CommentId, Vec<Comment>> = HashMap::new();
        for id in discovery.into_iter().rev() {
            let Some(mut replies) = fetched.remove(&id) else {
                continue;
            };
            for reply in &mut replies {
                reply.children = assembled.remove(&reply.id).unwrap_or_default();
            }
            assembled.insert(id, replies);
        }
        root.children = assembled.remove(&root.id).unwrap_or_default();
        stats
    }
}

fn fmt_parent(parent_id: Option<CommentId>) -> String {
    parent_id.map_or_else(|| "none".to_string(), |id| id.to_string())
}
