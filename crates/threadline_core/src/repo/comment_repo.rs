//! Comment store contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the persistence port used by tree assembly, cascade delete and
//!   search.
//! - Keep SQL details and ordering behavior inside the repository boundary.
//!
//! # Invariants
//! - Child listing is deterministic: `created_at <dir>, id <dir>`.
//! - `delete_subtree` tombstones a node and all descendants in one
//!   transaction and never clears an existing tombstone.
//! - "Not found" on lookup is `Ok(None)`, never an error.

use crate::db::migrations::{latest_version, schema_version};
use crate::db::DbError;
use crate::model::comment::{now_epoch_ms, Comment, CommentId, NewComment, SortOrder};
use crate::search::fts;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) const COMMENT_SELECT_SQL: &str = "SELECT
    id,
    parent_id,
    author,
    content,
    created_at,
    updated_at,
    is_deleted
FROM comments";

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from comment store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target comment does not exist.
    NotFound(CommentId),
    /// Reply target exists but is tombstoned.
    ParentDeleted(CommentId),
    /// Persisted data cannot be converted to a valid comment.
    InvalidData(String),
    /// Full-text index is missing or cannot evaluate the query.
    SearchUnavailable(String),
    /// Retryable fault reported by a non-SQLite backend.
    Transient(String),
}

impl StoreError {
    /// Returns whether the failure is worth retrying.
    ///
    /// SQLite lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`) and explicit
    /// transient faults qualify; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "comment not found: {id}"),
            Self::ParentDeleted(id) => write!(f, "cannot reply to deleted comment {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted comment data: {message}"),
            Self::SearchUnavailable(message) => {
                write!(f, "full-text search unavailable: {message}")
            }
            Self::Transient(message) => write!(f, "transient store failure: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One level of a thread: the children of `parent_id` (roots when `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenQuery {
    pub parent_id: Option<CommentId>,
    /// `None` loads every child.
    pub limit: Option<u32>,
    pub offset: u32,
    pub order: SortOrder,
    pub include_deleted: bool,
}

impl ChildrenQuery {
    /// Paginated, tombstone-free level as requested by a caller.
    pub fn page(parent_id: Option<CommentId>, limit: u32, offset: u32, order: SortOrder) -> Self {
        Self {
            parent_id,
            limit: Some(limit),
            offset,
            order,
            include_deleted: false,
        }
    }

    /// Every reply of `parent_id`, oldest first.
    pub fn replies(parent_id: CommentId, include_deleted: bool) -> Self {
        Self {
            parent_id: Some(parent_id),
            limit: None,
            offset: 0,
            order: SortOrder::Asc,
            include_deleted,
        }
    }
}

/// Matching strategy for comment search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// FTS5 index over content and author, ranked by bm25.
    FullText,
    /// Case-insensitive substring scan over content and author.
    Substring,
}

/// Search request passed to [`CommentStore::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub text: String,
    pub limit: u32,
    pub offset: u32,
    pub mode: SearchMode,
}

/// Persistence port for comment rows.
///
/// Implementations must be shareable across the subtree workers of one
/// thread fetch, hence `Send + Sync`.
pub trait CommentStore: Send + Sync {
    /// Persists a new comment and returns it with assigned `id`/`created_at`.
    ///
    /// The parent check and the insert are one atomic step: a reply whose
    /// parent is absent fails with `NotFound(parent)`, one whose parent is
    /// tombstoned (even by a concurrent delete) with `ParentDeleted(parent)`.
    fn save(&self, comment: &NewComment) -> StoreResult<Comment>;
    /// Loads one comment, tombstoned or not.
    fn find_by_id(&self, id: CommentId) -> StoreResult<Option<Comment>>;
    /// Lists one level of a thread.
    fn find_children(&self, query: &ChildrenQuery) -> StoreResult<Vec<Comment>>;
    /// Tombstones `id` and every transitive descendant, returning how many
    /// rows transitioned.
    fn delete_subtree(&self, id: CommentId, deleted_at: i64) -> StoreResult<usize>;
    /// Flat search over content and author, excluding tombstones.
    fn search(&self, request: &SearchRequest) -> StoreResult<Vec<Comment>>;
}

impl<T: CommentStore + ?Sized> CommentStore for &T {
    fn save(&self, comment: &NewComment) -> StoreResult<Comment> {
        (**self).save(comment)
    }

    fn find_by_id(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        (**self).find_by_id(id)
    }

    fn find_children(&self, query: &ChildrenQuery) -> StoreResult<Vec<Comment>> {
        (**self).find_children(query)
    }

    fn delete_subtree(&self, id: CommentId, deleted_at: i64) -> StoreResult<usize> {
        (**self).delete_subtree(id, deleted_at)
    }

    fn search(&self, request: &SearchRequest) -> StoreResult<Vec<Comment>> {
        (**self).search(request)
    }
}

/// SQLite-backed comment store.
///
/// Owns its connection behind a mutex; statements from concurrent callers
/// are serialized on it.
pub struct SqliteCommentStore {
    conn: Mutex<Connection>,
}

impl SqliteCommentStore {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_comment_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` with exclusive access to the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.lock();
        f(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder cannot leave a half-applied statement behind,
        // so the connection stays usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommentStore for SqliteCommentStore {
    fn save(&self, comment: &NewComment) -> StoreResult<Comment> {
        let mut conn = self.lock();
        // Immediate: a cascade delete from another connection cannot slip
        // between the parent check and the insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(parent_id) = comment.parent_id {
            let parent_deleted = tx
                .query_row(
                    "SELECT is_deleted FROM comments WHERE id = ?1;",
                    [parent_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            match parent_deleted {
                None => return Err(StoreError::NotFound(parent_id)),
                Some(0) => {}
                Some(_) => return Err(StoreError::ParentDeleted(parent_id)),
            }
        }

        tx.execute(
            "INSERT INTO comments (
                parent_id,
                author,
                content,
                created_at,
                updated_at,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, NULL, 0);",
            params![
                comment.parent_id,
                comment.author.as_str(),
                comment.content.as_str(),
                now_epoch_ms(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let saved = load_comment(&tx, id)?.ok_or(StoreError::NotFound(id))?;
        tx.commit()?;
        Ok(saved)
    }

    fn find_by_id(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        let conn = self.lock();
        load_comment(&conn, id)
    }

    fn find_children(&self, query: &ChildrenQuery) -> StoreResult<Vec<Comment>> {
        let mut sql = format!("{COMMENT_SELECT_SQL} WHERE parent_id IS ?");
        let mut bind_values: Vec<Value> = vec![match query.parent_id {
            Some(parent_id) => Value::Integer(parent_id),
            None => Value::Null,
        }];

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        let direction = query.order.as_sql();
        sql.push_str(&format!(" ORDER BY created_at {direction}, id {direction}"));

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(parse_comment_row(row)?);
        }
        Ok(comments)
    }

    fn delete_subtree(&self, id: CommentId, deleted_at: i64) -> StoreResult<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // UNION (not UNION ALL) stops the walk on a cyclic parent chain.
        let changed = tx.execute(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id
                FROM comments
                WHERE id = ?1
                UNION
                SELECT child.id
                FROM comments child
                INNER JOIN subtree parent ON child.parent_id = parent.id
            )
            UPDATE comments
            SET is_deleted = 1,
                updated_at = ?2
            WHERE id IN (SELECT id FROM subtree)
              AND is_deleted = 0;",
            params![id, deleted_at],
        )?;
        tx.commit()?;
        Ok(changed)
    }

    fn search(&self, request: &SearchRequest) -> StoreResult<Vec<Comment>> {
        let conn = self.lock();
        match request.mode {
            SearchMode::FullText => {
                fts::search_full_text(&conn, &request.text, request.limit, request.offset)
            }
            SearchMode::Substring => {
                fts::search_substring(&conn, &request.text, request.limit, request.offset)
            }
        }
    }
}

fn load_comment(conn: &Connection, id: CommentId) -> StoreResult<Option<Comment>> {
    let mut stmt = conn.prepare(&format!("{COMMENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_comment_row(row)?));
    }
    Ok(None)
}

pub(crate) fn parse_comment_row(row: &Row<'_>) -> StoreResult<Comment> {
    let id: CommentId = row.get("id")?;
    if id <= 0 {
        return Err(StoreError::InvalidData(format!(
            "invalid id value `{id}` in comments.id"
        )));
    }

    let deleted = match row.get::<_, i64>("is_deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_deleted value `{other}` in comments.is_deleted"
            )));
        }
    };

    Ok(Comment {
        id,
        parent_id: row.get("parent_id")?,
        author: row.get("author")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted,
        children: Vec::new(),
    })
}

fn ensure_comment_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::InvalidData(format!(
            "comment store requires schema version {expected_version}, got {actual_version}"
        )));
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'comments'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(StoreError::InvalidData(
            "comment store requires table `comments`".to_string(),
        ));
    }
    Ok(())
}
