//! Core logic for threadline, a store of threaded comments.
//! This crate owns tree assembly, cascade soft delete and search.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod retry;
pub mod search;
pub mod service;

pub use config::{Config, ConfigError};
pub use logging::{init_from_config, init_logging, logging_status};
pub use model::comment::{Comment, CommentId, NewComment, SortOrder};
pub use repo::comment_repo::{
    ChildrenQuery, CommentStore, SearchMode, SearchRequest, SqliteCommentStore, StoreError,
    StoreResult,
};
pub use retry::RetryPolicy;
pub use search::adapter::SearchAdapter;
pub use service::cascade_deleter::{CascadeDeleter, DeleteOutcome};
pub use service::comment_service::CommentService;
pub use service::error::{CommentServiceError, ServiceResult};
pub use service::tree_assembler::{ExpansionMode, ThreadConfig, ThreadRequest, TreeAssembler};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Opens the configured database and wraps it in a comment service.
pub fn open_service(config: &Config) -> ServiceResult<CommentService<SqliteCommentStore>> {
    let conn = db::open_db_with_timeout(&config.database.path, config.database.busy_timeout())
        .map_err(StoreError::from)?;
    let store = SqliteCommentStore::try_new(conn)?;
    Ok(CommentService::with_config(
        store,
        config.retry.policy(),
        config.thread,
    ))
}

#[cfg(test)]
mod tests {
    use super::{core_version, open_service, Config};

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn open_service_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("comments.sqlite3");

        let service = open_service(&config).unwrap();
        let created = service.create_comment(None, "ann", "hello").unwrap();
        assert_eq!(created.id, 1);
        assert!(config.database.path.exists());
    }
}
