use std::sync::atomic::{AtomicUsize, Ordering};
use threadline_core::db::open_db_in_memory;
use threadline_core::{
    ChildrenQuery, Comment, CommentId, CommentService, CommentServiceError, CommentStore,
    NewComment, RetryPolicy, SearchRequest, SqliteCommentStore, StoreError, StoreResult,
    ThreadConfig,
};

fn setup() -> CommentService<SqliteCommentStore> {
    let store = SqliteCommentStore::try_new(open_db_in_memory().unwrap()).unwrap();
    CommentService::new(store)
}

fn load(service: &CommentService<SqliteCommentStore>, id: CommentId) -> Comment {
    service.store().find_by_id(id).unwrap().unwrap()
}

#[test]
fn delete_tombstones_whole_chain_with_one_timestamp() {
    let service = setup();
    let a = service.create_comment(None, "ann", "a").unwrap();
    let b = service.create_comment(Some(a.id), "bob", "b").unwrap();
    let c = service.create_comment(Some(b.id), "cid", "c").unwrap();

    let outcome = service.delete_thread_with_outcome(a.id).unwrap();
    assert_eq!(outcome.id, a.id);
    assert_eq!(outcome.affected, 3);

    let rows = [load(&service, a.id), load(&service, b.id), load(&service, c.id)];
    for row in &rows {
        assert!(row.deleted, "comment {} should be tombstoned", row.id);
        assert_eq!(row.updated_at, Some(outcome.deleted_at));
    }
    assert_eq!(rows[0].content, "a");
}

#[test]
fn repeated_delete_is_a_successful_no_op() {
    let service = setup();
    let root = service.create_comment(None, "ann", "root").unwrap();
    let reply = service.create_comment(Some(root.id), "bob", "reply").unwrap();

    let first = service.delete_thread_with_outcome(root.id).unwrap();
    let stamped = load(&service, reply.id).updated_at;

    let second = service.delete_thread_with_outcome(root.id).unwrap();
    assert_eq!(first.affected, 2);
    assert_eq!(second.affected, 0);
    assert_eq!(load(&service, reply.id).updated_at, stamped);
    service.delete_thread(root.id).unwrap();
}

#[test]
fn delete_leaves_siblings_and_ancestors_live() {
    let service = setup();
    let root = service.create_comment(None, "ann", "root").unwrap();
    let middle = service.create_comment(Some(root.id), "bob", "middle").unwrap();
    let sibling = service.create_comment(Some(root.id), "cid", "sibling").unwrap();
    let leaf = service.create_comment(Some(middle.id), "dee", "leaf").unwrap();
    let other_root = service.create_comment(None, "eve", "other").unwrap();

    let outcome = service.delete_thread_with_outcome(middle.id).unwrap();
    assert_eq!(outcome.affected, 2);

    assert!(load(&service, middle.id).deleted);
    assert!(load(&service, leaf.id).deleted);
    for live in [root.id, sibling.id, other_root.id] {
        let row = load(&service, live);
        assert!(!row.deleted);
        assert_eq!(row.updated_at, None);
    }
}

#[test]
fn partially_deleted_subtree_only_counts_live_rows() {
    let service = setup();
    let root = service.create_comment(None, "ann", "root").unwrap();
    let reply = service.create_comment(Some(root.id), "bob", "reply").unwrap();
    service.create_comment(Some(reply.id), "cid", "leaf").unwrap();
    service.create_comment(Some(root.id), "dee", "other").unwrap();

    assert_eq!(service.delete_thread_with_outcome(reply.id).unwrap().affected, 2);
    assert_eq!(service.delete_thread_with_outcome(root.id).unwrap().affected, 2);
}

#[test]
fn non_positive_ids_are_rejected() {
    let service = setup();
    for id in [0, -7] {
        assert!(matches!(
            service.delete_thread(id),
            Err(CommentServiceError::InvalidArgument(_))
        ));
    }
}

#[test]
fn deleting_unknown_id_affects_nothing() {
    let service = setup();
    let root = service.create_comment(None, "ann", "root").unwrap();

    let outcome = service.delete_thread_with_outcome(root.id + 40).unwrap();
    assert_eq!(outcome.affected, 0);
    assert!(!load(&service, root.id).deleted);
}

#[test]
fn replying_to_tombstoned_comment_is_rejected() {
    let service = setup();
    let root = service.create_comment(None, "ann", "root").unwrap();
    service.delete_thread(root.id).unwrap();

    let err = service
        .create_comment(Some(root.id), "bob", "too late")
        .unwrap_err();
    assert!(matches!(err, CommentServiceError::InvalidArgument(_)));
}

#[test]
fn racing_reply_never_survives_a_finished_cascade_delete() {
    let service = setup();
    for round in 0..300 {
        let root = service
            .create_comment(None, "ann", &format!("root {round}"))
            .unwrap();

        let (created, deleted) = std::thread::scope(|scope| {
            let reply = scope.spawn(|| service.create_comment(Some(root.id), "bob", "racing"));
            let delete = scope.spawn(|| service.delete_thread(root.id));
            (reply.join().unwrap(), delete.join().unwrap())
        });

        deleted.unwrap();
        match created {
            Ok(reply) => assert!(
                load(&service, reply.id).deleted,
                "reply {} outlived the delete of {}",
                reply.id,
                root.id
            ),
            Err(err) => assert!(matches!(err, CommentServiceError::InvalidArgument(_))),
        }
    }

    let live_under_tombstone: i64 = service.store().with_connection(|conn| {
        conn.query_row(
            "SELECT COUNT(*)
             FROM comments child
             JOIN comments parent ON parent.id = child.parent_id
             WHERE child.is_deleted = 0 AND parent.is_deleted = 1;",
            [],
            |row| row.get(0),
        )
        .unwrap()
    });
    assert_eq!(live_under_tombstone, 0);
}

/// Store whose subtree delete always fails with a transient error.
struct BrokenDeleteStore {
    inner: SqliteCommentStore,
    attempts: AtomicUsize,
}

impl CommentStore for BrokenDeleteStore {
    fn save(&self, comment: &NewComment) -> StoreResult<Comment> {
        self.inner.save(comment)
    }

    fn find_by_id(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        self.inner.find_by_id(id)
    }

    fn find_children(&self, query: &ChildrenQuery) -> StoreResult<Vec<Comment>> {
        self.inner.find_children(query)
    }

    fn delete_subtree(&self, _id: CommentId, _deleted_at: i64) -> StoreResult<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Transient("database is locked".to_string()))
    }

    fn search(&self, request: &SearchRequest) -> StoreResult<Vec<Comment>> {
        self.inner.search(request)
    }
}

#[test]
fn store_failure_is_passed_through_after_retries() {
    let store = BrokenDeleteStore {
        inner: SqliteCommentStore::try_new(open_db_in_memory().unwrap()).unwrap(),
        attempts: AtomicUsize::new(0),
    };
    let retry = RetryPolicy {
        attempts: 2,
        base_delay: std::time::Duration::from_millis(1),
        backoff_factor: 1.0,
    };
    let service = CommentService::with_config(store, retry, ThreadConfig::default());
    let root = service.create_comment(None, "ann", "root").unwrap();

    let err = service.delete_thread(root.id).unwrap_err();
    assert!(matches!(
        err,
        CommentServiceError::Store(StoreError::Transient(_))
    ));
    assert_eq!(service.store().attempts.load(Ordering::SeqCst), 2);
    assert!(!service.store().find_by_id(root.id).unwrap().unwrap().deleted);
}
