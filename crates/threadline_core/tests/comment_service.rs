use threadline_core::db::{open_db, open_db_in_memory};
use threadline_core::{
    CommentService, CommentServiceError, CommentStore, SortOrder, SqliteCommentStore,
    ThreadRequest,
};

fn setup() -> CommentService<SqliteCommentStore> {
    let store = SqliteCommentStore::try_new(open_db_in_memory().unwrap()).unwrap();
    CommentService::new(store)
}

fn open_file_service(path: &std::path::Path) -> CommentService<SqliteCommentStore> {
    CommentService::new(SqliteCommentStore::try_new(open_db(path).unwrap()).unwrap())
}

#[test]
fn create_root_and_reply() {
    let service = setup();
    let root = service.create_comment(None, "  ann  ", " hello ").unwrap();
    assert!(root.is_root());
    assert_eq!(root.author, "ann");
    assert_eq!(root.content, "hello");
    assert!(!root.deleted);
    assert_eq!(root.updated_at, None);
    assert!(root.created_at > 0);

    let reply = service.create_comment(Some(root.id), "bob", "hi").unwrap();
    assert_eq!(reply.parent_id, Some(root.id));
    assert!(reply.id > root.id);

    let stored = service.store().find_by_id(reply.id).unwrap().unwrap();
    assert_eq!(stored, reply);
}

#[test]
fn blank_author_or_content_is_rejected() {
    let service = setup();
    for (author, content) in [("", "text"), ("   ", "text"), ("ann", ""), ("ann", " \n ")] {
        assert!(matches!(
            service.create_comment(None, author, content),
            Err(CommentServiceError::InvalidArgument(_))
        ));
    }
}

#[test]
fn oversized_content_is_rejected() {
    let service = setup();
    let body = "x".repeat(10_001);
    assert!(matches!(
        service.create_comment(None, "ann", &body),
        Err(CommentServiceError::InvalidArgument(_))
    ));
}

#[test]
fn reply_to_missing_parent_is_not_found() {
    let service = setup();
    match service.create_comment(Some(99), "ann", "orphan") {
        Err(CommentServiceError::NotFound(id)) => assert_eq!(id, 99),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(matches!(
        service.create_comment(Some(0), "ann", "orphan"),
        Err(CommentServiceError::InvalidArgument(_))
    ));
}

#[test]
fn get_comment_includes_tombstones() {
    let service = setup();
    let root = service.create_comment(None, "ann", "root").unwrap();
    let reply = service.create_comment(Some(root.id), "bob", "reply").unwrap();
    service.delete_thread(root.id).unwrap();

    let loaded = service.get_comment(root.id).unwrap().unwrap();
    assert!(loaded.deleted);
    assert_eq!(loaded.children.len(), 1);
    assert_eq!(loaded.children[0].id, reply.id);
    assert_eq!(loaded.subtree_len(), 2);
    assert!(matches!(
        service.get_comment(-1),
        Err(CommentServiceError::InvalidArgument(_))
    ));
}

#[test]
fn non_positive_thread_parent_is_rejected() {
    let service = setup();
    assert!(matches!(
        service.get_thread(&ThreadRequest::replies_of(0, 10, 0, SortOrder::Asc)),
        Err(CommentServiceError::InvalidArgument(_))
    ));
}

#[test]
fn comments_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comments.sqlite3");

    let root_id = {
        let service = open_file_service(&path);
        let root = service.create_comment(None, "ann", "persisted").unwrap();
        service.create_comment(Some(root.id), "bob", "reply").unwrap();
        root.id
    };

    let service = open_file_service(&path);
    let thread = service
        .get_thread(&ThreadRequest::roots(10, 0, SortOrder::Desc))
        .unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].id, root_id);
    assert_eq!(thread[0].children.len(), 1);
    assert_eq!(service.search_comments("persisted", 10, 0).unwrap().len(), 1);
}

#[test]
fn comment_serializes_without_empty_children() {
    let service = setup();
    let root = service.create_comment(None, "ann", "root").unwrap();

    let json = serde_json::to_value(&root).unwrap();
    assert_eq!(json["author"], "ann");
    assert!(json.get("children").is_none());
    assert!(json.get("updated_at").is_none());
}
