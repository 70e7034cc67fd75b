use normgraph_core::db::migrations::{latest_version, rebuild_graph_schema};
use normgraph_core::db::{
    open_graph_db, open_graph_db_in_memory, open_norm_db, open_norm_db_in_memory, DbError,
    StoreKind,
};
use normgraph_core::{RepoError, SqliteGraphRepository, SqliteNormRepository};
use rusqlite::Connection;

#[test]
fn norm_store_in_memory_applies_all_migrations() {
    let conn = open_norm_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version(StoreKind::Normalized));
    for table in [
        "Project",
        "User",
        "NodeCategory",
        "Node",
        "NodeAttribute",
        "NodeValue",
        "SourceCategory",
        "Source",
        "SourceAttribute",
        "SourceValue",
        "Tagging",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn graph_store_in_memory_applies_all_migrations() {
    let conn = open_graph_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version(StoreKind::Graph));
    for table in [
        "Item",
        "Role",
        "ExtendedItem",
        "Category",
        "Source",
        "NodeReference",
        "Annotation",
        "UserProfile",
        "Project",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_store_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.nvivo");

    let first = open_graph_db(&path).unwrap();
    assert_eq!(schema_version(&first), latest_version(StoreKind::Graph));
    drop(first);

    let second = open_graph_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version(StoreKind::Graph));
    assert_table_exists(&second, "Role");
}

#[test]
fn opening_store_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.norm");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_norm_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            store,
            db_version,
            latest_supported,
        } => {
            assert_eq!(store, StoreKind::Normalized);
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version(StoreKind::Normalized));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn foreign_keys_are_enforced_on_open() {
    let conn = open_graph_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
}

#[test]
fn rebuild_recreates_empty_graph_tables() {
    let conn = open_graph_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO UserProfile (Id, Initials, AccountName) VALUES ('A', 'A', 'a');",
        [],
    )
    .unwrap();

    rebuild_graph_schema(&conn).unwrap();

    assert_eq!(schema_version(&conn), latest_version(StoreKind::Graph));
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM UserProfile;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn repositories_reject_unmigrated_connections() {
    let conn = Connection::open_in_memory().unwrap();

    assert!(matches!(
        SqliteGraphRepository::try_new(&conn),
        Err(RepoError::UninitializedConnection { .. })
    ));
    assert!(matches!(
        SqliteNormRepository::try_new(&conn),
        Err(RepoError::UninitializedConnection { .. })
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
