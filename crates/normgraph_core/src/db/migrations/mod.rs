//! SQLite migration registries and executor.
//!
//! # Responsibility
//! - Register schema migrations per store kind in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Rebuild the graph schema from scratch inside a caller transaction.
//!
//! # Invariants
//! - `version` values must remain monotonic within one registry.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult, StoreKind};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const NORM_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("norm_0001_init.sql"),
}];

const GRAPH_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("graph_0001_init.sql"),
}];

/// Graph tables in drop order (referencing tables first).
pub const GRAPH_TABLES: &[&str] = &[
    "NodeReference",
    "Annotation",
    "Source",
    "Category",
    "ExtendedItem",
    "Role",
    "UserProfile",
    "Project",
    "Item",
];

fn registry(store: StoreKind) -> &'static [Migration] {
    match store {
        StoreKind::Normalized => NORM_MIGRATIONS,
        StoreKind::Graph => GRAPH_MIGRATIONS,
    }
}

/// Returns the latest migration version known by this binary for `store`.
pub fn latest_version(store: StoreKind) -> u32 {
    registry(store)
        .last()
        .map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection, store: StoreKind) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version(store);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            store,
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    apply_from(&tx, store, current_version)?;
    tx.commit()?;

    Ok(())
}

/// Drops every graph table and re-applies the graph migrations.
///
/// Runs on the caller's connection or transaction so that a failed run also
/// restores the previous structure.
pub fn rebuild_graph_schema(conn: &Connection) -> DbResult<()> {
    for table in GRAPH_TABLES {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))?;
    }
    conn.execute_batch("PRAGMA user_version = 0;")?;
    apply_from(conn, StoreKind::Graph, 0)
}

fn apply_from(conn: &Connection, store: StoreKind, current_version: u32) -> DbResult<()> {
    for migration in registry(store) {
        if migration.version <= current_version {
            continue;
        }

        conn.execute_batch(migration.sql)?;
        conn.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
