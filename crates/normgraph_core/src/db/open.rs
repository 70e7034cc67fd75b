//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections for either store kind.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbResult, StoreKind};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) a normalized project store.
pub fn open_norm_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_file(path.as_ref(), StoreKind::Normalized)
}

/// Opens (or creates) a graph-encoded project store.
pub fn open_graph_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_file(path.as_ref(), StoreKind::Graph)
}

pub fn open_norm_db_in_memory() -> DbResult<Connection> {
    open_memory(StoreKind::Normalized)
}

pub fn open_graph_db_in_memory() -> DbResult<Connection> {
    open_memory(StoreKind::Graph)
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
fn open_file(path: &Path, store: StoreKind) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode=file store={}",
        store.as_str()
    );

    let conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file store={} duration_ms={} error_code=db_open_failed error={}",
                store.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    finish_open(conn, store, "file", started_at)
}

fn open_memory(store: StoreKind) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode=memory store={}",
        store.as_str()
    );

    let conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory store={} duration_ms={} error_code=db_open_failed error={}",
                store.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    finish_open(conn, store, "memory", started_at)
}

fn finish_open(
    mut conn: Connection,
    store: StoreKind,
    mode: &str,
    started_at: Instant,
) -> DbResult<Connection> {
    match bootstrap_connection(&mut conn, store) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} store={} duration_ms={}",
                mode,
                store.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} store={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                store.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, store: StoreKind) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn, store)?;
    Ok(())
}
