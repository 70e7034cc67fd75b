//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the normalized and the graph
//!   store.
//! - Apply schema migrations in deterministic order.
//! - Provide the run-scoped transaction helper.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`, per store.
//! - Core code must not read/write project data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
pub mod scope;

pub use open::{open_graph_db, open_graph_db_in_memory, open_norm_db, open_norm_db_in_memory};
pub use scope::run_in_transaction;

pub type DbResult<T> = Result<T, DbError>;

/// Which schema a connection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Normalized project tables (input of transcoding, output of import).
    Normalized,
    /// Generic Item/Role graph tables.
    Graph,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normalized => "norm",
            Self::Graph => "graph",
        }
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        store: StoreKind,
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                store,
                db_version,
                latest_supported,
            } => write!(
                f,
                "{} database schema version {db_version} is newer than supported {latest_supported}",
                store.as_str()
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
