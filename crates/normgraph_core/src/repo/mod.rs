//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for both stores.
//! - Isolate SQLite query details from encoding and orchestration.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - Graph Ids are written upper-case; both cases are accepted on read.

use crate::attribute::AttributeError;
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{DbError, StoreKind};
use crate::model::norm::NormValidationError;
use crate::model::taxonomy::TaxonomyError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod graph_repo;
pub mod norm_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence and query operations on either store.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        store: StoreKind,
        expected_version: u32,
        actual_version: u32,
    },
    Validation(NormValidationError),
    Taxonomy(TaxonomyError),
    Attribute(AttributeError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                store,
                expected_version,
                actual_version,
            } => write!(
                f,
                "{} repository requires schema version {expected_version}, got {actual_version}",
                store.as_str()
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Taxonomy(err) => write!(f, "{err}"),
            Self::Attribute(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Taxonomy(err) => Some(err),
            Self::Attribute(err) => Some(err),
            Self::UninitializedConnection { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<NormValidationError> for RepoError {
    fn from(value: NormValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<TaxonomyError> for RepoError {
    fn from(value: TaxonomyError) -> Self {
        Self::Taxonomy(value)
    }
}

impl From<AttributeError> for RepoError {
    fn from(value: AttributeError) -> Self {
        Self::Attribute(value)
    }
}

fn ensure_store_ready(conn: &Connection, store: StoreKind) -> RepoResult<()> {
    let expected_version = latest_version(store);
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            store,
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_opt_uuid(value: Option<String>, column: &'static str) -> RepoResult<Option<Uuid>> {
    value
        .filter(|text| !text.trim().is_empty())
        .map(|text| parse_uuid(&text, column))
        .transpose()
}

fn graph_id(id: Uuid) -> String {
    id.hyphenated().to_string().to_uppercase()
}

fn norm_id(id: Uuid) -> String {
    id.hyphenated().to_string()
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
