//! Core of normgraph: normalized qualitative-data store to Item/Role graph
//! store transcoding, plus tabular import of sources into the normalized
//! store.

pub mod attribute;
pub mod db;
pub mod encode;
pub mod logging;
pub mod model;
pub mod policy;
pub mod repo;
pub mod service;
pub mod text_codec;

pub use attribute::{AttributeDescriptor, AttributeError, AttributeType};
pub use db::{open_graph_db, open_norm_db, run_in_transaction, DbError, DbResult};
pub use encode::{EncodeError, GraphEncoder};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use policy::{ActionPlan, ActionPolicy, EntityClass, PolicyError};
pub use repo::graph_repo::{GraphRepository, SqliteGraphRepository};
pub use repo::norm_repo::{NormRepository, SqliteNormRepository};
pub use repo::{RepoError, RepoResult};
pub use service::import_service::{
    run_import, ImportError, ImportOptions, ImportReport, TabularInput, TabularRow,
};
pub use service::transcode_service::{
    run_transcode, TranscodeError, TranscodeOptions, TranscodeReport,
};
pub use text_codec::TextCorrector;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
