//! Normalized-to-graph transcoding run.
//!
//! # Responsibility
//! - Drive every entity class through prepare, reconcile, encode and insert
//!   in fixed order.
//! - Check referential integrity before the run commits.
//!
//! # Invariants
//! - The whole run shares one graph transaction; any error rolls it back.
//! - A skipped class is neither read nor written.
//! - Deletion of a class precedes its insertion.

use crate::db::migrations::rebuild_graph_schema;
use crate::db::{run_in_transaction, DbError};
use crate::encode::{
    annotation_keys, attribute_keys, id_keys, reference_keys, user_keys, EncodeError,
    GraphEncoder,
};
use crate::model::graph::GraphBatch;
use crate::model::norm::Tagging;
use crate::policy::{reconcile, ActionPlan, ActionPolicy, EntityClass, PolicyError};
use crate::repo::graph_repo::{DanglingReference, GraphRepository, SqliteGraphRepository};
use crate::repo::norm_repo::{NormRepository, SqliteNormRepository};
use crate::repo::RepoError;
use crate::text_codec::TextCorrector;
use log::{error, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Options of one transcoding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    pub plan: ActionPlan,
    /// Shift free text by the codepoint correction before writing.
    pub correct_text: bool,
    /// Drop and recreate the graph tables before encoding.
    pub rebuild_structure: bool,
}

/// Outcome of one entity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassReport {
    pub class: EntityClass,
    pub policy: ActionPolicy,
    pub deleted: usize,
    pub inserted: usize,
}

/// Outcome of a transcoding run, one entry per class in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscodeReport {
    pub rebuilt: bool,
    pub classes: Vec<ClassReport>,
}

impl TranscodeReport {
    pub fn class(&self, class: EntityClass) -> Option<&ClassReport> {
        self.classes.iter().find(|report| report.class == class)
    }

    pub fn total_inserted(&self) -> usize {
        self.classes.iter().map(|report| report.inserted).sum()
    }
}

#[derive(Debug)]
pub enum TranscodeError {
    Db(DbError),
    Repo(RepoError),
    Encode(EncodeError),
    Policy(PolicyError),
    /// Rows left pointing at missing items when the run finished.
    DanglingReferences(Vec<DanglingReference>),
}

impl Display for TranscodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "{err}"),
            Self::Policy(err) => write!(f, "{err}"),
            Self::DanglingReferences(references) => {
                write!(f, "{} dangling reference(s)", references.len())?;
                if let Some(first) = references.first() {
                    write!(
                        f,
                        ", first in {} row {} (missing {})",
                        first.table, first.row_id, first.parent
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl Error for TranscodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::Policy(err) => Some(err),
            Self::DanglingReferences(_) => None,
        }
    }
}

impl From<DbError> for TranscodeError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for TranscodeError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<EncodeError> for TranscodeError {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<PolicyError> for TranscodeError {
    fn from(value: PolicyError) -> Self {
        Self::Policy(value)
    }
}

/// Transcodes the normalized store on `norm` into the graph store on `graph`.
///
/// # Side effects
/// - Writes the graph store inside one transaction.
/// - Emits `transcode_run` and `transcode_class` logging events.
pub fn run_transcode(
    norm: &Connection,
    graph: &mut Connection,
    options: &TranscodeOptions,
) -> Result<TranscodeReport, TranscodeError> {
    let started_at = Instant::now();
    info!(
        "event=transcode_run module=service status=start correct_text={} rebuild={}",
        options.correct_text, options.rebuild_structure
    );

    let norm_repo = SqliteNormRepository::try_new(norm)?;
    let result = run_in_transaction(graph, "transcode", |tx| {
        if options.rebuild_structure {
            rebuild_graph_schema(tx)?;
        }
        let graph_repo = SqliteGraphRepository::try_new(tx)?;
        let mut report = TranscodeService::new(&norm_repo, &graph_repo, options).run()?;
        report.rebuilt = options.rebuild_structure;
        Ok(report)
    });

    match &result {
        Ok(report) => info!(
            "event=transcode_run module=service status=ok duration_ms={} inserted={}",
            started_at.elapsed().as_millis(),
            report.total_inserted()
        ),
        Err(err) => error!(
            "event=transcode_run module=service status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

/// Transcoding service facade over repository implementations.
pub struct TranscodeService<'a, N: NormRepository, G: GraphRepository> {
    norm: &'a N,
    graph: &'a G,
    options: &'a TranscodeOptions,
}

impl<'a, N: NormRepository, G: GraphRepository> TranscodeService<'a, N, G> {
    pub fn new(norm: &'a N, graph: &'a G, options: &'a TranscodeOptions) -> Self {
        Self {
            norm,
            graph,
            options,
        }
    }

    /// Runs every class, then checks for dangling references.
    ///
    /// Does not commit; callers own the transaction.
    pub fn run(&self) -> Result<TranscodeReport, TranscodeError> {
        let mut encoder =
            GraphEncoder::new(self.graph, TextCorrector::new(self.options.correct_text));
        let mut report = TranscodeReport::default();

        for class in EntityClass::ALL {
            let policy = self.options.plan.policy_for(class);
            if policy == ActionPolicy::Skip {
                info!(
                    "event=transcode_class module=service status=skip class={}",
                    class.as_str()
                );
                report.classes.push(ClassReport {
                    class,
                    policy,
                    deleted: 0,
                    inserted: 0,
                });
                continue;
            }

            let started_at = Instant::now();
            let (deleted, inserted) = self.run_class(&mut encoder, class, policy)?;
            info!(
                "event=transcode_class module=service status=ok class={} policy={} deleted={} inserted={} duration_ms={}",
                class.as_str(),
                policy.as_str(),
                deleted,
                inserted,
                started_at.elapsed().as_millis()
            );
            report.classes.push(ClassReport {
                class,
                policy,
                deleted,
                inserted,
            });
        }

        let dangling = self.graph.dangling_references()?;
        if !dangling.is_empty() {
            return Err(TranscodeError::DanglingReferences(dangling));
        }
        Ok(report)
    }

    fn run_class(
        &self,
        encoder: &mut GraphEncoder<'_, G>,
        class: EntityClass,
        policy: ActionPolicy,
    ) -> Result<(usize, usize), TranscodeError> {
        match class {
            EntityClass::Project => {
                let batch = encoder.encode_project(self.norm.load_projects()?)?;
                Ok((0, self.insert(batch.as_ref())?))
            }
            EntityClass::NodeCategories | EntityClass::SourceCategories => {
                let rows = if class == EntityClass::NodeCategories {
                    self.norm.load_node_categories()?
                } else {
                    self.norm.load_source_categories()?
                };
                let prepared = encoder.prepare_categories(class, rows, policy)?;
                let deleted = reconcile(self.graph, class, policy, &id_keys(&prepared))?;
                let batch = encoder.encode_categories(class, &prepared)?;
                Ok((deleted, self.insert(Some(&batch))?))
            }
            EntityClass::Nodes => {
                let prepared = encoder.prepare_nodes(self.norm.load_nodes()?, policy)?;
                let deleted = reconcile(self.graph, class, policy, &id_keys(&prepared))?;
                let batch = encoder.encode_nodes(&prepared)?;
                Ok((deleted, self.insert(Some(&batch))?))
            }
            EntityClass::Sources => {
                let prepared = encoder.prepare_sources(self.norm.load_sources()?, policy)?;
                let deleted = reconcile(self.graph, class, policy, &id_keys(&prepared))?;
                let batch = encoder.encode_sources(&prepared)?;
                Ok((deleted, self.insert(Some(&batch))?))
            }
            EntityClass::NodeAttributes | EntityClass::SourceAttributes => {
                let rows = if class == EntityClass::NodeAttributes {
                    self.norm.load_node_attributes()?
                } else {
                    self.norm.load_source_attributes()?
                };
                let prepared = encoder.prepare_attributes(class, rows)?;
                let deleted = reconcile(self.graph, class, policy, &attribute_keys(&prepared))?;
                let batch = encoder.encode_attributes(class, &prepared)?;
                Ok((deleted, self.insert(Some(&batch))?))
            }
            EntityClass::Taggings | EntityClass::Annotations => {
                let annotations = class == EntityClass::Annotations;
                let rows: Vec<Tagging> = self
                    .norm
                    .load_taggings()?
                    .into_iter()
                    .filter(|tagging| tagging.is_annotation() == annotations)
                    .collect();
                let prepared = encoder.prepare_taggings(class, rows)?;
                let keys = if annotations {
                    annotation_keys(&prepared)
                } else {
                    reference_keys(&prepared)
                };
                let deleted = reconcile(self.graph, class, policy, &keys)?;
                let batch = encoder.encode_taggings(class, &prepared)?;
                Ok((deleted, self.insert(Some(&batch))?))
            }
            EntityClass::Users => {
                let users = self.norm.load_users()?;
                let deleted = reconcile(self.graph, class, policy, &user_keys(&users))?;
                let batch = encoder.encode_users(&users)?;
                Ok((deleted, self.insert(Some(&batch))?))
            }
        }
    }

    fn insert(&self, batch: Option<&GraphBatch>) -> Result<usize, TranscodeError> {
        match batch {
            Some(batch) if !batch.is_empty() => Ok(self.graph.insert_batch(batch)?),
            _ => Ok(0),
        }
    }
}
