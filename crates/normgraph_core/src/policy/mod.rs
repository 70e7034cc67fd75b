//! Per-entity-class action policies for re-runs against an existing graph.
//!
//! # Responsibility
//! - Name the entity classes of a transcoding run in their fixed order.
//! - Hold the skip/replace/merge decision per class.
//! - Delete previously generated rows before a class is re-inserted.
//!
//! # Invariants
//! - `skip` performs no reads and no writes.
//! - `replace` deletes every row of the class signature.
//! - `merge` deletes only rows matching keys of the current batch.
//! - Deletion runs before insertion inside the caller's transaction.

use crate::model::taxonomy::ItemKind;
use crate::repo::graph_repo::{AttributeKey, DeleteScope, GraphRepository, ReferenceKey};
use crate::repo::RepoError;
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// What a run does with the existing graph rows of one entity class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPolicy {
    Skip,
    #[default]
    Replace,
    Merge,
}

impl ActionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Replace => "replace",
            Self::Merge => "merge",
        }
    }
}

impl Display for ActionPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionPolicy {
    type Err = PolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            _ => Err(PolicyError::UnknownPolicy(value.to_string())),
        }
    }
}

/// Entity classes of a transcoding run, in processing order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Project,
    NodeCategories,
    Nodes,
    NodeAttributes,
    SourceCategories,
    Sources,
    SourceAttributes,
    Taggings,
    Annotations,
    Users,
}

impl EntityClass {
    /// Every class in the order a run processes them.
    pub const ALL: [EntityClass; 10] = [
        EntityClass::Project,
        EntityClass::NodeCategories,
        EntityClass::Nodes,
        EntityClass::NodeAttributes,
        EntityClass::SourceCategories,
        EntityClass::Sources,
        EntityClass::SourceAttributes,
        EntityClass::Taggings,
        EntityClass::Annotations,
        EntityClass::Users,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::NodeCategories => "node_categories",
            Self::Nodes => "nodes",
            Self::NodeAttributes => "node_attributes",
            Self::SourceCategories => "source_categories",
            Self::Sources => "sources",
            Self::SourceAttributes => "source_attributes",
            Self::Taggings => "taggings",
            Self::Annotations => "annotations",
            Self::Users => "users",
        }
    }
}

impl Display for EntityClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy decision per entity class. Every class defaults to `replace`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPlan {
    pub project: ActionPolicy,
    pub node_categories: ActionPolicy,
    pub nodes: ActionPolicy,
    pub node_attributes: ActionPolicy,
    pub source_categories: ActionPolicy,
    pub sources: ActionPolicy,
    pub source_attributes: ActionPolicy,
    pub taggings: ActionPolicy,
    pub annotations: ActionPolicy,
    pub users: ActionPolicy,
}

impl ActionPlan {
    /// Plan applying `policy` to every class.
    pub fn uniform(policy: ActionPolicy) -> Self {
        let mut plan = Self::default();
        for class in EntityClass::ALL {
            plan.set(class, policy);
        }
        plan
    }

    pub fn policy_for(&self, class: EntityClass) -> ActionPolicy {
        match class {
            EntityClass::Project => self.project,
            EntityClass::NodeCategories => self.node_categories,
            EntityClass::Nodes => self.nodes,
            EntityClass::NodeAttributes => self.node_attributes,
            EntityClass::SourceCategories => self.source_categories,
            EntityClass::Sources => self.sources,
            EntityClass::SourceAttributes => self.source_attributes,
            EntityClass::Taggings => self.taggings,
            EntityClass::Annotations => self.annotations,
            EntityClass::Users => self.users,
        }
    }

    pub fn set(&mut self, class: EntityClass, policy: ActionPolicy) {
        let slot = match class {
            EntityClass::Project => &mut self.project,
            EntityClass::NodeCategories => &mut self.node_categories,
            EntityClass::Nodes => &mut self.nodes,
            EntityClass::NodeAttributes => &mut self.node_attributes,
            EntityClass::SourceCategories => &mut self.source_categories,
            EntityClass::Sources => &mut self.sources,
            EntityClass::SourceAttributes => &mut self.source_attributes,
            EntityClass::Taggings => &mut self.taggings,
            EntityClass::Annotations => &mut self.annotations,
            EntityClass::Users => &mut self.users,
        };
        *slot = policy;
    }

    pub fn with(mut self, class: EntityClass, policy: ActionPolicy) -> Self {
        self.set(class, policy);
        self
    }
}

/// Identity of the rows a merge run replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeKeys {
    /// The class has no keyed rows (singleton project).
    None,
    /// Item or profile Ids.
    Ids(Vec<Uuid>),
    Attributes(Vec<AttributeKey>),
    References(Vec<ReferenceKey>),
}

#[derive(Debug)]
pub enum PolicyError {
    /// Policy name outside skip/replace/merge.
    UnknownPolicy(String),
    /// Merge keys of the wrong shape were supplied for a class.
    KeyMismatch { class: EntityClass },
    Repo(RepoError),
}

impl Display for PolicyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPolicy(value) => {
                write!(f, "unknown action `{value}`, expected skip, replace or merge")
            }
            Self::KeyMismatch { class } => {
                write!(f, "merge keys do not match entity class {class}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PolicyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::UnknownPolicy(_) | Self::KeyMismatch { .. } => None,
        }
    }
}

impl From<RepoError> for PolicyError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Removes existing graph rows of `class` according to `policy`.
///
/// Returns the number of deleted rows. `keys` is only read under `merge`.
pub fn reconcile<G: GraphRepository>(
    repo: &G,
    class: EntityClass,
    policy: ActionPolicy,
    keys: &MergeKeys,
) -> Result<usize, PolicyError> {
    let deleted = match policy {
        ActionPolicy::Skip => return Ok(0),
        ActionPolicy::Replace => delete_class(repo, class, None)?,
        ActionPolicy::Merge => delete_class(repo, class, Some(keys))?,
    };

    info!(
        "event=policy_reconcile module=policy status=ok class={} policy={} deleted={}",
        class.as_str(),
        policy.as_str(),
        deleted
    );
    Ok(deleted)
}

fn delete_class<G: GraphRepository>(
    repo: &G,
    class: EntityClass,
    keys: Option<&MergeKeys>,
) -> Result<usize, PolicyError> {
    let mismatch = || PolicyError::KeyMismatch { class };
    let ids = |keys: Option<&MergeKeys>| -> Result<Option<Vec<Uuid>>, PolicyError> {
        match keys {
            None => Ok(None),
            Some(MergeKeys::Ids(ids)) => Ok(Some(ids.clone())),
            Some(_) => Err(mismatch()),
        }
    };

    let deleted = match class {
        EntityClass::Project => 0,
        EntityClass::NodeCategories => {
            let ids = ids(keys)?;
            repo.delete_categories(ItemKind::NodeCategory, id_scope(&ids))?
        }
        EntityClass::SourceCategories => {
            let ids = ids(keys)?;
            repo.delete_categories(ItemKind::SourceCategory, id_scope(&ids))?
        }
        EntityClass::Nodes => {
            let ids = ids(keys)?;
            repo.delete_nodes(id_scope(&ids))?
        }
        EntityClass::Sources => {
            let ids = ids(keys)?;
            repo.delete_sources(id_scope(&ids))?
        }
        EntityClass::Annotations => {
            let ids = ids(keys)?;
            repo.delete_annotations(id_scope(&ids))?
        }
        EntityClass::Users => {
            let ids = ids(keys)?;
            repo.delete_user_profiles(id_scope(&ids))?
        }
        EntityClass::NodeAttributes | EntityClass::SourceAttributes => {
            let owner_kinds: &[ItemKind] = if class == EntityClass::NodeAttributes {
                &ItemKind::NODE_KINDS
            } else {
                &[ItemKind::Source]
            };
            match keys {
                None => repo.delete_attribute_values(owner_kinds, DeleteScope::All)?,
                Some(MergeKeys::Attributes(keys)) => {
                    repo.delete_attribute_values(owner_kinds, DeleteScope::Keys(keys))?
                }
                Some(_) => return Err(mismatch()),
            }
        }
        EntityClass::Taggings => match keys {
            None => repo.delete_node_references(DeleteScope::All)?,
            Some(MergeKeys::References(keys)) => {
                repo.delete_node_references(DeleteScope::Keys(keys))?
            }
            Some(_) => return Err(mismatch()),
        },
    };
    Ok(deleted)
}

fn id_scope(ids: &Option<Vec<Uuid>>) -> DeleteScope<'_, Uuid> {
    match ids {
        None => DeleteScope::All,
        Some(ids) => DeleteScope::Keys(ids),
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionPlan, ActionPolicy, EntityClass};

    #[test]
    fn default_plan_replaces_every_class() {
        let plan = ActionPlan::default();
        for class in EntityClass::ALL {
            assert_eq!(plan.policy_for(class), ActionPolicy::Replace);
        }
    }

    #[test]
    fn set_changes_only_the_named_class() {
        let plan = ActionPlan::default().with(EntityClass::Taggings, ActionPolicy::Skip);
        assert_eq!(plan.policy_for(EntityClass::Taggings), ActionPolicy::Skip);
        assert_eq!(plan.policy_for(EntityClass::Annotations), ActionPolicy::Replace);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Merge".parse::<ActionPolicy>().unwrap(), ActionPolicy::Merge);
        assert_eq!(" skip ".parse::<ActionPolicy>().unwrap(), ActionPolicy::Skip);
        assert!("upsert".parse::<ActionPolicy>().is_err());
    }

    #[test]
    fn class_order_starts_with_project_and_ends_with_users() {
        assert_eq!(EntityClass::ALL.first(), Some(&EntityClass::Project));
        assert_eq!(EntityClass::ALL.last(), Some(&EntityClass::Users));
        assert_eq!(EntityClass::SourceAttributes.as_str(), "source_attributes");
    }

    #[test]
    fn plan_deserializes_partial_config_with_replace_defaults() {
        let plan: ActionPlan =
            serde_json::from_str(r#"{"users":"skip","taggings":"merge"}"#).unwrap();
        assert_eq!(plan.policy_for(EntityClass::Users), ActionPolicy::Skip);
        assert_eq!(plan.policy_for(EntityClass::Taggings), ActionPolicy::Merge);
        assert_eq!(plan.policy_for(EntityClass::Project), ActionPolicy::Replace);

        let json = serde_json::to_value(plan).unwrap();
        assert_eq!(json["node_categories"], "replace");
    }
}
