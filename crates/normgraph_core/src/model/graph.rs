//! Graph-encoded rows.
//!
//! # Responsibility
//! - Define the rows written to the graph store.
//! - Collect rows of one encoding pass into a [`GraphBatch`].
//!
//! # Invariants
//! - `kind` fields carry taxonomy enums, never raw codes.
//! - A batch is written as a unit inside the run transaction.

use crate::model::norm::Audit;
use crate::model::taxonomy::{ItemKind, ReferenceKind, RoleKind, SourceContentKind};
use uuid::Uuid;

/// Generic typed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphItem {
    pub id: Uuid,
    pub kind: ItemKind,
    pub name: String,
    pub description: String,
    pub audit: Audit,
    pub system: bool,
    pub read_only: bool,
}

/// Generic typed directed edge `item1 -> item2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphRole {
    pub item1: Uuid,
    pub kind: RoleKind,
    pub item2: Uuid,
    pub tag: Option<i64>,
}

impl GraphRole {
    pub fn new(item1: Uuid, kind: RoleKind, item2: Uuid) -> Self {
        Self {
            item1,
            kind,
            item2,
            tag: Some(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphExtendedItem {
    pub item_id: Uuid,
    pub properties: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCategory {
    pub item_id: Uuid,
    pub layout: Vec<u8>,
}

/// Text payload of a source item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSource {
    pub item_id: Uuid,
    pub content: SourceContentKind,
    pub plain_text: Option<String>,
    pub length_x: i64,
    pub length_y: Option<i64>,
}

/// Character span inside a source's plain text. `start` is 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextSpan {
    pub start: i64,
    pub length: i64,
}

/// Coded span linking a node item to a source item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNodeReference {
    pub id: Uuid,
    pub node_item_id: Uuid,
    pub source_item_id: Uuid,
    pub reference: ReferenceKind,
    pub span: TextSpan,
    pub audit: Audit,
}

/// Memo attached to a span of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphAnnotation {
    pub id: Uuid,
    pub item_id: Uuid,
    pub text: String,
    pub reference: ReferenceKind,
    pub span: TextSpan,
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphUserProfile {
    pub id: Uuid,
    pub initials: String,
    pub account_name: Option<String>,
}

/// Singleton project row of the graph store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphProject {
    pub title: String,
    pub description: String,
    pub audit: Audit,
}

/// Rows produced by one encoding pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphBatch {
    pub project: Option<GraphProject>,
    pub items: Vec<GraphItem>,
    pub roles: Vec<GraphRole>,
    pub extended_items: Vec<GraphExtendedItem>,
    pub categories: Vec<GraphCategory>,
    pub sources: Vec<GraphSource>,
    pub node_references: Vec<GraphNodeReference>,
    pub annotations: Vec<GraphAnnotation>,
    pub user_profiles: Vec<GraphUserProfile>,
}

impl GraphBatch {
    /// Total number of rows carried by the batch.
    pub fn row_count(&self) -> usize {
        usize::from(self.project.is_some())
            + self.items.len()
            + self.roles.len()
            + self.extended_items.len()
            + self.categories.len()
            + self.sources.len()
            + self.node_references.len()
            + self.annotations.len()
            + self.user_profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Returns whether the batch carries an item with `id`.
    pub fn contains_item(&self, id: Uuid) -> bool {
        self.items.iter().any(|item| item.id == id)
    }
}
