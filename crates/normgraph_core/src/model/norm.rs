//! Normalized project records.
//!
//! # Responsibility
//! - Define one typed record per normalized entity class.
//! - Validate row shape at construction/read time.
//!
//! # Invariants
//! - Ids are optional only where the normalized schema allows missing Ids
//!   (categories, nodes, sources, taggings); the encoder assigns them.
//! - Attribute bindings always name their owner.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Creation/modification audit columns shared by most tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_by: Uuid,
    pub created_date: NaiveDateTime,
    pub modified_by: Uuid,
    pub modified_date: NaiveDateTime,
}

impl Audit {
    /// Audit stamp for a row created and last modified by `user` at `at`.
    pub fn new(user: Uuid, at: NaiveDateTime) -> Self {
        Self {
            created_by: user,
            created_date: at,
            modified_by: user,
            modified_date: at,
        }
    }
}

/// Validation failures for normalized records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormValidationError {
    /// A required text column is blank.
    BlankField {
        entity: &'static str,
        field: &'static str,
    },
    /// A category names itself as parent.
    SelfParent(Uuid),
}

impl Display for NormValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField { entity, field } => {
                write!(f, "{entity}.{field} must not be blank")
            }
            Self::SelfParent(id) => write!(f, "category {id} cannot be its own parent"),
        }
    }
}

impl Error for NormValidationError {}

/// The single project row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub version: Option<String>,
    pub title: String,
    pub description: String,
    pub audit: Audit,
}

/// A node or source category.
///
/// `parent == None` attaches the category under the well-known head
/// category of its family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<Uuid>,
    pub parent: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub audit: Audit,
}

pub type NodeCategory = Category;
pub type SourceCategory = Category;

impl Category {
    pub fn validate(&self) -> Result<(), NormValidationError> {
        if let (Some(id), Some(parent)) = (self.id, self.parent) {
            if id == parent {
                return Err(NormValidationError::SelfParent(id));
            }
        }
        Ok(())
    }
}

/// A coding node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: Option<Uuid>,
    pub category: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub audit: Audit,
}

/// A source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: Option<Uuid>,
    pub category: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub content: Option<String>,
    pub audit: Audit,
}

/// One attribute value bound to a node or source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeBinding {
    pub owner: Uuid,
    pub name: String,
    pub value: String,
    pub audit: Audit,
}

pub type NodeAttribute = AttributeBinding;
pub type SourceAttribute = AttributeBinding;

impl AttributeBinding {
    pub fn validate(&self) -> Result<(), NormValidationError> {
        if self.name.trim().is_empty() {
            return Err(NormValidationError::BlankField {
                entity: "Attribute",
                field: "Name",
            });
        }
        Ok(())
    }
}

/// A coded span (`node` set) or an annotation (`node` unset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tagging {
    pub id: Option<Uuid>,
    pub source: Uuid,
    pub node: Option<Uuid>,
    pub memo: Option<String>,
    /// `start:end`, 1-indexed and inclusive.
    pub fragment: String,
    pub audit: Audit,
}

impl Tagging {
    pub fn validate(&self) -> Result<(), NormValidationError> {
        if self.fragment.trim().is_empty() {
            return Err(NormValidationError::BlankField {
                entity: "Tagging",
                field: "Fragment",
            });
        }
        Ok(())
    }

    pub fn is_annotation(&self) -> bool {
        self.node.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
}

impl User {
    pub fn validate(&self) -> Result<(), NormValidationError> {
        if self.name.trim().is_empty() {
            return Err(NormValidationError::BlankField {
                entity: "User",
                field: "Name",
            });
        }
        Ok(())
    }
}
