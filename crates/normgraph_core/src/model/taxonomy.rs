//! Type taxonomy for the graph encoding.
//!
//! # Responsibility
//! - Map every symbolic item, role and payload kind to its integer `TypeId`.
//! - Reject integer codes that are not registered.
//!
//! # Invariants
//! - Codes are unique within one family.
//! - No other module spells a numeric code; SQL statements bind values
//!   obtained from this table.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Code family, used to report which table a lookup failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyFamily {
    Item,
    Role,
    SourceContent,
    Reference,
}

impl Display for TaxonomyFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Item => "item",
            Self::Role => "role",
            Self::SourceContent => "source content",
            Self::Reference => "reference",
        };
        f.write_str(label)
    }
}

/// Configuration error raised for codes outside the registered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxonomyError {
    Unregistered { family: TaxonomyFamily, code: i64 },
}

impl Display for TaxonomyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered { family, code } => {
                write!(f, "{family} type code {code} is not registered")
            }
        }
    }
}

impl Error for TaxonomyError {}

/// Kind of a graph `Item` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
    /// System folder; hosts the well-known head categories.
    Folder,
    Source,
    Node,
    AttributeName,
    AttributeValue,
    SourceCategory,
    NodeCategory,
    /// Second node variant, treated as a node for replace/merge signatures.
    AggregateNode,
}

const ITEM_CODES: &[(ItemKind, i64)] = &[
    (ItemKind::Folder, 0),
    (ItemKind::Source, 2),
    (ItemKind::Node, 16),
    (ItemKind::AttributeName, 20),
    (ItemKind::AttributeValue, 21),
    (ItemKind::SourceCategory, 51),
    (ItemKind::NodeCategory, 52),
    (ItemKind::AggregateNode, 62),
];

impl ItemKind {
    /// Kinds that represent a coding node.
    pub const NODE_KINDS: [ItemKind; 2] = [ItemKind::Node, ItemKind::AggregateNode];

    /// Returns the registered `TypeId` for this kind.
    pub fn code(self) -> i64 {
        lookup_code(ITEM_CODES, self)
    }

    /// Resolves a stored `TypeId` back to its kind.
    pub fn from_code(code: i64) -> Result<Self, TaxonomyError> {
        lookup_kind(ITEM_CODES, code).ok_or(TaxonomyError::Unregistered {
            family: TaxonomyFamily::Item,
            code,
        })
    }

    pub fn all() -> impl Iterator<Item = ItemKind> {
        ITEM_CODES.iter().map(|(kind, _)| *kind)
    }
}

/// Kind of a graph `Role` (directed edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleKind {
    /// Parent category -> child category.
    ParentChild,
    /// Attribute name item -> attribute value item.
    AttributeNameToValue,
    /// Owner (node or source) -> attribute value item.
    AttributeValueToOwner,
    /// Attribute name item -> category that defines it.
    AttributeDefinition,
    /// Member (node or source) -> its category.
    CategoryMembership,
}

const ROLE_CODES: &[(RoleKind, i64)] = &[
    (RoleKind::ParentChild, 0),
    (RoleKind::AttributeNameToValue, 6),
    (RoleKind::AttributeValueToOwner, 7),
    (RoleKind::AttributeDefinition, 13),
    (RoleKind::CategoryMembership, 14),
];

impl RoleKind {
    pub fn code(self) -> i64 {
        lookup_code(ROLE_CODES, self)
    }

    pub fn from_code(code: i64) -> Result<Self, TaxonomyError> {
        lookup_kind(ROLE_CODES, code).ok_or(TaxonomyError::Unregistered {
            family: TaxonomyFamily::Role,
            code,
        })
    }

    pub fn all() -> impl Iterator<Item = RoleKind> {
        ROLE_CODES.iter().map(|(kind, _)| *kind)
    }
}

/// Payload type of a graph `Source` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceContentKind {
    PlainText,
}

const SOURCE_CONTENT_CODES: &[(SourceContentKind, i64)] = &[(SourceContentKind::PlainText, 0)];

impl SourceContentKind {
    pub fn code(self) -> i64 {
        lookup_code(SOURCE_CONTENT_CODES, self)
    }

    pub fn from_code(code: i64) -> Result<Self, TaxonomyError> {
        lookup_kind(SOURCE_CONTENT_CODES, code).ok_or(TaxonomyError::Unregistered {
            family: TaxonomyFamily::SourceContent,
            code,
        })
    }
}

/// Region type of a node reference or annotation span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    TextSpan,
}

const REFERENCE_CODES: &[(ReferenceKind, i64)] = &[(ReferenceKind::TextSpan, 0)];

impl ReferenceKind {
    pub fn code(self) -> i64 {
        lookup_code(REFERENCE_CODES, self)
    }

    pub fn from_code(code: i64) -> Result<Self, TaxonomyError> {
        lookup_kind(REFERENCE_CODES, code).ok_or(TaxonomyError::Unregistered {
            family: TaxonomyFamily::Reference,
            code,
        })
    }
}

fn lookup_code<K: Copy + PartialEq>(table: &[(K, i64)], kind: K) -> i64 {
    // Every enum variant has a row; the fallback is unreachable.
    table
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map_or(i64::MIN, |(_, code)| *code)
}

fn lookup_kind<K: Copy>(table: &[(K, i64)], code: i64) -> Option<K> {
    table
        .iter()
        .find(|(_, candidate)| *candidate == code)
        .map(|(kind, _)| *kind)
}

#[cfg(test)]
mod tests {
    use super::{
        ItemKind, ReferenceKind, RoleKind, SourceContentKind, TaxonomyError, TaxonomyFamily,
        ITEM_CODES, ROLE_CODES,
    };
    use std::collections::HashSet;

    #[test]
    fn registered_codes_match_target_schema() {
        assert_eq!(ItemKind::Folder.code(), 0);
        assert_eq!(ItemKind::Source.code(), 2);
        assert_eq!(ItemKind::Node.code(), 16);
        assert_eq!(ItemKind::AggregateNode.code(), 62);
        assert_eq!(ItemKind::AttributeName.code(), 20);
        assert_eq!(ItemKind::AttributeValue.code(), 21);
        assert_eq!(ItemKind::SourceCategory.code(), 51);
        assert_eq!(ItemKind::NodeCategory.code(), 52);

        assert_eq!(RoleKind::ParentChild.code(), 0);
        assert_eq!(RoleKind::AttributeNameToValue.code(), 6);
        assert_eq!(RoleKind::AttributeValueToOwner.code(), 7);
        assert_eq!(RoleKind::AttributeDefinition.code(), 13);
        assert_eq!(RoleKind::CategoryMembership.code(), 14);
    }

    #[test]
    fn codes_are_unique_per_family() {
        let items: HashSet<i64> = ITEM_CODES.iter().map(|(_, code)| *code).collect();
        assert_eq!(items.len(), ITEM_CODES.len());
        let roles: HashSet<i64> = ROLE_CODES.iter().map(|(_, code)| *code).collect();
        assert_eq!(roles.len(), ROLE_CODES.len());
    }

    #[test]
    fn every_kind_resolves_back_from_its_code() {
        for kind in ItemKind::all() {
            assert_eq!(ItemKind::from_code(kind.code()).unwrap(), kind);
        }
        for kind in RoleKind::all() {
            assert_eq!(RoleKind::from_code(kind.code()).unwrap(), kind);
        }
        assert_eq!(
            SourceContentKind::from_code(SourceContentKind::PlainText.code()).unwrap(),
            SourceContentKind::PlainText
        );
        assert_eq!(
            ReferenceKind::from_code(ReferenceKind::TextSpan.code()).unwrap(),
            ReferenceKind::TextSpan
        );
    }

    #[test]
    fn unregistered_code_is_a_configuration_error() {
        let err = RoleKind::from_code(99).unwrap_err();
        assert_eq!(
            err,
            TaxonomyError::Unregistered {
                family: TaxonomyFamily::Role,
                code: 99
            }
        );
        assert!(err.to_string().contains("99"));
        assert!(ItemKind::from_code(1).is_err());
    }
}
