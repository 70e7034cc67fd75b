//! Normalized-to-graph encoding.
//!
//! # Responsibility
//! - Assign stable Ids to normalized rows that lack one.
//! - Map each normalized entity class onto generic items, roles and payload
//!   rows.
//! - Resolve every referenced Id against the current run or the graph store.
//!
//! # Invariants
//! - Encoding is two-phase: `prepare_*` assigns Ids and applies text
//!   correction before any delete; `encode_*` resolves references after the
//!   class has been reconciled.
//! - A category without parent hangs under its family's head category; the
//!   head item is co-inserted when the store has none.
//! - A reference that resolves neither in the run nor in the store is fatal.

use crate::model::graph::{
    GraphBatch, GraphCategory, GraphExtendedItem, GraphItem, GraphProject, GraphRole,
    GraphSource, GraphUserProfile,
};
use crate::model::norm::{Audit, AttributeBinding, Category, Node, Project, Source, Tagging, User};
use crate::model::taxonomy::{ItemKind, RoleKind, SourceContentKind};
use crate::policy::{ActionPolicy, EntityClass, MergeKeys};
use crate::repo::graph_repo::{AttributeKey, GraphRepository, ReferenceKey};
use crate::repo::RepoError;
use crate::text_codec::{TextCodecError, TextCorrector};
use log::warn;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod tagging;

use tagging::{replay_span, ReplayedSpan, SpanError};

/// Name of the folder item that parents top-level node categories.
pub const NODE_HEAD_CATEGORY: &str = "Node Classifications";
/// Name of the folder item that parents top-level source categories.
pub const SOURCE_HEAD_CATEGORY: &str = "Source Classifications";
/// Id used for the node head category when the store has none.
pub const NODE_HEAD_FALLBACK_ID: Uuid =
    Uuid::from_u128(0x987E_FFB2_CC02_469B_9BB3_E345_BB8F_8362);

/// Default extended-property payload of a new category item.
pub const DEFAULT_EXTENDED_PROPERTIES: &str = r#"<Properties xmlns="http://qsr.com.au/XMLSchema.xsd"><Property Key="EndNoteReferenceType" Value="-1" /></Properties>"#;
/// Default layout payload of a new category item.
pub const DEFAULT_CATEGORY_LAYOUT: &str = r#"<CategoryLayout xmlns="http://qsr.com.au/XMLSchema.xsd"><SortedColumn Ascending="true">-1</SortedColumn><RecordHeaderWidth>100</RecordHeaderWidth><ShowRowIDs>true</ShowRowIDs><ShowColumnIDs>true</ShowColumnIDs><Transposed>false</Transposed><NameSource>1</NameSource><RowsUserOrdered>false</RowsUserOrdered><ColumnsUserOrdered>true</ColumnsUserOrdered></CategoryLayout>"#;

/// Id used for the source head category when the store has none.
pub fn source_head_fallback_id() -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, SOURCE_HEAD_CATEGORY.as_bytes())
}

pub type EncodeResult<T> = Result<T, EncodeError>;

#[derive(Debug)]
pub enum EncodeError {
    /// A referenced Id is neither in the current run nor in the store.
    Unresolved {
        class: EntityClass,
        field: &'static str,
        id: Uuid,
    },
    /// A row offers no key to merge on (no Id and no Name).
    MissingMergeKey { class: EntityClass, row: usize },
    /// Two rows of one class carry the same Id.
    DuplicateId { class: EntityClass, id: Uuid },
    /// The normalized store holds more than one project row.
    MultipleProjects(usize),
    /// The class was routed to an encoder of another family.
    UnsupportedClass {
        class: EntityClass,
        operation: &'static str,
    },
    TextCodec(TextCodecError),
    Span(SpanError),
    Repo(RepoError),
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved { class, field, id } => {
                write!(f, "{class}: {field} {id} does not resolve to an existing item")
            }
            Self::MissingMergeKey { class, row } => write!(
                f,
                "{class}: row {row} has neither Id nor Name and cannot be merged"
            ),
            Self::DuplicateId { class, id } => write!(f, "{class}: duplicate Id {id}"),
            Self::MultipleProjects(count) => {
                write!(f, "expected one project row, found {count}")
            }
            Self::UnsupportedClass { class, operation } => {
                write!(f, "{class}: not handled by {operation}")
            }
            Self::TextCodec(err) => write!(f, "{err}"),
            Self::Span(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EncodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TextCodec(err) => Some(err),
            Self::Span(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Unresolved { .. }
            | Self::MissingMergeKey { .. }
            | Self::DuplicateId { .. }
            | Self::MultipleProjects(_)
            | Self::UnsupportedClass { .. } => None,
        }
    }
}

impl From<TextCodecError> for EncodeError {
    fn from(value: TextCodecError) -> Self {
        Self::TextCodec(value)
    }
}

impl From<SpanError> for EncodeError {
    fn from(value: SpanError) -> Self {
        Self::Span(value)
    }
}

impl From<RepoError> for EncodeError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// A normalized row with its final Id and corrected text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared<T> {
    pub id: Uuid,
    pub row: T,
}

/// An attribute binding with the Ids of its name and value items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBinding {
    pub name_item: Uuid,
    pub value_item: Uuid,
    pub binding: AttributeBinding,
}

/// Encodes one run's normalized rows against a graph store.
///
/// Keeps a run-wide index of encoded items so later classes resolve
/// references to rows of earlier classes without re-reading the store.
pub struct GraphEncoder<'r, G: GraphRepository> {
    repo: &'r G,
    corrector: TextCorrector,
    items: HashMap<Uuid, ItemKind>,
    source_lengths: HashMap<Uuid, i64>,
    heads: HashMap<ItemKind, Uuid>,
}

impl<'r, G: GraphRepository> GraphEncoder<'r, G> {
    pub fn new(repo: &'r G, corrector: TextCorrector) -> Self {
        Self {
            repo,
            corrector,
            items: HashMap::new(),
            source_lengths: HashMap::new(),
            heads: HashMap::new(),
        }
    }

    /// Maps the single project row; no row yields `None`.
    pub fn encode_project(&self, rows: Vec<Project>) -> EncodeResult<Option<GraphBatch>> {
        if rows.len() > 1 {
            return Err(EncodeError::MultipleProjects(rows.len()));
        }
        let Some(project) = rows.into_iter().next() else {
            warn!("event=encode_class module=encode status=skip class=project reason=no_rows");
            return Ok(None);
        };

        let mut title = project.title;
        let mut description = project.description;
        self.corrector.correct("Project.Title", &mut title)?;
        self.corrector.correct("Project.Description", &mut description)?;

        Ok(Some(GraphBatch {
            project: Some(GraphProject {
                title,
                description,
                audit: project.audit,
            }),
            ..GraphBatch::default()
        }))
    }

    /// Assigns Ids and corrects text of node or source categories.
    pub fn prepare_categories(
        &self,
        class: EntityClass,
        rows: Vec<Category>,
        policy: ActionPolicy,
    ) -> EncodeResult<Vec<Prepared<Category>>> {
        let mut prepared = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            let parent = row.parent.map(|id| id.to_string()).unwrap_or_default();
            let id = assign_id(class, row.id, &[parent.as_str(), row.name.as_str()], index, policy)?;
            self.corrector.correct("Category.Name", &mut row.name)?;
            self.corrector
                .correct("Category.Description", &mut row.description)?;
            row.id = Some(id);
            prepared.push(Prepared { id, row });
        }
        ensure_unique(class, prepared.iter().map(|row| row.id))?;
        Ok(prepared)
    }

    pub fn prepare_nodes(
        &self,
        rows: Vec<Node>,
        policy: ActionPolicy,
    ) -> EncodeResult<Vec<Prepared<Node>>> {
        let class = EntityClass::Nodes;
        let mut prepared = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            let category = row.category.map(|id| id.to_string()).unwrap_or_default();
            let id = assign_id(class, row.id, &[category.as_str(), row.name.as_str()], index, policy)?;
            self.corrector.correct("Node.Name", &mut row.name)?;
            self.corrector
                .correct("Node.Description", &mut row.description)?;
            row.id = Some(id);
            prepared.push(Prepared { id, row });
        }
        ensure_unique(class, prepared.iter().map(|row| row.id))?;
        Ok(prepared)
    }

    /// Assigns Ids, corrects text and normalizes line endings of sources.
    pub fn prepare_sources(
        &self,
        rows: Vec<Source>,
        policy: ActionPolicy,
    ) -> EncodeResult<Vec<Prepared<Source>>> {
        let class = EntityClass::Sources;
        let mut prepared = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            let category = row.category.map(|id| id.to_string()).unwrap_or_default();
            let id = assign_id(class, row.id, &[category.as_str(), row.name.as_str()], index, policy)?;
            self.corrector.correct("Source.Name", &mut row.name)?;
            self.corrector
                .correct("Source.Description", &mut row.description)?;
            row.content = row.content.as_deref().map(normalize_line_endings);
            row.id = Some(id);
            prepared.push(Prepared { id, row });
        }
        ensure_unique(class, prepared.iter().map(|row| row.id))?;
        Ok(prepared)
    }

    /// Assigns item Ids and corrects names/values of attribute bindings.
    ///
    /// Every binding gets its own name and value item.
    pub fn prepare_attributes(
        &self,
        class: EntityClass,
        rows: Vec<AttributeBinding>,
    ) -> EncodeResult<Vec<PreparedBinding>> {
        let mut prepared = Vec::with_capacity(rows.len());
        for (index, mut binding) in rows.into_iter().enumerate() {
            let owner = binding.owner.to_string();
            let ordinal = index.to_string();
            let name_item = derive_id(
                class,
                &["name", owner.as_str(), binding.name.as_str(), ordinal.as_str()],
            );
            let value_item = derive_id(
                class,
                &["value", owner.as_str(), binding.name.as_str(), ordinal.as_str()],
            );
            self.corrector.correct("Attribute.Name", &mut binding.name)?;
            self.corrector.correct("Attribute.Value", &mut binding.value)?;
            prepared.push(PreparedBinding {
                name_item,
                value_item,
                binding,
            });
        }
        Ok(prepared)
    }

    /// Assigns Ids to coded spans or annotations.
    pub fn prepare_taggings(
        &self,
        class: EntityClass,
        rows: Vec<Tagging>,
    ) -> EncodeResult<Vec<Prepared<Tagging>>> {
        let mut prepared = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            let id = match row.id {
                Some(id) => id,
                None => {
                    let source = row.source.to_string();
                    let node = row.node.map(|id| id.to_string()).unwrap_or_default();
                    let ordinal = index.to_string();
                    derive_id(
                        class,
                        &[
                            source.as_str(),
                            node.as_str(),
                            row.fragment.as_str(),
                            ordinal.as_str(),
                        ],
                    )
                }
            };
            row.id = Some(id);
            prepared.push(Prepared { id, row });
        }
        ensure_unique(class, prepared.iter().map(|row| row.id))?;
        Ok(prepared)
    }

    pub fn encode_categories(
        &mut self,
        class: EntityClass,
        rows: &[Prepared<Category>],
    ) -> EncodeResult<GraphBatch> {
        let kind = match class {
            EntityClass::NodeCategories => ItemKind::NodeCategory,
            EntityClass::SourceCategories => ItemKind::SourceCategory,
            other => {
                return Err(EncodeError::UnsupportedClass {
                    class: other,
                    operation: "encode_categories",
                })
            }
        };
        let mut batch = GraphBatch::default();

        // Rows may parent each other regardless of order.
        for row in rows {
            self.items.insert(row.id, kind);
        }

        for Prepared { id, row } in rows {
            let parent = match row.parent {
                Some(parent) => {
                    self.resolve(class, "Parent", parent, &[kind, ItemKind::Folder])?;
                    parent
                }
                None => self.head_category(kind, &row.audit, &mut batch)?,
            };

            batch.items.push(GraphItem {
                id: *id,
                kind,
                name: row.name.clone(),
                description: row.description.clone(),
                audit: row.audit,
                system: false,
                read_only: false,
            });
            batch
                .roles
                .push(GraphRole::new(parent, RoleKind::ParentChild, *id));
            batch.extended_items.push(GraphExtendedItem {
                item_id: *id,
                properties: DEFAULT_EXTENDED_PROPERTIES.as_bytes().to_vec(),
            });
            batch.categories.push(GraphCategory {
                item_id: *id,
                layout: DEFAULT_CATEGORY_LAYOUT.as_bytes().to_vec(),
            });
        }
        Ok(batch)
    }

    pub fn encode_nodes(&mut self, rows: &[Prepared<Node>]) -> EncodeResult<GraphBatch> {
        let class = EntityClass::Nodes;
        let mut batch = GraphBatch::default();
        for Prepared { id, row } in rows {
            batch.items.push(GraphItem {
                id: *id,
                kind: ItemKind::Node,
                name: row.name.clone(),
                description: row.description.clone(),
                audit: row.audit,
                system: false,
                read_only: false,
            });
            if let Some(category) = row.category {
                self.resolve(class, "Category", category, &[ItemKind::NodeCategory])?;
                batch
                    .roles
                    .push(GraphRole::new(*id, RoleKind::CategoryMembership, category));
            }
            self.items.insert(*id, ItemKind::Node);
        }
        Ok(batch)
    }

    pub fn encode_sources(&mut self, rows: &[Prepared<Source>]) -> EncodeResult<GraphBatch> {
        let class = EntityClass::Sources;
        let mut batch = GraphBatch::default();
        for Prepared { id, row } in rows {
            batch.items.push(GraphItem {
                id: *id,
                kind: ItemKind::Source,
                name: row.name.clone(),
                description: row.description.clone(),
                audit: row.audit,
                system: false,
                read_only: false,
            });
            if let Some(category) = row.category {
                self.resolve(class, "Category", category, &[ItemKind::SourceCategory])?;
                batch
                    .roles
                    .push(GraphRole::new(*id, RoleKind::CategoryMembership, category));
            }

            let length_x = row
                .content
                .as_deref()
                .map_or(0, |text| to_length(text.chars().count()));
            batch.sources.push(GraphSource {
                item_id: *id,
                content: SourceContentKind::PlainText,
                plain_text: row.content.clone(),
                length_x,
                length_y: None,
            });
            self.items.insert(*id, ItemKind::Source);
            self.source_lengths.insert(*id, length_x);
        }
        Ok(batch)
    }

    /// Materializes attribute name/value items for node or source owners.
    ///
    /// Names that the owner's category does not declare are reported and
    /// still encoded.
    pub fn encode_attributes(
        &mut self,
        class: EntityClass,
        rows: &[PreparedBinding],
    ) -> EncodeResult<GraphBatch> {
        let owner_kinds: &[ItemKind] = match class {
            EntityClass::NodeAttributes => &ItemKind::NODE_KINDS,
            EntityClass::SourceAttributes => &[ItemKind::Source],
            other => {
                return Err(EncodeError::UnsupportedClass {
                    class: other,
                    operation: "encode_attributes",
                })
            }
        };
        let mut batch = GraphBatch::default();
        let mut undeclared = 0usize;

        for row in rows {
            let binding = &row.binding;
            self.resolve(class, "Owner", binding.owner, owner_kinds)?;
            if self.repo.category_defines_attribute(binding.owner, &binding.name)? == Some(false)
            {
                undeclared += 1;
            }

            batch.items.push(GraphItem {
                id: row.name_item,
                kind: ItemKind::AttributeName,
                name: binding.name.clone(),
                description: String::new(),
                audit: binding.audit,
                system: false,
                read_only: false,
            });
            batch.items.push(GraphItem {
                id: row.value_item,
                kind: ItemKind::AttributeValue,
                name: binding.value.clone(),
                description: String::new(),
                audit: binding.audit,
                system: false,
                read_only: false,
            });
            batch.roles.push(GraphRole::new(
                row.name_item,
                RoleKind::AttributeNameToValue,
                row.value_item,
            ));
            batch.roles.push(GraphRole::new(
                binding.owner,
                RoleKind::AttributeValueToOwner,
                row.value_item,
            ));
        }

        if undeclared > 0 {
            warn!(
                "event=attribute_definition_check module=encode status=warn class={} undeclared={}",
                class.as_str(),
                undeclared
            );
        }
        Ok(batch)
    }

    /// Replays coded spans (`Taggings`) or annotations (`Annotations`).
    pub fn encode_taggings(
        &mut self,
        class: EntityClass,
        rows: &[Prepared<Tagging>],
    ) -> EncodeResult<GraphBatch> {
        let mut batch = GraphBatch::default();
        for Prepared { id, row } in rows {
            self.resolve(class, "Source", row.source, &[ItemKind::Source])?;
            if let Some(node) = row.node {
                self.resolve(class, "Node", node, &ItemKind::NODE_KINDS)?;
            }
            let source_length = self.source_length(row.source)?;

            match replay_span(*id, row, source_length)? {
                ReplayedSpan::Reference(reference) => batch.node_references.push(reference),
                ReplayedSpan::Annotation(annotation) => batch.annotations.push(annotation),
            }
        }
        Ok(batch)
    }

    pub fn encode_users(&self, rows: &[User]) -> EncodeResult<GraphBatch> {
        ensure_unique(EntityClass::Users, rows.iter().map(|user| user.id))?;
        let user_profiles = rows
            .iter()
            .map(|user| GraphUserProfile {
                id: user.id,
                initials: initials(&user.name),
                account_name: Some(user.name.clone()),
            })
            .collect();
        Ok(GraphBatch {
            user_profiles,
            ..GraphBatch::default()
        })
    }

    fn resolve(
        &self,
        class: EntityClass,
        field: &'static str,
        id: Uuid,
        accepted: &[ItemKind],
    ) -> EncodeResult<()> {
        let kind = match self.items.get(&id) {
            Some(kind) => Some(*kind),
            None => self.repo.item_kind(id)?,
        };
        match kind {
            Some(kind) if accepted.contains(&kind) => Ok(()),
            _ => Err(EncodeError::Unresolved { class, field, id }),
        }
    }

    fn source_length(&self, source: Uuid) -> EncodeResult<i64> {
        if let Some(length) = self.source_lengths.get(&source) {
            return Ok(*length);
        }
        Ok(self.repo.source_length(source)?.unwrap_or(0))
    }

    /// Returns the head category of `kind`'s family, adding it to `batch`
    /// when the store has none.
    fn head_category(
        &mut self,
        kind: ItemKind,
        audit: &Audit,
        batch: &mut GraphBatch,
    ) -> EncodeResult<Uuid> {
        if let Some(id) = self.heads.get(&kind) {
            return Ok(*id);
        }

        let (name, fallback) = if kind == ItemKind::SourceCategory {
            (SOURCE_HEAD_CATEGORY, source_head_fallback_id())
        } else {
            (NODE_HEAD_CATEGORY, NODE_HEAD_FALLBACK_ID)
        };

        let id = match self.repo.find_item(ItemKind::Folder, name)? {
            Some(id) => id,
            None if self.repo.item_kind(fallback)?.is_some() => fallback,
            None => {
                batch.items.push(GraphItem {
                    id: fallback,
                    kind: ItemKind::Folder,
                    name: name.to_string(),
                    description: String::new(),
                    audit: *audit,
                    system: true,
                    read_only: false,
                });
                self.items.insert(fallback, ItemKind::Folder);
                fallback
            }
        };
        self.heads.insert(kind, id);
        Ok(id)
    }
}

/// Merge keys of item-backed classes: the prepared Ids.
pub fn id_keys<T>(rows: &[Prepared<T>]) -> MergeKeys {
    MergeKeys::Ids(rows.iter().map(|row| row.id).collect())
}

/// Merge keys of attribute classes: distinct `(owner, name)` pairs.
pub fn attribute_keys(rows: &[PreparedBinding]) -> MergeKeys {
    let keys: BTreeSet<AttributeKey> = rows
        .iter()
        .map(|row| AttributeKey {
            owner: row.binding.owner,
            name: row.binding.name.clone(),
        })
        .collect();
    MergeKeys::Attributes(keys.into_iter().collect())
}

/// Merge keys of coded spans: distinct `(node, source)` pairs.
pub fn reference_keys(rows: &[Prepared<Tagging>]) -> MergeKeys {
    let keys: BTreeSet<ReferenceKey> = rows
        .iter()
        .filter_map(|row| {
            row.row.node.map(|node| ReferenceKey {
                node,
                source: row.row.source,
            })
        })
        .collect();
    MergeKeys::References(keys.into_iter().collect())
}

/// Merge keys of annotations: distinct annotated source Ids.
pub fn annotation_keys(rows: &[Prepared<Tagging>]) -> MergeKeys {
    let keys: BTreeSet<Uuid> = rows.iter().map(|row| row.row.source).collect();
    MergeKeys::Ids(keys.into_iter().collect())
}

pub fn user_keys(rows: &[User]) -> MergeKeys {
    MergeKeys::Ids(rows.iter().map(|user| user.id).collect())
}

/// Deterministic Id of a row within `class`, derived from its natural key.
pub fn derive_id(class: EntityClass, parts: &[&str]) -> Uuid {
    let namespace = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("normgraph/{}", class.as_str()).as_bytes(),
    );
    Uuid::new_v5(&namespace, parts.join("\u{1f}").as_bytes())
}

/// Upper-cased first letter of every whitespace-separated token.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|token| token.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Rewrites `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn assign_id(
    class: EntityClass,
    existing: Option<Uuid>,
    natural_key: &[&str],
    index: usize,
    policy: ActionPolicy,
) -> EncodeResult<Uuid> {
    if let Some(id) = existing {
        return Ok(id);
    }
    let has_name = natural_key
        .last()
        .is_some_and(|name| !name.trim().is_empty());
    if has_name {
        return Ok(derive_id(class, natural_key));
    }
    if policy == ActionPolicy::Merge {
        return Err(EncodeError::MissingMergeKey { class, row: index });
    }
    let ordinal = index.to_string();
    Ok(derive_id(class, &["#row", ordinal.as_str()]))
}

fn ensure_unique(class: EntityClass, ids: impl Iterator<Item = Uuid>) -> EncodeResult<()> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(EncodeError::DuplicateId { class, id });
        }
    }
    Ok(())
}

fn to_length(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
