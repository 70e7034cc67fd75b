//! Graph store repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Resolve existing items for reference checks and head categories.
//! - Insert encoded batches and upsert the singleton project row.
//! - Delete previously generated rows by class signature or merge key.
//! - Report dangling references before commit.
//!
//! # Invariants
//! - Every `TypeId` bound into SQL comes from the taxonomy.
//! - Id columns collate without case; writes are upper-case.
//! - Deletes never cascade into other entity classes; rows left dangling by
//!   a delete are reported by [`GraphRepository::dangling_references`].

use super::{bool_to_int, ensure_store_ready, graph_id, parse_uuid, RepoError, RepoResult};
use crate::db::StoreKind;
use crate::model::graph::{
    GraphAnnotation, GraphBatch, GraphCategory, GraphExtendedItem, GraphItem,
    GraphNodeReference, GraphProject, GraphRole, GraphSource, GraphUserProfile,
};
use crate::model::norm::Audit;
use crate::model::taxonomy::{ItemKind, RoleKind};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Rows a delete applies to: the whole class, or only matching keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope<'a, K> {
    All,
    Keys(&'a [K]),
}

/// Attribute binding identity: owner item and attribute name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeKey {
    pub owner: Uuid,
    pub name: String,
}

/// Coded-span identity: node item and source item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceKey {
    pub node: Uuid,
    pub source: Uuid,
}

/// One dangling reference reported before commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub table: String,
    pub row_id: i64,
    pub parent: String,
}

/// Repository interface for the graph store.
pub trait GraphRepository {
    /// Returns the kind of an existing item.
    fn item_kind(&self, id: Uuid) -> RepoResult<Option<ItemKind>>;
    /// Finds the first item of `kind` named `name`.
    fn find_item(&self, kind: ItemKind, name: &str) -> RepoResult<Option<Uuid>>;
    /// Returns the stored text length of a source item.
    fn source_length(&self, source: Uuid) -> RepoResult<Option<i64>>;
    /// Returns whether `owner`'s category declares an attribute named `name`.
    fn category_defines_attribute(&self, owner: Uuid, name: &str) -> RepoResult<Option<bool>>;

    fn load_project(&self) -> RepoResult<Option<GraphProject>>;
    /// Updates the existing project row in place, or inserts the first one.
    /// Returns `true` when an existing row was updated.
    fn upsert_project(&self, project: &GraphProject) -> RepoResult<bool>;
    /// Writes every row of `batch`; the project row is upserted.
    fn insert_batch(&self, batch: &GraphBatch) -> RepoResult<usize>;

    /// Deletes category items of `kind` with their parent edges and payloads.
    fn delete_categories(&self, kind: ItemKind, scope: DeleteScope<'_, Uuid>)
        -> RepoResult<usize>;
    /// Deletes node items with their membership edges.
    fn delete_nodes(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize>;
    /// Deletes source items with their membership edges and text payloads.
    fn delete_sources(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize>;
    /// Deletes attribute value items owned by items of `owner_kinds`, or
    /// left without an owner by an earlier node or source pass.
    fn delete_attribute_values(
        &self,
        owner_kinds: &[ItemKind],
        scope: DeleteScope<'_, AttributeKey>,
    ) -> RepoResult<usize>;
    fn delete_node_references(&self, scope: DeleteScope<'_, ReferenceKey>) -> RepoResult<usize>;
    /// Deletes annotations; keys are annotated item Ids.
    fn delete_annotations(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize>;
    fn delete_user_profiles(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize>;

    /// Lists rows whose foreign keys point at missing items.
    fn dangling_references(&self) -> RepoResult<Vec<DanglingReference>>;
}

/// SQLite-backed graph store repository.
pub struct SqliteGraphRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_store_ready(conn, StoreKind::Graph)?;
        Ok(Self { conn })
    }

    fn insert_item(&self, item: &GraphItem) -> RepoResult<()> {
        let audit = &item.audit;
        self.conn.execute(
            "INSERT INTO Item (
                Id, TypeId, Name, Description, CreatedDate, ModifiedDate,
                CreatedBy, ModifiedBy, System, ReadOnly
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                graph_id(item.id),
                item.kind.code(),
                item.name,
                item.description,
                audit.created_date,
                audit.modified_date,
                graph_id(audit.created_by),
                graph_id(audit.modified_by),
                bool_to_int(item.system),
                bool_to_int(item.read_only),
            ],
        )?;
        Ok(())
    }

    fn insert_role(&self, role: &GraphRole) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO Role (Item1_Id, TypeId, Item2_Id, Tag) VALUES (?1, ?2, ?3, ?4);",
            params![
                graph_id(role.item1),
                role.kind.code(),
                graph_id(role.item2),
                role.tag
            ],
        )?;
        Ok(())
    }

    fn insert_extended_item(&self, row: &GraphExtendedItem) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO ExtendedItem (Item_Id, Properties) VALUES (?1, ?2);",
            params![graph_id(row.item_id), row.properties],
        )?;
        Ok(())
    }

    fn insert_category(&self, row: &GraphCategory) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO Category (Item_Id, Layout) VALUES (?1, ?2);",
            params![graph_id(row.item_id), row.layout],
        )?;
        Ok(())
    }

    fn insert_source(&self, row: &GraphSource) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO Source (Item_Id, TypeId, PlainText, LengthX, LengthY)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                graph_id(row.item_id),
                row.content.code(),
                row.plain_text,
                row.length_x,
                row.length_y
            ],
        )?;
        Ok(())
    }

    fn insert_node_reference(&self, row: &GraphNodeReference) -> RepoResult<()> {
        let audit = &row.audit;
        self.conn.execute(
            "INSERT INTO NodeReference (
                Id, Node_Item_Id, Source_Item_Id, ReferenceTypeId, StartX, LengthX,
                CreatedDate, ModifiedDate, CreatedBy, ModifiedBy
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                graph_id(row.id),
                graph_id(row.node_item_id),
                graph_id(row.source_item_id),
                row.reference.code(),
                row.span.start,
                row.span.length,
                audit.created_date,
                audit.modified_date,
                graph_id(audit.created_by),
                graph_id(audit.modified_by),
            ],
        )?;
        Ok(())
    }

    fn insert_annotation(&self, row: &GraphAnnotation) -> RepoResult<()> {
        let audit = &row.audit;
        self.conn.execute(
            "INSERT INTO Annotation (
                Id, Item_Id, Text, ReferenceTypeId, StartX, LengthX,
                CreatedDate, ModifiedDate, CreatedBy, ModifiedBy
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                graph_id(row.id),
                graph_id(row.item_id),
                row.text,
                row.reference.code(),
                row.span.start,
                row.span.length,
                audit.created_date,
                audit.modified_date,
                graph_id(audit.created_by),
                graph_id(audit.modified_by),
            ],
        )?;
        Ok(())
    }

    fn insert_user_profile(&self, row: &GraphUserProfile) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO UserProfile (Id, Initials, AccountName) VALUES (?1, ?2, ?3);",
            params![graph_id(row.id), row.initials, row.account_name],
        )?;
        Ok(())
    }

    /// Collects Ids of items of `kinds`, optionally restricted to `scope`.
    fn select_item_ids(
        &self,
        kinds: &[ItemKind],
        scope: DeleteScope<'_, Uuid>,
    ) -> RepoResult<Vec<String>> {
        let mut sql = format!(
            "SELECT Id FROM Item WHERE TypeId IN ({})",
            placeholders(kinds.len())
        );
        let mut bind_values: Vec<Value> = kinds
            .iter()
            .map(|kind| Value::Integer(kind.code()))
            .collect();

        if let DeleteScope::Keys(keys) = scope {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(" AND Id IN ({})", placeholders(keys.len())));
            bind_values.extend(keys.iter().map(|id| Value::Text(graph_id(*id))));
        }
        sql.push(';');

        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(bind_values), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn delete_roles_of(
        &self,
        item_ids: &[String],
        column: &'static str,
        kind: RoleKind,
    ) -> RepoResult<usize> {
        let mut deleted = 0;
        for id in item_ids {
            deleted += self.conn.execute(
                &format!("DELETE FROM Role WHERE {column} = ?1 AND TypeId = ?2;"),
                params![id, kind.code()],
            )?;
        }
        Ok(deleted)
    }

    fn delete_rows_by_item(
        &self,
        table: &'static str,
        column: &'static str,
        item_ids: &[String],
    ) -> RepoResult<usize> {
        let mut deleted = 0;
        for id in item_ids {
            deleted += self.conn.execute(
                &format!("DELETE FROM {table} WHERE {column} = ?1;"),
                [id],
            )?;
        }
        Ok(deleted)
    }

    fn delete_items_by_id(&self, item_ids: &[String]) -> RepoResult<usize> {
        self.delete_rows_by_item("Item", "Id", item_ids)
    }
}

impl GraphRepository for SqliteGraphRepository<'_> {
    fn item_kind(&self, id: Uuid) -> RepoResult<Option<ItemKind>> {
        let code: Option<i64> = self
            .conn
            .query_row(
                "SELECT TypeId FROM Item WHERE Id = ?1;",
                [graph_id(id)],
                |row| row.get(0),
            )
            .optional()?;
        code.map(ItemKind::from_code)
            .transpose()
            .map_err(RepoError::from)
    }

    fn find_item(&self, kind: ItemKind, name: &str) -> RepoResult<Option<Uuid>> {
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT Id FROM Item WHERE TypeId = ?1 AND Name = ?2 ORDER BY rowid LIMIT 1;",
                params![kind.code(), name],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|text| parse_uuid(&text, "Item.Id")).transpose()
    }

    fn source_length(&self, source: Uuid) -> RepoResult<Option<i64>> {
        let length = self
            .conn
            .query_row(
                "SELECT LengthX FROM Source WHERE Item_Id = ?1;",
                [graph_id(source)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(length)
    }

    fn category_defines_attribute(&self, owner: Uuid, name: &str) -> RepoResult<Option<bool>> {
        let category: Option<String> = self
            .conn
            .query_row(
                "SELECT Item2_Id FROM Role
                 WHERE Item1_Id = ?1 AND TypeId = ?2
                 ORDER BY rowid LIMIT 1;",
                params![graph_id(owner), RoleKind::CategoryMembership.code()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(category) = category else {
            return Ok(None);
        };

        let defined: i64 = self.conn.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM Role r
                INNER JOIN Item n ON n.Id = r.Item1_Id
                WHERE r.Item2_Id = ?1
                  AND r.TypeId = ?2
                  AND n.TypeId = ?3
                  AND n.Name = ?4
             );",
            params![
                category,
                RoleKind::AttributeDefinition.code(),
                ItemKind::AttributeName.code(),
                name
            ],
            |row| row.get(0),
        )?;
        Ok(Some(defined != 0))
    }

    fn load_project(&self) -> RepoResult<Option<GraphProject>> {
        let row: Option<(String, String, String, NaiveDateTime, String, NaiveDateTime)> = self
            .conn
            .query_row(
                "SELECT Title, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
                 FROM Project ORDER BY rowid LIMIT 1;",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((title, description, created_by, created_date, modified_by, modified_date)) = row
        else {
            return Ok(None);
        };
        Ok(Some(GraphProject {
            title,
            description,
            audit: Audit {
                created_by: parse_uuid(&created_by, "Project.CreatedBy")?,
                created_date,
                modified_by: parse_uuid(&modified_by, "Project.ModifiedBy")?,
                modified_date,
            },
        }))
    }

    fn upsert_project(&self, project: &GraphProject) -> RepoResult<bool> {
        let audit = &project.audit;
        let updated = self.conn.execute(
            "UPDATE Project
             SET Title = ?1, Description = ?2, ModifiedBy = ?3, ModifiedDate = ?4;",
            params![
                project.title,
                project.description,
                graph_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        if updated > 0 {
            return Ok(true);
        }

        self.conn.execute(
            "INSERT INTO Project (
                Title, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                project.title,
                project.description,
                graph_id(audit.created_by),
                audit.created_date,
                graph_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(false)
    }

    fn insert_batch(&self, batch: &GraphBatch) -> RepoResult<usize> {
        if let Some(project) = batch.project.as_ref() {
            self.upsert_project(project)?;
        }
        for item in &batch.items {
            self.insert_item(item)?;
        }
        for role in &batch.roles {
            self.insert_role(role)?;
        }
        for row in &batch.extended_items {
            self.insert_extended_item(row)?;
        }
        for row in &batch.categories {
            self.insert_category(row)?;
        }
        for row in &batch.sources {
            self.insert_source(row)?;
        }
        for row in &batch.node_references {
            self.insert_node_reference(row)?;
        }
        for row in &batch.annotations {
            self.insert_annotation(row)?;
        }
        for row in &batch.user_profiles {
            self.insert_user_profile(row)?;
        }
        Ok(batch.row_count())
    }

    fn delete_categories(
        &self,
        kind: ItemKind,
        scope: DeleteScope<'_, Uuid>,
    ) -> RepoResult<usize> {
        let ids = self.select_item_ids(&[kind], scope)?;
        let mut deleted = self.delete_roles_of(&ids, "Item2_Id", RoleKind::ParentChild)?;
        deleted += self.delete_rows_by_item("ExtendedItem", "Item_Id", &ids)?;
        deleted += self.delete_rows_by_item("Category", "Item_Id", &ids)?;
        deleted += self.delete_items_by_id(&ids)?;
        Ok(deleted)
    }

    fn delete_nodes(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize> {
        let ids = self.select_item_ids(&ItemKind::NODE_KINDS, scope)?;
        let mut deleted = self.delete_roles_of(&ids, "Item1_Id", RoleKind::CategoryMembership)?;
        deleted += self.delete_items_by_id(&ids)?;
        Ok(deleted)
    }

    fn delete_sources(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize> {
        let ids = self.select_item_ids(&[ItemKind::Source], scope)?;
        let mut deleted = self.delete_roles_of(&ids, "Item1_Id", RoleKind::CategoryMembership)?;
        deleted += self.delete_rows_by_item("Source", "Item_Id", &ids)?;
        deleted += self.delete_items_by_id(&ids)?;
        Ok(deleted)
    }

    fn delete_attribute_values(
        &self,
        owner_kinds: &[ItemKind],
        scope: DeleteScope<'_, AttributeKey>,
    ) -> RepoResult<usize> {
        let base = format!(
            "SELECT v.Id, n.Id
             FROM Role owned
             LEFT JOIN Item o ON o.Id = owned.Item1_Id
             INNER JOIN Item v ON v.Id = owned.Item2_Id
             INNER JOIN Role named ON named.Item2_Id = v.Id AND named.TypeId = ?1
             INNER JOIN Item n ON n.Id = named.Item1_Id
             WHERE owned.TypeId = ?2
               AND v.TypeId = ?3
               AND n.TypeId = ?4
               AND (o.Id IS NULL OR o.TypeId IN ({}))",
            placeholders(owner_kinds.len())
        );
        let mut fixed: Vec<Value> = vec![
            Value::Integer(RoleKind::AttributeNameToValue.code()),
            Value::Integer(RoleKind::AttributeValueToOwner.code()),
            Value::Integer(ItemKind::AttributeValue.code()),
            Value::Integer(ItemKind::AttributeName.code()),
        ];
        fixed.extend(owner_kinds.iter().map(|kind| Value::Integer(kind.code())));

        let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
        match scope {
            DeleteScope::All => {
                let mut stmt = self.conn.prepare(&format!("{base};"))?;
                let rows = stmt.query_map(params_from_iter(fixed), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                for pair in rows {
                    pairs.insert(pair?);
                }
            }
            DeleteScope::Keys(keys) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{base} AND owned.Item1_Id = ? AND n.Name = ?;"
                ))?;
                for key in keys {
                    let mut bind_values = fixed.clone();
                    bind_values.push(Value::Text(graph_id(key.owner)));
                    bind_values.push(Value::Text(key.name.clone()));
                    let rows = stmt.query_map(params_from_iter(bind_values), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?;
                    for pair in rows {
                        pairs.insert(pair?);
                    }
                }
            }
        }

        let value_ids: Vec<String> = pairs.iter().map(|(value, _)| value.clone()).collect();
        let name_ids: BTreeSet<String> = pairs.into_iter().map(|(_, name)| name).collect();

        let mut deleted =
            self.delete_roles_of(&value_ids, "Item2_Id", RoleKind::AttributeNameToValue)?;
        deleted += self.delete_roles_of(&value_ids, "Item2_Id", RoleKind::AttributeValueToOwner)?;
        deleted += self.delete_items_by_id(&value_ids)?;

        // Name items may be shared with attribute definitions; keep those.
        for name_id in name_ids {
            deleted += self.conn.execute(
                "DELETE FROM Item
                 WHERE Id = ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM Role
                       WHERE Item1_Id = ?1 OR Item2_Id = ?1
                   );",
                [name_id],
            )?;
        }
        Ok(deleted)
    }

    fn delete_node_references(&self, scope: DeleteScope<'_, ReferenceKey>) -> RepoResult<usize> {
        match scope {
            DeleteScope::All => Ok(self.conn.execute("DELETE FROM NodeReference;", [])?),
            DeleteScope::Keys(keys) => {
                let mut deleted = 0;
                for key in keys {
                    deleted += self.conn.execute(
                        "DELETE FROM NodeReference
                         WHERE Node_Item_Id = ?1 AND Source_Item_Id = ?2;",
                        params![graph_id(key.node), graph_id(key.source)],
                    )?;
                }
                Ok(deleted)
            }
        }
    }

    fn delete_annotations(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize> {
        match scope {
            DeleteScope::All => Ok(self.conn.execute("DELETE FROM Annotation;", [])?),
            DeleteScope::Keys(keys) => {
                let ids: Vec<String> = keys.iter().map(|id| graph_id(*id)).collect();
                self.delete_rows_by_item("Annotation", "Item_Id", &ids)
            }
        }
    }

    fn delete_user_profiles(&self, scope: DeleteScope<'_, Uuid>) -> RepoResult<usize> {
        match scope {
            DeleteScope::All => Ok(self.conn.execute("DELETE FROM UserProfile;", [])?),
            DeleteScope::Keys(keys) => {
                let ids: Vec<String> = keys.iter().map(|id| graph_id(*id)).collect();
                self.delete_rows_by_item("UserProfile", "Id", &ids)
            }
        }
    }

    fn dangling_references(&self) -> RepoResult<Vec<DanglingReference>> {
        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check;")?;
        let rows = stmt.query_map([], |row| {
            Ok(DanglingReference {
                table: row.get(0)?,
                row_id: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                parent: row.get(2)?,
            })
        })?;
        let dangling = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(dangling)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
