//! Normalized store repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Read every normalized entity class as typed, validated records.
//! - Provide the find-or-create and replace primitives used by the import
//!   run.
//!
//! # Invariants
//! - Reads return rows in insertion (`rowid`) order.
//! - Attribute bindings are read by joining value rows to their definition
//!   and surface as flat `(owner, name, value)` records.
//! - Ids are written lower-case hyphenated.

use super::{ensure_store_ready, norm_id, parse_opt_uuid, parse_uuid, RepoError, RepoResult};
use crate::attribute::{AttributeDescriptor, AttributeType};
use crate::db::StoreKind;
use crate::model::norm::{
    Audit, AttributeBinding, Category, Node, NodeAttribute, NodeCategory, Project, Source,
    SourceAttribute, SourceCategory, Tagging, User,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const REQUIRED_TABLES: &[&str] = &[
    "Project",
    "User",
    "NodeCategory",
    "Node",
    "NodeAttribute",
    "NodeValue",
    "SourceCategory",
    "Source",
    "SourceAttribute",
    "SourceValue",
    "Tagging",
];

const AUDIT_COLUMNS: &str = "CreatedBy, CreatedDate, ModifiedBy, ModifiedDate";

/// `ObjectType` written for sources whose payload is plain text.
const TEXT_OBJECT_TYPE: &str = "TXT";

/// Source row as written by the import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub id: Uuid,
    pub category: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub color: Option<String>,
    pub content: String,
    pub audit: Audit,
}

/// Repository interface for the normalized store.
pub trait NormRepository {
    /// Returns every project row; callers decide how to treat `!= 1` rows.
    fn load_projects(&self) -> RepoResult<Vec<Project>>;
    fn load_node_categories(&self) -> RepoResult<Vec<NodeCategory>>;
    fn load_nodes(&self) -> RepoResult<Vec<Node>>;
    fn load_node_attributes(&self) -> RepoResult<Vec<NodeAttribute>>;
    fn load_source_categories(&self) -> RepoResult<Vec<SourceCategory>>;
    fn load_sources(&self) -> RepoResult<Vec<Source>>;
    fn load_source_attributes(&self) -> RepoResult<Vec<SourceAttribute>>;
    /// Returns coded spans and annotations alike.
    fn load_taggings(&self) -> RepoResult<Vec<Tagging>>;
    fn load_users(&self) -> RepoResult<Vec<User>>;

    fn find_user_by_name(&self, name: &str) -> RepoResult<Option<User>>;
    fn insert_user(&self, user: &User) -> RepoResult<()>;
    fn insert_project(&self, project: &Project) -> RepoResult<()>;
    fn find_source_category_by_name(&self, name: &str) -> RepoResult<Option<Uuid>>;
    /// Inserts a category; the record must carry an Id.
    fn insert_source_category(&self, category: &SourceCategory) -> RepoResult<Uuid>;
    fn find_node_by_name(&self, name: &str) -> RepoResult<Option<Uuid>>;
    /// Inserts a node; the record must carry an Id.
    fn insert_node(&self, node: &Node) -> RepoResult<Uuid>;
    /// Looks up a registered source attribute definition by name.
    fn find_source_attribute(&self, name: &str) -> RepoResult<Option<AttributeDescriptor>>;
    fn insert_source_attribute(
        &self,
        descriptor: &AttributeDescriptor,
        description: &str,
        audit: &Audit,
    ) -> RepoResult<()>;
    fn find_source_by_name(&self, name: &str) -> RepoResult<Option<Uuid>>;
    fn insert_source(&self, record: &SourceRecord) -> RepoResult<()>;
    /// Updates an existing source; creation audit columns are kept.
    fn update_source(&self, record: &SourceRecord) -> RepoResult<()>;
    fn delete_source_values(&self, source: Uuid, attribute: Uuid) -> RepoResult<usize>;
    fn insert_source_value(
        &self,
        source: Uuid,
        attribute: Uuid,
        value: &str,
        audit: &Audit,
    ) -> RepoResult<()>;
    fn delete_taggings(&self, source: Uuid, node: Uuid) -> RepoResult<usize>;
    fn insert_tagging(&self, tagging: &Tagging) -> RepoResult<()>;
}

/// SQLite-backed normalized store repository.
///
/// Accepts a plain connection or a transaction (through deref).
pub struct SqliteNormRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNormRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_norm_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn load_categories(&self, table: &'static str) -> RepoResult<Vec<Category>> {
        let sql = format!(
            "SELECT Id, Parent, Name, Description, {AUDIT_COLUMNS} FROM {table} ORDER BY rowid;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next()? {
            let category = Category {
                id: parse_opt_uuid(row.get("Id")?, "Id")?,
                parent: parse_opt_uuid(row.get("Parent")?, "Parent")?,
                name: row.get("Name")?,
                description: row.get("Description")?,
                audit: read_audit(row)?,
            };
            category.validate()?;
            categories.push(category);
        }
        Ok(categories)
    }

    fn load_bindings(
        &self,
        value_table: &'static str,
        owner_column: &'static str,
        definition_table: &'static str,
    ) -> RepoResult<Vec<AttributeBinding>> {
        let sql = format!(
            "SELECT v.{owner_column} AS Owner, d.Name AS Name, v.Value AS Value,
                    v.CreatedBy AS CreatedBy, v.CreatedDate AS CreatedDate,
                    v.ModifiedBy AS ModifiedBy, v.ModifiedDate AS ModifiedDate
             FROM {value_table} v
             INNER JOIN {definition_table} d ON lower(d.Id) = lower(v.Attribute)
             ORDER BY v.rowid;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut bindings = Vec::new();
        while let Some(row) = rows.next()? {
            let owner: String = row.get("Owner")?;
            let binding = AttributeBinding {
                owner: parse_uuid(&owner, owner_column)?,
                name: row.get("Name")?,
                value: row.get("Value")?,
                audit: read_audit(row)?,
            };
            binding.validate()?;
            bindings.push(binding);
        }
        Ok(bindings)
    }

    fn find_id_by_name(&self, table: &'static str, name: &str) -> RepoResult<Option<Uuid>> {
        let sql = format!("SELECT Id FROM {table} WHERE Name = ?1 ORDER BY rowid LIMIT 1;");
        let id: Option<Option<String>> = self
            .conn
            .query_row(&sql, [name], |row| row.get(0))
            .optional()?;
        match id {
            Some(Some(text)) => Ok(Some(parse_uuid(&text, "Id")?)),
            Some(None) => Err(RepoError::InvalidData(format!(
                "{table} row named by lookup has no Id"
            ))),
            None => Ok(None),
        }
    }
}

impl NormRepository for SqliteNormRepository<'_> {
    fn load_projects(&self) -> RepoResult<Vec<Project>> {
        let sql = format!(
            "SELECT Version, Title, Description, {AUDIT_COLUMNS} FROM Project ORDER BY rowid;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(Project {
                version: row.get("Version")?,
                title: row.get("Title")?,
                description: row.get("Description")?,
                audit: read_audit(row)?,
            });
        }
        Ok(projects)
    }

    fn load_node_categories(&self) -> RepoResult<Vec<NodeCategory>> {
        self.load_categories("NodeCategory")
    }

    fn load_nodes(&self) -> RepoResult<Vec<Node>> {
        let sql = format!(
            "SELECT Id, Category, Name, Description, {AUDIT_COLUMNS} FROM Node ORDER BY rowid;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(Node {
                id: parse_opt_uuid(row.get("Id")?, "Id")?,
                category: parse_opt_uuid(row.get("Category")?, "Category")?,
                name: row.get("Name")?,
                description: row.get("Description")?,
                audit: read_audit(row)?,
            });
        }
        Ok(nodes)
    }

    fn load_node_attributes(&self) -> RepoResult<Vec<NodeAttribute>> {
        self.load_bindings("NodeValue", "Node", "NodeAttribute")
    }

    fn load_source_categories(&self) -> RepoResult<Vec<SourceCategory>> {
        self.load_categories("SourceCategory")
    }

    fn load_sources(&self) -> RepoResult<Vec<Source>> {
        let sql = format!(
            "SELECT Id, Category, Name, Description, Content, {AUDIT_COLUMNS}
             FROM Source ORDER BY rowid;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut sources = Vec::new();
        while let Some(row) = rows.next()? {
            sources.push(Source {
                id: parse_opt_uuid(row.get("Id")?, "Id")?,
                category: parse_opt_uuid(row.get("Category")?, "Category")?,
                name: row.get("Name")?,
                description: row.get("Description")?,
                content: row.get("Content")?,
                audit: read_audit(row)?,
            });
        }
        Ok(sources)
    }

    fn load_source_attributes(&self) -> RepoResult<Vec<SourceAttribute>> {
        self.load_bindings("SourceValue", "Source", "SourceAttribute")
    }

    fn load_taggings(&self) -> RepoResult<Vec<Tagging>> {
        let sql = format!(
            "SELECT Id, Source, Node, Memo, Fragment, {AUDIT_COLUMNS} FROM Tagging ORDER BY rowid;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut taggings = Vec::new();
        while let Some(row) = rows.next()? {
            let source: String = row.get("Source")?;
            let tagging = Tagging {
                id: parse_opt_uuid(row.get("Id")?, "Id")?,
                source: parse_uuid(&source, "Source")?,
                node: parse_opt_uuid(row.get("Node")?, "Node")?,
                memo: row.get("Memo")?,
                fragment: row.get("Fragment")?,
                audit: read_audit(row)?,
            };
            tagging.validate()?;
            taggings.push(tagging);
        }
        Ok(taggings)
    }

    fn load_users(&self) -> RepoResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT Id, Name FROM \"User\" ORDER BY rowid;")?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(read_user(row)?);
        }
        Ok(users)
    }

    fn find_user_by_name(&self, name: &str) -> RepoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT Id, Name FROM \"User\" WHERE Name = ?1 ORDER BY rowid LIMIT 1;")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_user(row)?)),
            None => Ok(None),
        }
    }

    fn insert_user(&self, user: &User) -> RepoResult<()> {
        user.validate()?;
        self.conn.execute(
            "INSERT INTO \"User\" (Id, Name) VALUES (?1, ?2);",
            params![norm_id(user.id), user.name],
        )?;
        Ok(())
    }

    fn insert_project(&self, project: &Project) -> RepoResult<()> {
        let audit = &project.audit;
        self.conn.execute(
            "INSERT INTO Project (
                Version, Title, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                project.version,
                project.title,
                project.description,
                norm_id(audit.created_by),
                audit.created_date,
                norm_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(())
    }

    fn find_source_category_by_name(&self, name: &str) -> RepoResult<Option<Uuid>> {
        self.find_id_by_name("SourceCategory", name)
    }

    fn insert_source_category(&self, category: &SourceCategory) -> RepoResult<Uuid> {
        category.validate()?;
        let id = category.id.ok_or_else(|| {
            RepoError::InvalidData("source category insert requires an Id".to_string())
        })?;
        let audit = &category.audit;
        self.conn.execute(
            "INSERT INTO SourceCategory (
                Id, Parent, Name, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                norm_id(id),
                category.parent.map(norm_id),
                category.name,
                category.description,
                norm_id(audit.created_by),
                audit.created_date,
                norm_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(id)
    }

    fn find_node_by_name(&self, name: &str) -> RepoResult<Option<Uuid>> {
        self.find_id_by_name("Node", name)
    }

    fn insert_node(&self, node: &Node) -> RepoResult<Uuid> {
        let id = node
            .id
            .ok_or_else(|| RepoError::InvalidData("node insert requires an Id".to_string()))?;
        let audit = &node.audit;
        self.conn.execute(
            "INSERT INTO Node (
                Id, Category, Name, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                norm_id(id),
                node.category.map(norm_id),
                node.name,
                node.description,
                norm_id(audit.created_by),
                audit.created_date,
                norm_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(id)
    }

    fn find_source_attribute(&self, name: &str) -> RepoResult<Option<AttributeDescriptor>> {
        let row: Option<(String, String, String, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT Id, Name, Type, Length FROM SourceAttribute WHERE Name = ?1;",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((id, name, kind, length)) = row else {
            return Ok(None);
        };
        let length = usize::try_from(length.unwrap_or(0)).map_err(|_| {
            RepoError::InvalidData(format!("negative length for attribute `{name}`"))
        })?;
        Ok(Some(AttributeDescriptor {
            id: parse_uuid(&id, "Id")?,
            name,
            kind: AttributeType::parse(&kind)?,
            length,
        }))
    }

    fn insert_source_attribute(
        &self,
        descriptor: &AttributeDescriptor,
        description: &str,
        audit: &Audit,
    ) -> RepoResult<()> {
        let length = i64::try_from(descriptor.length).map_err(|_| {
            RepoError::InvalidData(format!(
                "length of attribute `{}` does not fit the store",
                descriptor.name
            ))
        })?;
        self.conn.execute(
            "INSERT INTO SourceAttribute (
                Id, Name, Description, Type, Length, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                norm_id(descriptor.id),
                descriptor.name,
                description,
                descriptor.kind.as_db_str(),
                length,
                norm_id(audit.created_by),
                audit.created_date,
                norm_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(())
    }

    fn find_source_by_name(&self, name: &str) -> RepoResult<Option<Uuid>> {
        self.find_id_by_name("Source", name)
    }

    fn insert_source(&self, record: &SourceRecord) -> RepoResult<()> {
        let audit = &record.audit;
        self.conn.execute(
            "INSERT INTO Source (
                Id, Category, Name, Description, Color, Content, ObjectType, Object,
                CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                norm_id(record.id),
                record.category.map(norm_id),
                record.name,
                record.description,
                record.color,
                record.content,
                TEXT_OBJECT_TYPE,
                record.content.as_bytes(),
                norm_id(audit.created_by),
                audit.created_date,
                norm_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(())
    }

    fn update_source(&self, record: &SourceRecord) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE Source
             SET
                Category = ?2,
                Name = ?3,
                Description = ?4,
                Color = ?5,
                Content = ?6,
                ObjectType = ?7,
                Object = ?8,
                ModifiedBy = ?9,
                ModifiedDate = ?10
             WHERE lower(Id) = lower(?1);",
            params![
                norm_id(record.id),
                record.category.map(norm_id),
                record.name,
                record.description,
                record.color,
                record.content,
                TEXT_OBJECT_TYPE,
                record.content.as_bytes(),
                norm_id(record.audit.modified_by),
                record.audit.modified_date,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::InvalidData(format!(
                "source {} disappeared before update",
                record.id
            )));
        }
        Ok(())
    }

    fn delete_source_values(&self, source: Uuid, attribute: Uuid) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM SourceValue WHERE lower(Source) = ?1 AND lower(Attribute) = ?2;",
            params![norm_id(source), norm_id(attribute)],
        )?;
        Ok(deleted)
    }

    fn insert_source_value(
        &self,
        source: Uuid,
        attribute: Uuid,
        value: &str,
        audit: &Audit,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO SourceValue (
                Source, Attribute, Value, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                norm_id(source),
                norm_id(attribute),
                value,
                norm_id(audit.created_by),
                audit.created_date,
                norm_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(())
    }

    fn delete_taggings(&self, source: Uuid, node: Uuid) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM Tagging WHERE lower(Source) = ?1 AND lower(Node) = ?2;",
            params![norm_id(source), norm_id(node)],
        )?;
        Ok(deleted)
    }

    fn insert_tagging(&self, tagging: &Tagging) -> RepoResult<()> {
        tagging.validate()?;
        let audit = &tagging.audit;
        self.conn.execute(
            "INSERT INTO Tagging (
                Id, Source, Node, Memo, Fragment, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                tagging.id.map(norm_id),
                norm_id(tagging.source),
                tagging.node.map(norm_id),
                tagging.memo,
                tagging.fragment,
                norm_id(audit.created_by),
                audit.created_date,
                norm_id(audit.modified_by),
                audit.modified_date,
            ],
        )?;
        Ok(())
    }
}

fn read_audit(row: &Row<'_>) -> RepoResult<Audit> {
    let created_by: String = row.get("CreatedBy")?;
    let modified_by: String = row.get("ModifiedBy")?;
    Ok(Audit {
        created_by: parse_uuid(&created_by, "CreatedBy")?,
        created_date: row.get("CreatedDate")?,
        modified_by: parse_uuid(&modified_by, "ModifiedBy")?,
        modified_date: row.get("ModifiedDate")?,
    })
}

fn read_user(row: &Row<'_>) -> RepoResult<User> {
    let id: String = row.get("Id")?;
    let user = User {
        id: parse_uuid(&id, "Id")?,
        name: row.get("Name")?,
    };
    user.validate()?;
    Ok(user)
}

fn ensure_norm_connection_ready(conn: &Connection) -> RepoResult<()> {
    ensure_store_ready(conn, StoreKind::Normalized)?;
    for table in REQUIRED_TABLES {
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(RepoError::InvalidData(format!(
                "normalized store is missing table `{table}`"
            )));
        }
    }
    Ok(())
}
