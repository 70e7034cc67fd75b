//! Tabular import of source records into the normalized store.
//!
//! # Responsibility
//! - Turn rows of a delimited file (or command-line values) into sources,
//!   source attributes, source categories and coded text sections.
//! - Register missing attribute definitions from inferred column types.
//!
//! # Invariants
//! - One import is one normalized-store transaction.
//! - A source whose name already exists is updated, never duplicated.
//! - Re-importing a text column replaces that column's earlier taggings.

use crate::attribute::{
    coerce_value, resolve_attribute, AttributeDescriptor, AttributeError, Resolution,
};
use crate::db::{run_in_transaction, DbError};
use crate::encode::tagging::ContentBuilder;
use crate::model::norm::{Audit, Category, Node, Project, Tagging, User};
use crate::repo::norm_repo::{NormRepository, SourceRecord, SqliteNormRepository};
use crate::repo::RepoError;
use chrono::{NaiveDateTime, Utc};
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// Description written on rows the import creates.
pub const DEFAULT_DESCRIPTION: &str = "Created by normgraph";
/// Name of the user created when the store has neither user nor project.
pub const DEFAULT_USER_NAME: &str = "Default User";
/// Project version written with a freshly created project row.
pub const DEFAULT_PROJECT_VERSION: &str = "0.2";
pub const DEFAULT_PROJECT_TITLE: &str = "Imported sources";

/// Columns that carry source fields rather than attributes.
pub const RESERVED_COLUMNS: [&str; 6] =
    ["Name", "Description", "Category", "Color", "Source", "Text"];

static ATTRIBUTE_SPEC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<attname>[^:]+):(?P<attvalue>.+)?$").expect("valid attribute spec regex")
});

/// One input row keyed by column name. Missing cells are absent keys.
pub type TabularRow = BTreeMap<String, String>;

/// Parsed delimited input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularInput {
    /// Leading `#` comment lines, verbatim.
    pub comments: Vec<String>,
    /// Header columns in file order.
    pub columns: Vec<String>,
    pub rows: Vec<TabularRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Stop after this many data rows.
    pub limit: Option<usize>,
    /// Restrict attribute columns to these names; empty means all.
    pub columns: Vec<String>,
    pub exclude: Vec<String>,
    /// Columns whose cells become coded text sections.
    pub text_columns: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub color: Option<String>,
    /// File whose contents become the source content.
    pub source: Option<PathBuf>,
    pub text: Option<String>,
    pub user: Option<String>,
    /// Literal `name:value` attributes applied to every row.
    pub attributes: Vec<String>,
    /// Title of the project row created when none exists.
    pub project_title: Option<String>,
}

/// Counts of what one import wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub user: Uuid,
    pub rows: usize,
    pub sources_inserted: usize,
    pub sources_updated: usize,
    pub attributes_registered: usize,
    pub categories_created: usize,
    pub nodes_created: usize,
    pub values_written: usize,
    pub taggings_written: usize,
}

#[derive(Debug)]
pub enum ImportError {
    Db(DbError),
    Repo(RepoError),
    Attribute(AttributeError),
    /// Literal attribute not in `name:value` form.
    MalformedAttributeSpec(String),
    /// Source content file could not be read as text.
    SourceFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Attribute(err) => write!(f, "{err}"),
            Self::MalformedAttributeSpec(spec) => {
                write!(f, "attribute `{spec}` is not in name:value form")
            }
            Self::SourceFile { path, source } => {
                write!(f, "failed to read source file `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Attribute(err) => Some(err),
            Self::SourceFile { source, .. } => Some(source),
            Self::MalformedAttributeSpec(_) => None,
        }
    }
}

impl From<DbError> for ImportError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for ImportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<AttributeError> for ImportError {
    fn from(value: AttributeError) -> Self {
        Self::Attribute(value)
    }
}

/// Parses a literal `name:value` attribute. A missing value is empty.
pub fn parse_attribute_spec(spec: &str) -> Result<(String, String), ImportError> {
    let captures = ATTRIBUTE_SPEC_RE
        .captures(spec)
        .ok_or_else(|| ImportError::MalformedAttributeSpec(spec.to_string()))?;
    let name = captures
        .name("attname")
        .map(|value| value.as_str().to_string())
        .ok_or_else(|| ImportError::MalformedAttributeSpec(spec.to_string()))?;
    let value = captures
        .name("attvalue")
        .map(|value| value.as_str().to_string())
        .unwrap_or_default();
    Ok((name, value))
}

/// Imports `input` (or a single row built from `options`) into `conn`.
pub fn run_import(
    conn: &mut Connection,
    input: Option<TabularInput>,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError> {
    let started_at = Instant::now();
    info!("event=import_run module=service status=start");

    let result = build_rows(input, options).and_then(|(columns, rows)| {
        run_in_transaction(conn, "import", |tx| {
            let repo = SqliteNormRepository::try_new(tx)?;
            let now = Utc::now().naive_utc();
            ImportService::new(&repo, options, now).import(&columns, &rows)
        })
    });

    match &result {
        Ok(report) => info!(
            "event=import_run module=service status=ok duration_ms={} rows={} inserted={} updated={}",
            started_at.elapsed().as_millis(),
            report.rows,
            report.sources_inserted,
            report.sources_updated
        ),
        Err(err) => error!(
            "event=import_run module=service status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

/// Applies the row limit, reserved-column fallbacks and literal attributes.
fn build_rows(
    input: Option<TabularInput>,
    options: &ImportOptions,
) -> Result<(Vec<String>, Vec<TabularRow>), ImportError> {
    let literals = options
        .attributes
        .iter()
        .map(|spec| parse_attribute_spec(spec))
        .collect::<Result<Vec<_>, _>>()?;

    let fallbacks = [
        ("Name", options.name.clone()),
        ("Description", options.description.clone()),
        ("Category", options.category.clone()),
        ("Color", options.color.clone()),
        (
            "Source",
            options
                .source
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
        ),
        ("Text", options.text.clone()),
    ];

    let (mut columns, mut rows) = match input {
        Some(input) => {
            let limit = options.limit.unwrap_or(usize::MAX);
            let rows = input.rows.into_iter().take(limit).collect();
            (input.columns, rows)
        }
        None => (
            RESERVED_COLUMNS.iter().map(|column| column.to_string()).collect(),
            vec![TabularRow::new()],
        ),
    };

    for row in &mut rows {
        for (column, fallback) in &fallbacks {
            if let Some(value) = fallback {
                row.entry(column.to_string()).or_insert_with(|| value.clone());
            }
        }
    }

    for (name, value) in literals {
        if !columns.contains(&name) {
            columns.push(name.clone());
        }
        for row in &mut rows {
            row.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }

    Ok((columns, rows))
}

/// Import service facade over a normalized repository.
pub struct ImportService<'a, R: NormRepository> {
    repo: &'a R,
    options: &'a ImportOptions,
    now: NaiveDateTime,
}

impl<'a, R: NormRepository> ImportService<'a, R> {
    pub fn new(repo: &'a R, options: &'a ImportOptions, now: NaiveDateTime) -> Self {
        Self { repo, options, now }
    }

    /// Writes `rows` through the repository. Does not commit.
    pub fn import(
        &self,
        columns: &[String],
        rows: &[TabularRow],
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport {
            rows: rows.len(),
            ..ImportReport::default()
        };
        let user = self.resolve_user()?;
        report.user = user;
        let audit = Audit::new(user, self.now);

        let mut attributes = Vec::new();
        for column in columns.iter().filter(|column| self.is_attribute_column(column)) {
            let values = rows
                .iter()
                .map(|row| row.get(column).map(String::as_str).unwrap_or(""));
            let existing = self.repo.find_source_attribute(column)?;
            let descriptor = match resolve_attribute(existing, column, values) {
                Resolution::Reused(descriptor) => descriptor,
                Resolution::Inferred(descriptor) => {
                    self.repo
                        .insert_source_attribute(&descriptor, DEFAULT_DESCRIPTION, &audit)?;
                    info!(
                        "event=attribute_register module=service status=ok type={} length={}",
                        descriptor.kind.as_db_str(),
                        descriptor.length
                    );
                    report.attributes_registered += 1;
                    descriptor
                }
            };
            attributes.push(descriptor);
        }

        let mut text_nodes = Vec::with_capacity(self.options.text_columns.len());
        for column in &self.options.text_columns {
            let node = match self.repo.find_node_by_name(column)? {
                Some(node) => node,
                None => {
                    report.nodes_created += 1;
                    self.repo.insert_node(&Node {
                        id: Some(Uuid::new_v4()),
                        category: None,
                        name: column.clone(),
                        description: DEFAULT_DESCRIPTION.to_string(),
                        audit,
                    })?
                }
            };
            text_nodes.push((column.as_str(), node));
        }

        let width = rows.len().to_string().len();
        for (index, row) in rows.iter().enumerate() {
            self.import_row(index + 1, width, row, &attributes, &text_nodes, audit, &mut report)?;
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn import_row(
        &self,
        row_number: usize,
        width: usize,
        row: &TabularRow,
        attributes: &[AttributeDescriptor],
        text_nodes: &[(&str, Uuid)],
        audit: Audit,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        let cell = |column: &str| {
            row.get(column)
                .map(String::as_str)
                .filter(|value| !value.is_empty())
        };

        let category = match cell("Category") {
            Some(name) => Some(self.find_or_create_category(name, audit, report)?),
            None => None,
        };
        let name = cell("Name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{row_number:0width$}"));
        let description = cell("Description").unwrap_or(DEFAULT_DESCRIPTION).to_string();
        let existing = self.repo.find_source_by_name(&name)?;
        let id = existing.unwrap_or_else(Uuid::new_v4);

        let values = attributes
            .iter()
            .map(|descriptor| {
                let raw = row.get(&descriptor.name).map(String::as_str).unwrap_or("");
                coerce_value(descriptor, raw).map(|value| (descriptor.id, value))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let content = match cell("Source") {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::read_to_string(&path)
                    .map_err(|source| ImportError::SourceFile { path, source })?
            }
            None => cell("Text").unwrap_or("").to_string(),
        };

        let mut builder = ContentBuilder::new(content);
        let mut taggings = Vec::new();
        for (column, node) in text_nodes {
            let text = row.get(*column).map(String::as_str).unwrap_or("");
            if let Some(fragment) = builder.append_section(column, text) {
                taggings.push(Tagging {
                    id: Some(Uuid::new_v4()),
                    source: id,
                    node: Some(*node),
                    memo: None,
                    fragment: fragment.to_string(),
                    audit,
                });
            }
        }

        let record = SourceRecord {
            id,
            category,
            name,
            description,
            color: cell("Color").map(str::to_string),
            content: builder.into_content(),
            audit,
        };
        if existing.is_some() {
            self.repo.update_source(&record)?;
            for (attribute, _) in &values {
                self.repo.delete_source_values(id, *attribute)?;
            }
            for (_, node) in text_nodes {
                self.repo.delete_taggings(id, *node)?;
            }
            report.sources_updated += 1;
        } else {
            self.repo.insert_source(&record)?;
            report.sources_inserted += 1;
        }

        for (attribute, value) in &values {
            self.repo.insert_source_value(id, *attribute, value, &audit)?;
        }
        report.values_written += values.len();
        for tagging in &taggings {
            self.repo.insert_tagging(tagging)?;
        }
        report.taggings_written += taggings.len();
        Ok(())
    }

    /// Named user, else the project's modifier, else a new default user
    /// together with a project row.
    fn resolve_user(&self) -> Result<Uuid, ImportError> {
        if let Some(name) = &self.options.user {
            if let Some(user) = self.repo.find_user_by_name(name)? {
                return Ok(user.id);
            }
            let user = User {
                id: Uuid::new_v4(),
                name: name.clone(),
            };
            self.repo.insert_user(&user)?;
            return Ok(user.id);
        }

        if let Some(project) = self.repo.load_projects()?.first() {
            return Ok(project.audit.modified_by);
        }

        let user = User {
            id: Uuid::new_v4(),
            name: DEFAULT_USER_NAME.to_string(),
        };
        self.repo.insert_user(&user)?;
        self.repo.insert_project(&Project {
            version: Some(DEFAULT_PROJECT_VERSION.to_string()),
            title: self
                .options
                .project_title
                .clone()
                .unwrap_or_else(|| DEFAULT_PROJECT_TITLE.to_string()),
            description: DEFAULT_DESCRIPTION.to_string(),
            audit: Audit::new(user.id, self.now),
        })?;
        Ok(user.id)
    }

    fn find_or_create_category(
        &self,
        name: &str,
        audit: Audit,
        report: &mut ImportReport,
    ) -> Result<Uuid, ImportError> {
        if let Some(id) = self.repo.find_source_category_by_name(name)? {
            return Ok(id);
        }
        report.categories_created += 1;
        Ok(self.repo.insert_source_category(&Category {
            id: Some(Uuid::new_v4()),
            parent: None,
            name: name.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            audit,
        })?)
    }

    fn is_attribute_column(&self, column: &str) -> bool {
        let listed = |names: &[String]| names.iter().any(|name| name == column);
        (self.options.columns.is_empty() || listed(&self.options.columns))
            && !RESERVED_COLUMNS.contains(&column)
            && !listed(&self.options.exclude)
            && !listed(&self.options.text_columns)
    }
}
