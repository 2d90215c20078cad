//! Declarative export plans
//!
//! A plan is a YAML document holding everything forum-specific about one
//! export: the SQL for each canonical table, how its columns map, which source
//! tables must exist, which blobs to extract and how to find conversations.
//!
//! ```yaml
//! source: vBulletin 3.x
//! prefix: vb_
//! required:
//!   user: [userid, username, email]
//! tables:
//!   - table: User
//!     query: SELECT * FROM :_user
//!     mapping:
//!       userid: UserID               # canonical column: renamed
//!       homepage: varchar(255)       # anything else: kept with this type
//!       title: { Column: Title, Type: varchar(100), Filter: html_decode }
//!     derive:
//!       - { Column: Format, Value: BBCode }
//!     permissions:
//!       genericpermissions:
//!         1024: Garden.SignIn.Allow
//! ```
//!
//! The string-or-map shape of each mapping entry is looked at once, here; the
//! rest of the engine only sees [`MappingEntry`] values.

use crate::blob::{AttachmentColumns, BlobKind};
use crate::conversations::ConversationQueries;
use crate::error::{ExportError, Result};
use crate::mapping::{DerivedColumn, MappingEntry, MappingSpec};
use crate::permissions::{PermissionIndex, PermissionTable};
use crate::schema::{CanonicalSchema, TableSchema};
use crate::transform::Transform;
use crate::value::Value;
use crate::verify::SourceManifest;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One canonical table and the query that fills it
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub table: String,
    pub query: String,
    pub mapping: MappingSpec,
}

/// One blob extraction job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlobJob {
    pub name: String,
    pub query: String,
    /// Column holding the binary payload
    pub payload: String,
    #[serde(flatten)]
    pub kind: BlobKind,
}

/// A loaded export plan
#[derive(Debug, Clone, Default)]
pub struct ExportPlan {
    /// Label written in the banner
    pub source: String,
    /// Default table prefix, used when none is configured
    pub prefix: Option<String>,
    pub required: SourceManifest,
    pub tables: Vec<TablePlan>,
    pub blobs: Vec<BlobJob>,
    pub conversations: Option<ConversationQueries>,
}

impl ExportPlan {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading export plan");
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawPlan = serde_yaml::from_str(yaml)?;
        raw.build()
    }

    pub fn table(&self, name: &str) -> Option<&TablePlan> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Destination tables in export order, conversation tables included
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.table.clone()).collect();
        if self.conversations.is_some() {
            names.extend(
                ["Conversation", "ConversationMessage", "UserConversation"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        names
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default)]
    source: String,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    required: SourceManifest,
    #[serde(default)]
    tables: Vec<RawTable>,
    #[serde(default)]
    blobs: Vec<BlobJob>,
    #[serde(default)]
    conversations: Option<RawConversations>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    table: String,
    query: String,
    #[serde(default)]
    mapping: BTreeMap<String, RawEntry>,
    #[serde(default)]
    derive: Vec<RawRule>,
    #[serde(default)]
    permissions: PermissionTable,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConversations {
    messages: String,
    #[serde(default)]
    recipients: Vec<String>,
    #[serde(default)]
    mappings: BTreeMap<String, BTreeMap<String, RawEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Name(String),
    Rule(RawRule),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(rename = "Column")]
    column: Option<String>,
    #[serde(rename = "Type")]
    ty: Option<String>,
    #[serde(rename = "Filter")]
    filter: Option<String>,
    #[serde(rename = "From")]
    from: Option<String>,
    #[serde(rename = "Value")]
    value: Option<serde_yaml::Value>,
}

impl RawPlan {
    fn build(self) -> Result<ExportPlan> {
        let schema = CanonicalSchema::get();

        let tables = self
            .tables
            .into_iter()
            .map(|raw| {
                let table = schema.table(&raw.table);
                raw.build(table)
            })
            .collect::<Result<Vec<_>>>()?;

        let conversations = self
            .conversations
            .map(|raw| -> Result<ConversationQueries> {
                let mut mappings = BTreeMap::new();
                for (table, entries) in raw.mappings {
                    let schema_table = schema.table(&table).ok_or_else(|| {
                        ExportError::invalid_plan(format!("{} is not a conversation table", table))
                    })?;
                    mappings.insert(table, build_mapping(entries, Some(schema_table))?);
                }
                Ok(ConversationQueries {
                    messages: raw.messages,
                    recipients: raw.recipients,
                    mappings,
                })
            })
            .transpose()?;

        Ok(ExportPlan {
            source: self.source,
            prefix: self.prefix,
            required: self.required,
            tables,
            blobs: self.blobs,
            conversations,
        })
    }
}

impl RawTable {
    fn build(self, table: Option<&TableSchema>) -> Result<TablePlan> {
        let mut mapping = build_mapping(self.mapping, table)?;

        for rule in self.derive {
            let name = rule
                .column
                .clone()
                .ok_or_else(|| ExportError::invalid_plan(format!("{}: derived column without Column", self.table)))?;
            let transform = rule_transform(&rule)?.ok_or_else(|| {
                ExportError::invalid_plan(format!("{}.{}: derived column needs a Filter or Value", self.table, name))
            })?;
            mapping.derive(DerivedColumn {
                name,
                ty: rule.ty,
                from: rule.from,
                transform,
            });
        }

        let index = PermissionIndex::build(&self.permissions);
        for column in index.derived_columns() {
            mapping.derive(column);
        }

        Ok(TablePlan {
            table: self.table,
            query: self.query,
            mapping,
        })
    }
}

fn build_mapping(entries: BTreeMap<String, RawEntry>, table: Option<&TableSchema>) -> Result<MappingSpec> {
    let mut mapping = MappingSpec::new();
    for (source, raw) in entries {
        let entry = match raw {
            RawEntry::Name(target) => classify_name(&source, target, table),
            RawEntry::Rule(rule) => {
                if rule.from.is_some() {
                    return Err(ExportError::invalid_plan(format!(
                        "{}: From is only allowed on derived columns",
                        source
                    )));
                }
                MappingEntry::Rule {
                    name: rule.column.clone().unwrap_or_else(|| source.clone()),
                    ty: rule.ty.clone(),
                    transform: rule_transform(&rule)?,
                }
            },
        };
        mapping.insert(source, entry);
    }
    if let Some(table) = table {
        mapping.validate(table)?;
    }
    Ok(mapping)
}

/// A canonical column name renames; a lowercase word such as `varchar(255)` is a
/// type for a new column; anything else is taken as a column name and checked.
fn classify_name(source: &str, target: String, table: Option<&TableSchema>) -> MappingEntry {
    let canonical = table.is_some_and(|t| t.has_column(&target));
    let looks_like_type = target.starts_with(|c: char| c.is_ascii_lowercase());
    if !canonical && looks_like_type {
        MappingEntry::NewColumn {
            name: source.to_string(),
            ty: target,
        }
    } else {
        MappingEntry::Direct(target)
    }
}

fn rule_transform(rule: &RawRule) -> Result<Option<Transform>> {
    match (&rule.filter, &rule.value) {
        (Some(_), Some(_)) => Err(ExportError::invalid_plan("Filter and Value cannot be combined")),
        (Some(filter), None) => parse_filter(filter).map(Some),
        (None, Some(value)) => constant(value).map(|v| Some(Transform::Constant(v))),
        (None, None) => Ok(None),
    }
}

fn parse_filter(name: &str) -> Result<Transform> {
    match name {
        "html_decode" => Transform::html_decode(),
        "mime_type" => Ok(Transform::MimeType),
        "sign_in_permission" => Ok(Transform::SignInPermission),
        "attachment_path" => Ok(Transform::AttachmentPath(AttachmentColumns::default())),
        other => Err(ExportError::invalid_plan(format!("unknown filter: {}", other))),
    }
}

fn constant(value: &serde_yaml::Value) -> Result<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_yaml::Value::String(s) => Value::Text(s.clone()),
        _ => return Err(ExportError::invalid_plan("Value must be a scalar")),
    })
}
