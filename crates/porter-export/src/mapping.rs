//! Mapping resolution
//!
//! A [`MappingSpec`] says how source columns become destination columns. The
//! first row of a table fixes a [`ResolvedStructure`] (header plus per-column
//! projection) that every later row of the same table is written with.
//!
//! Resolution per source column, first match wins:
//!
//! 1. [`MappingEntry::Direct`] onto a canonical column, canonical type
//! 2. [`MappingEntry::NewColumn`] with its declared type, annotated in the header
//! 3. [`MappingEntry::Rule`] with optional type and transform
//! 4. no entry, and the name is itself a canonical column: passed through
//! 5. anything else is dropped
//!
//! Canonical columns are written in schema order, then annotated columns in the
//! order the first row presented them, then derived columns.

use crate::error::{ExportError, Result};
use crate::schema::TableSchema;
use crate::transform::Transform;
use crate::value::{Row, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Type given to a rule column that names neither a type nor a canonical column
pub const DEFAULT_COLUMN_TYPE: &str = "varchar(255)";

/// How one source column maps onto the destination table
#[derive(Debug, Clone)]
pub enum MappingEntry {
    /// Rename onto an existing canonical column
    Direct(String),
    /// Keep the source column as a new, typed destination column
    NewColumn { name: String, ty: String },
    /// Full rule: destination name, optional type, optional transform
    Rule {
        name: String,
        ty: Option<String>,
        transform: Option<Transform>,
    },
}

/// A destination column computed from the whole row rather than one source column
#[derive(Debug, Clone)]
pub struct DerivedColumn {
    pub name: String,
    pub ty: Option<String>,
    /// Source column whose value is handed to the transform, if any
    pub from: Option<String>,
    pub transform: Transform,
}

/// Mapping for one destination table
#[derive(Debug, Clone, Default)]
pub struct MappingSpec {
    entries: BTreeMap<String, MappingEntry>,
    derived: Vec<DerivedColumn>,
}

impl MappingSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for a source column
    pub fn insert(&mut self, source: impl Into<String>, entry: MappingEntry) {
        self.entries.insert(source.into(), entry);
    }

    /// Builder-style [`MappingSpec::insert`]
    pub fn with(mut self, source: impl Into<String>, entry: MappingEntry) -> Self {
        self.insert(source, entry);
        self
    }

    pub fn derive(&mut self, column: DerivedColumn) {
        self.derived.push(column);
    }

    pub fn get(&self, source: &str) -> Option<&MappingEntry> {
        self.entries.get(source)
    }

    pub fn derived(&self) -> &[DerivedColumn] {
        &self.derived
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.derived.is_empty()
    }

    /// Layer `other` over this spec. Entries in `other` replace entries for the
    /// same source column; derived columns are appended.
    pub fn merge(&mut self, other: &MappingSpec) {
        for (source, entry) in &other.entries {
            self.entries.insert(source.clone(), entry.clone());
        }
        self.derived.extend(other.derived.iter().cloned());
    }

    /// Reject Direct entries that name a column the table does not have
    pub fn validate(&self, table: &TableSchema) -> Result<()> {
        for (source, entry) in &self.entries {
            if let MappingEntry::Direct(target) = entry {
                if !table.has_column(target) {
                    return Err(ExportError::invalid_plan(format!(
                        "{}.{} maps to {}, which is not a {} column",
                        table.name, source, target, table.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Where a resolved column takes its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Source(String),
    Derived(Option<String>),
}

/// One column of a resolved structure
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub name: String,
    pub ty: String,
    /// Written as `name:type` in the header
    pub annotated: bool,
    pub origin: Origin,
    pub transform: Option<Transform>,
}

impl ResolvedColumn {
    /// Header cell for this column
    pub fn header(&self) -> String {
        if self.annotated {
            format!("{}:{}", self.name, self.ty)
        } else {
            self.name.clone()
        }
    }

    fn value(&self, row: &Row) -> Value {
        let raw = match &self.origin {
            Origin::Source(source) | Origin::Derived(Some(source)) => {
                row.get(source).cloned().unwrap_or(Value::Null)
            },
            Origin::Derived(None) => Value::Null,
        };
        match &self.transform {
            Some(transform) => transform.apply(&raw, row),
            None => raw,
        }
    }
}

/// Column layout fixed from a table's first row
#[derive(Debug, Clone)]
pub struct ResolvedStructure {
    columns: Vec<ResolvedColumn>,
}

impl ResolvedStructure {
    pub fn resolve(table: &TableSchema, spec: &MappingSpec, first: &Row) -> Self {
        let mut claimed = HashSet::new();
        let mut canonical = Vec::new();
        let mut declared = Vec::new();

        for source in first.column_names() {
            let Some(column) = resolve_source(table, spec, source) else {
                debug!(table = table.name, column = source, "Dropping unmapped column");
                continue;
            };
            if !claimed.insert(column.name.clone()) {
                debug!(table = table.name, column = %column.name, "Column already claimed");
                continue;
            }
            if column.annotated {
                declared.push(column);
            } else {
                canonical.push(column);
            }
        }

        let mut derived = Vec::new();
        for d in spec.derived() {
            if !claimed.insert(d.name.clone()) {
                continue;
            }
            let (ty, annotated) = classify(table, &d.name, d.ty.as_deref());
            let column = ResolvedColumn {
                name: d.name.clone(),
                ty,
                annotated,
                origin: Origin::Derived(d.from.clone()),
                transform: Some(d.transform.clone()),
            };
            if annotated {
                derived.push(column);
            } else {
                canonical.push(column);
            }
        }

        canonical.sort_by_key(|c| table.position(&c.name).unwrap_or(usize::MAX));
        canonical.extend(declared);
        canonical.extend(derived);
        Self { columns: canonical }
    }

    pub fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn header_cells(&self) -> Vec<String> {
        self.columns.iter().map(ResolvedColumn::header).collect()
    }

    /// Values of one row in header order. Missing source columns become NULL.
    pub fn project(&self, row: &Row) -> Vec<Value> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }
}

fn resolve_source(table: &TableSchema, spec: &MappingSpec, source: &str) -> Option<ResolvedColumn> {
    let (name, ty, annotated, transform) = match spec.get(source) {
        Some(MappingEntry::Direct(target)) => {
            let ty = table.column_type(target)?;
            (target.clone(), ty.to_string(), false, None)
        },
        Some(MappingEntry::NewColumn { name, ty }) => (name.clone(), ty.clone(), true, None),
        Some(MappingEntry::Rule { name, ty, transform }) => {
            let (ty, annotated) = classify(table, name, ty.as_deref());
            (name.clone(), ty, annotated, transform.clone())
        },
        None => {
            let ty = table.column_type(source)?;
            (source.to_string(), ty.to_string(), false, None)
        },
    };

    Some(ResolvedColumn {
        name,
        ty,
        annotated,
        origin: Origin::Source(source.to_string()),
        transform,
    })
}

/// An explicit type always wins and is annotated. Without one, a canonical
/// column keeps its type and anything else falls back to [`DEFAULT_COLUMN_TYPE`].
fn classify(table: &TableSchema, name: &str, ty: Option<&str>) -> (String, bool) {
    match (ty, table.column_type(name)) {
        (Some(ty), _) => (ty.to_string(), true),
        (None, Some(canonical)) => (canonical.to_string(), false),
        (None, None) => (DEFAULT_COLUMN_TYPE.to_string(), true),
    }
}
