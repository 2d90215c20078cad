//! Permission bitmask expansion
//!
//! Source forums pack permissions into integer fields. A permission table maps
//! each field and bit mask to one or more destination columns. The table is
//! inverted once into a [`PermissionIndex`] and handed to the mapping as derived
//! boolean columns.

use crate::mapping::DerivedColumn;
use crate::transform::{has_mask, Transform};
use crate::value::Row;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Type of every expanded permission column
pub const PERMISSION_COLUMN_TYPE: &str = "tinyint(1)";

/// One mask may feed one column or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTargets {
    One(String),
    Many(Vec<String>),
}

impl ColumnTargets {
    pub fn names(&self) -> &[String] {
        match self {
            ColumnTargets::One(name) => std::slice::from_ref(name),
            ColumnTargets::Many(names) => names,
        }
    }
}

/// Source field -> mask -> destination column(s), as written in a plan
pub type PermissionTable = BTreeMap<String, BTreeMap<i64, ColumnTargets>>;

/// One destination column and the bit test that fills it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionColumn {
    pub column: String,
    pub field: String,
    pub mask: i64,
}

/// Reverse index from destination column to (field, mask)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionIndex {
    columns: Vec<PermissionColumn>,
}

impl PermissionIndex {
    /// Invert a permission table. Fields are visited in name order and masks
    /// ascending. A column named twice keeps the position of its first mention
    /// and the (field, mask) of its last.
    pub fn build(table: &PermissionTable) -> Self {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut columns: Vec<PermissionColumn> = Vec::new();
        for (field, masks) in table {
            for (mask, targets) in masks {
                for name in targets.names() {
                    match positions.get(name.as_str()) {
                        Some(&at) => {
                            columns[at].field = field.clone();
                            columns[at].mask = *mask;
                        },
                        None => {
                            positions.insert(name.as_str(), columns.len());
                            columns.push(PermissionColumn {
                                column: name.clone(),
                                field: field.clone(),
                                mask: *mask,
                            });
                        },
                    }
                }
            }
        }
        Self { columns }
    }

    pub fn columns(&self) -> &[PermissionColumn] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Evaluate every column against one row
    pub fn evaluate<'a>(&'a self, row: &Row) -> Vec<(&'a str, bool)> {
        self.columns
            .iter()
            .map(|c| {
                let bits = row.get(&c.field).and_then(|v| v.as_i64());
                (c.column.as_str(), has_mask(bits, c.mask))
            })
            .collect()
    }

    /// The index as derived mapping columns
    pub fn derived_columns(&self) -> Vec<DerivedColumn> {
        self.columns
            .iter()
            .map(|c| DerivedColumn {
                name: c.column.clone(),
                ty: Some(PERMISSION_COLUMN_TYPE.to_string()),
                from: None,
                transform: Transform::Permission {
                    field: c.field.clone(),
                    mask: c.mask,
                },
            })
            .collect()
    }
}
