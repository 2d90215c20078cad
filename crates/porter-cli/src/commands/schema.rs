//! `porter schema` command implementation

use crate::error::{CliError, Result};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use porter_export::schema::{CanonicalSchema, TableSchema};
use serde_json::json;

/// Print the canonical schema, or one table of it
pub fn run(table: Option<&str>, json: bool) -> Result<()> {
    let schema = CanonicalSchema::get();
    let tables: Vec<&TableSchema> = match table {
        Some(name) => vec![find_table(schema, name)?],
        None => schema.tables().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&tables))?);
        return Ok(());
    }

    for t in tables {
        println!("{}", t.name.cyan().bold());
        let mut out = Table::new();
        out.load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Column", "Type"]);
        for (column, ty) in &t.columns {
            out.add_row(vec![*column, *ty]);
        }
        println!("{}", out);
        println!();
    }
    Ok(())
}

/// Table lookup, exact first and then case-insensitive
fn find_table<'a>(schema: &'a CanonicalSchema, name: &str) -> Result<&'a TableSchema> {
    schema
        .table(name)
        .or_else(|| schema.tables().find(|t| t.name.eq_ignore_ascii_case(name)))
        .ok_or_else(|| CliError::unknown_table(name))
}

fn to_json(tables: &[&TableSchema]) -> serde_json::Value {
    let tables: Vec<serde_json::Value> = tables
        .iter()
        .map(|t| {
            let columns: Vec<serde_json::Value> = t
                .columns
                .iter()
                .map(|(name, ty)| json!({ "name": name, "type": ty }))
                .collect();
            json!({ "table": t.name, "columns": columns })
        })
        .collect();
    serde_json::Value::Array(tables)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_find_table_ignores_case() {
        let schema = CanonicalSchema::get();
        assert_eq!(find_table(schema, "user").unwrap().name, "User");
        assert!(matches!(find_table(schema, "Forum"), Err(CliError::UnknownTable(_))));
    }

    #[test]
    fn test_json_shape() {
        let schema = CanonicalSchema::get();
        let user = find_table(schema, "User").unwrap();
        let value = to_json(&[user]);

        assert_eq!(value[0]["table"], "User");
        assert_eq!(value[0]["columns"][0]["name"], user.columns[0].0);
        assert_eq!(value[0]["columns"][0]["type"], user.columns[0].1);
    }
}
