//! `porter inspect` command implementation
//!
//! Reads an export file back (plain or gzip) and shows what it contains.

use crate::error::{CliError, Result};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use porter_export::reader::{ExportFile, ExportReader, TableSection};
use porter_export::Value;
use std::path::PathBuf;

/// Longest cell shown before truncation
const MAX_CELL_CHARS: usize = 60;

/// Inspect an export file
pub fn run(file: PathBuf, table: Option<&str>, limit: usize) -> Result<()> {
    if !file.is_file() {
        return Err(CliError::file_not_found(file.display().to_string()));
    }
    let export = ExportReader::open(&file)?;

    match table {
        Some(name) => {
            let section = export
                .tables
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| CliError::unknown_table(name))?;
            print_rows(section, limit);
        },
        None => print_overview(&export),
    }
    Ok(())
}

fn print_overview(export: &ExportFile) {
    println!("{}", "Export File:".cyan().bold());
    println!("  Version: {}", export.version);
    println!("  Source:  {}", export.source.as_deref().unwrap_or("-"));
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Table", "Columns", "Rows"]);
    for section in &export.tables {
        table.add_row(vec![
            section.name.clone(),
            section.columns.len().to_string(),
            section.rows.len().to_string(),
        ]);
    }
    println!("{}", table);

    if !export.comments.is_empty() {
        println!();
        println!("{}", "Comments:".cyan().bold());
        for comment in &export.comments {
            if comment.starts_with("Error:") {
                println!("  {}", comment.red());
            } else {
                println!("  {}", comment);
            }
        }
    }
}

fn print_rows(section: &TableSection, limit: usize) {
    println!("{}", section.name.cyan().bold());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(section.columns.iter().map(|c| match &c.ty {
            Some(ty) => format!("{}:{}", c.name, ty),
            None => c.name.clone(),
        }));
    for row in section.rows.iter().take(limit) {
        table.add_row(row.iter().map(display_cell));
    }
    println!("{}", table);

    if section.rows.len() > limit {
        println!("  ... {} more rows", section.rows.len() - limit);
    }
}

fn display_cell(value: &Value) -> String {
    let text = match value {
        Value::Null => return "NULL".to_string(),
        Value::Blob(bytes) => return format!("<{} bytes>", bytes.len()),
        Value::Bool(b) => i64::from(*b).to_string(),
        other => other.as_text().unwrap_or_default(),
    };
    if text.chars().count() > MAX_CELL_CHARS {
        let cut: String = text.chars().take(MAX_CELL_CHARS).collect();
        format!("{}…", cut)
    } else {
        text
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_cell() {
        assert_eq!(display_cell(&Value::Null), "NULL");
        assert_eq!(display_cell(&Value::Integer(42)), "42");
        assert_eq!(display_cell(&Value::Blob(vec![0; 3])), "<3 bytes>");

        let long = "x".repeat(100);
        let shown = display_cell(&Value::Text(long));
        assert_eq!(shown.chars().count(), MAX_CELL_CHARS + 1);
        assert!(shown.ends_with('…'));
    }
}
