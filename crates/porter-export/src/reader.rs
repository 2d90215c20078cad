//! Export file reader
//!
//! Parses a finished export (plain or gzip) back into its banner, audit
//! comments and table sections.

use crate::codec::{parse_record, Field, COMMENT, DELIM, NEWLINE};
use crate::error::Result;
use crate::value::Value;
use crate::writer::{BANNER_PREFIX, TABLE_PREFIX};
use flate2::read::GzDecoder;
use porter_common::PorterError;
use std::io::Read;
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One header cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderColumn {
    pub name: String,
    pub ty: Option<String>,
}

/// One `Table:` section
#[derive(Debug, Clone, PartialEq)]
pub struct TableSection {
    pub name: String,
    pub columns: Vec<HeaderColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl TableSection {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Every value of one column, in row order
    pub fn column(&self, name: &str) -> Vec<Value> {
        let Some(index) = self.column_index(name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// A parsed export file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportFile {
    pub version: String,
    pub source: Option<String>,
    pub comments: Vec<String>,
    pub tables: Vec<TableSection>,
}

impl ExportFile {
    pub fn table(&self, name: &str) -> Option<&TableSection> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Reads export files
pub struct ExportReader;

impl ExportReader {
    /// Read and parse a file, decompressing it when it starts with the gzip magic
    pub fn open(path: impl AsRef<Path>) -> Result<ExportFile> {
        let bytes = std::fs::read(path.as_ref())?;
        let text = if bytes.starts_with(&GZIP_MAGIC) {
            let mut text = String::new();
            GzDecoder::new(bytes.as_slice()).read_to_string(&mut text)?;
            text
        } else {
            String::from_utf8(bytes).map_err(|e| PorterError::parse(e.to_string()))?
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<ExportFile> {
        let (banner, mut rest) = split_line(text);
        let banner = banner
            .strip_prefix(BANNER_PREFIX)
            .ok_or_else(|| PorterError::parse("missing export banner"))?;
        let mut file = match banner.split_once(", Source: ") {
            Some((version, source)) => ExportFile {
                version: version.to_string(),
                source: Some(source.to_string()),
                ..Default::default()
            },
            None => ExportFile {
                version: banner.to_string(),
                ..Default::default()
            },
        };

        while !rest.is_empty() {
            let (line, after) = split_line(rest);
            rest = after;

            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix(COMMENT) {
                file.comments.push(comment.strip_prefix(' ').unwrap_or(comment).to_string());
                continue;
            }
            let Some(name) = line.strip_prefix(TABLE_PREFIX) else {
                return Err(PorterError::parse(format!("unexpected line: {}", line)).into());
            };

            let (header, after) = split_line(rest);
            rest = after;
            let mut section = TableSection {
                name: name.to_string(),
                columns: parse_header(header),
                rows: Vec::new(),
            };
            if header.is_empty() {
                file.tables.push(section);
                continue;
            }

            loop {
                if rest.is_empty() {
                    break;
                }
                if let Some(after) = rest.strip_prefix(NEWLINE) {
                    rest = after;
                    break;
                }
                let (fields, after) = parse_record(rest)
                    .map_err(|e| PorterError::parse(format!("table {}: {}", section.name, e)))?;
                section.rows.push(fields.iter().map(Field::to_value).collect());
                rest = after;
            }
            file.tables.push(section);
        }

        Ok(file)
    }
}

fn split_line(input: &str) -> (&str, &str) {
    input.split_once(NEWLINE).unwrap_or((input, ""))
}

fn parse_header(header: &str) -> Vec<HeaderColumn> {
    if header.is_empty() {
        return Vec::new();
    }
    split_header_cells(header)
        .into_iter()
        .map(|cell| match cell.split_once(':') {
            Some((name, ty)) => HeaderColumn {
                name: name.to_string(),
                ty: Some(ty.to_string()),
            },
            None => HeaderColumn {
                name: cell.to_string(),
                ty: None,
            },
        })
        .collect()
}

/// Split on delimiters outside parentheses, so `decimal(10,2)` stays one type
fn split_header_cells(header: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in header.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            DELIM if depth == 0 => {
                cells.push(&header[start..i]);
                start = i + c.len_utf8();
            },
            _ => {},
        }
    }
    cells.push(&header[start..]);
    cells
}
