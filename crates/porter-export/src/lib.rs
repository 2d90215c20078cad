//! Forum Porter Export Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Reconciles heterogeneous relational forum schemas into the fixed canonical
//! schema and writes them out in the escaped, delimited "Vanilla Export" text
//! format.
//!
//! # Overview
//!
//! - **Schema Registry** ([`schema`]): the canonical target tables and columns
//! - **Mapping Resolver** ([`mapping`], [`transform`]): source columns to canonical columns
//! - **Row Serializer** ([`codec`], [`writer`]): value escaping and section framing
//! - **Blob Extractor** ([`blob`]): binary payloads to deterministic file paths
//! - **Permission Expander** ([`permissions`]): bitmask fields to boolean columns
//! - **Conversation Clustering** ([`conversations`]): threads rebuilt from flat messages
//! - **Row Sources** ([`source`]): the database collaborator, SQLite bundled
//! - **Pre-flight** ([`verify`]): required tables and columns
//! - **Plans** ([`plan`]): declarative YAML description of one export
//! - **Orchestration** ([`exporter`]): runs a plan end to end
//! - **Reading** ([`reader`]): parses export files back
//!
//! # Example
//!
//! ```no_run
//! use porter_export::{ExportPlan, Exporter, ExportOptions, SqliteSource};
//!
//! fn main() -> porter_export::Result<()> {
//!     let plan = ExportPlan::load("vbulletin.yml")?;
//!     let source = SqliteSource::open("forum.db", "vb_")?;
//!     let options = ExportOptions::new("./out");
//!     let summary = Exporter::new(&source, options).run(&plan)?;
//!     println!("wrote {}", summary.path.display());
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod codec;
pub mod conversations;
pub mod error;
pub mod exporter;
pub mod mapping;
pub mod permissions;
pub mod plan;
pub mod reader;
pub mod schema;
pub mod source;
pub mod transform;
pub mod value;
pub mod verify;
pub mod writer;

// Re-export commonly used types
pub use error::{ExportError, Result};
pub use exporter::{ExportOptions, ExportReport, ExportSummary, Exporter};
pub use plan::ExportPlan;
pub use reader::{ExportFile, ExportReader};
pub use source::{RowSource, SqliteSource};
pub use value::{Row, Value};
