//! Export orchestration
//!
//! [`Exporter::run`] checks the source against the plan's manifest, then writes
//! one section per planned table, extracts blobs and rebuilds conversations.
//! A failing table is recorded as a comment and skipped; only a schema
//! mismatch or a failure to write the export file itself ends the run.

use crate::blob::{BlobExtractor, BlobRecord};
use crate::conversations::{self, ConversationQueries, ScratchTables};
use crate::error::{ExportError, Result};
use crate::mapping::{MappingSpec, ResolvedStructure};
use crate::plan::{BlobJob, ExportPlan};
use crate::schema::CanonicalSchema;
use crate::source::RowSource;
use crate::verify::verify_source;
use crate::writer::{ExportWriter, OutputSink};
use chrono::{DateTime, Local};
use porter_common::time::{file_stamp, format_elapsed, format_timestamp};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Options for one export run
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Directory for the export file and extracted blobs
    pub output_dir: PathBuf,
    /// Explicit export file path; defaults to a timestamped name in `output_dir`
    pub output_path: Option<PathBuf>,
    pub compress: bool,
    /// Only export these destination tables (case-insensitive)
    pub tables: Option<Vec<String>>,
    pub blobs: bool,
    pub conversations: bool,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_path: None,
            compress: true,
            tables: None,
            blobs: true,
            conversations: true,
        }
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn with_blobs(mut self, blobs: bool) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_conversations(mut self, conversations: bool) -> Self {
        self.conversations = conversations;
        self
    }

    /// `export <Y-m-d HMS>.txt[.gz]`
    pub fn default_file_name(&self, at: DateTime<Local>) -> String {
        format!("export {}.txt{}", file_stamp(at), if self.compress { ".gz" } else { "" })
    }

    fn selects(&self, table: &str) -> bool {
        self.tables
            .as_ref()
            .is_none_or(|tables| tables.iter().any(|t| t.eq_ignore_ascii_case(table)))
    }
}

/// One exported section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub rows: u64,
    pub elapsed: Duration,
}

/// A table or job that was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub table: String,
    pub reason: String,
}

/// What a run wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub tables: Vec<TableReport>,
    pub failures: Vec<TableFailure>,
    pub blobs: u64,
    pub elapsed: Duration,
}

impl ExportReport {
    pub fn rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of [`Exporter::run`]
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub report: ExportReport,
}

/// Runs export plans against a row source
pub struct Exporter<'a, S: RowSource + ?Sized> {
    source: &'a S,
    options: ExportOptions,
}

impl<'a, S: RowSource + ?Sized> Exporter<'a, S> {
    pub fn new(source: &'a S, options: ExportOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Verify the source, then write the export file
    #[instrument(skip_all, fields(source = %plan.source))]
    pub fn run(&self, plan: &ExportPlan) -> Result<ExportSummary> {
        verify_source(self.source, &plan.required)?;

        std::fs::create_dir_all(&self.options.output_dir)?;
        let path = match &self.options.output_path {
            Some(path) => path.clone(),
            None => self
                .options
                .output_dir
                .join(self.options.default_file_name(Local::now())),
        };

        let mut writer = ExportWriter::new(OutputSink::create(&path, self.options.compress)?);
        let report = self.write_to(plan, &mut writer)?;
        writer.into_inner().finish()?;

        info!(
            path = %path.display(),
            tables = report.tables.len(),
            rows = report.rows(),
            failures = report.failures.len(),
            "Export finished"
        );
        Ok(ExportSummary { path, report })
    }

    /// Write the whole export to `writer` without the pre-flight check
    pub fn write_to<W: Write>(&self, plan: &ExportPlan, writer: &mut ExportWriter<W>) -> Result<ExportReport> {
        let clock = Instant::now();
        let label = if plan.source.is_empty() {
            self.source.label()
        } else {
            plan.source.clone()
        };

        writer.banner(&label)?;
        writer.comment(&format!("Export Started: {}", format_timestamp(Local::now())))?;

        let mut report = ExportReport::default();
        for table in plan.tables.iter().filter(|t| self.options.selects(&t.table)) {
            self.export_table(writer, &table.table, &table.query, &table.mapping, &mut report)?;
        }

        if self.options.blobs {
            for job in &plan.blobs {
                self.extract_blobs(writer, job, &mut report)?;
            }
        }

        if self.options.conversations {
            if let Some(queries) = &plan.conversations {
                self.export_conversations(writer, queries, &mut report)?;
            }
        }

        report.elapsed = clock.elapsed();
        writer.comment(&format!("Export Completed: {}", format_timestamp(Local::now())))?;
        writer.comment(&format!("Elapsed Time: {}", format_elapsed(report.elapsed)))?;
        Ok(report)
    }

    /// Export one table section. Errors other than IO on the export file are
    /// recorded and swallowed.
    #[instrument(skip(self, writer, query, mapping, report))]
    fn export_table<W: Write>(
        &self,
        writer: &mut ExportWriter<W>,
        table: &str,
        query: &str,
        mapping: &MappingSpec,
        report: &mut ExportReport,
    ) -> Result<()> {
        let schema = CanonicalSchema::get();
        let Some(table_schema) = schema.table(table) else {
            let reason = format!(
                "{} is not a valid export. The valid tables for export are {}.",
                table,
                schema.table_names().join(", ")
            );
            warn!("{}", reason);
            writer.comment(&format!("Error: {}", reason))?;
            report.failures.push(TableFailure {
                table: table.to_string(),
                reason,
            });
            return Ok(());
        };

        let started = Instant::now();
        let mut structure: Option<ResolvedStructure> = None;
        let mut rows = 0u64;
        let mut dropped = 0u64;
        let result = self.source.query(query, &mut |row| {
            if structure.is_none() {
                let resolved = ResolvedStructure::resolve(table_schema, mapping, row);
                writer.begin_table(table)?;
                // A header-less section must stay empty: blank lines end it
                if !resolved.is_empty() {
                    writer.header(&resolved)?;
                }
                structure = Some(resolved);
            }
            match &structure {
                Some(resolved) if !resolved.is_empty() => {
                    writer.row(&resolved.project(row))?;
                    rows += 1;
                },
                _ => dropped += 1,
            }
            Ok(())
        });

        let began = structure.is_some();
        match result {
            Ok(_) => {
                if !began {
                    writer.begin_table(table)?;
                }
                writer.end_table()?;
                if dropped > 0 {
                    let reason = format!(
                        "no column of {} maps to the canonical schema, {} rows dropped",
                        table, dropped
                    );
                    warn!("{}", reason);
                    writer.comment(&format!("Warning: {}", reason))?;
                }
                let elapsed = started.elapsed();
                writer.comment(&format!(
                    "Exported Table: {} ({} rows, {})",
                    table,
                    rows,
                    format_elapsed(elapsed)
                ))?;
                info!(rows, elapsed = %format_elapsed(elapsed), "Exported table");
                report.tables.push(TableReport {
                    table: table.to_string(),
                    rows,
                    elapsed,
                });
            },
            Err(ExportError::Io(e)) => return Err(ExportError::Io(e)),
            Err(e) => {
                if began {
                    writer.end_table()?;
                }
                self.record_failure(writer, table, &e, report)?;
            },
        }
        Ok(())
    }

    #[instrument(skip(self, writer, report), fields(job = %job.name))]
    fn extract_blobs<W: Write>(
        &self,
        writer: &mut ExportWriter<W>,
        job: &BlobJob,
        report: &mut ExportReport,
    ) -> Result<()> {
        let extractor = BlobExtractor::new(&self.options.output_dir);
        let started = Instant::now();
        let mut written = 0u64;
        let result = self.source.query(&job.query, &mut |row| {
            if let Some(record) = BlobRecord::from_row(row, &job.payload, &job.kind) {
                extractor.write(&record)?;
                written += 1;
            }
            Ok(())
        });

        match result {
            Ok(streamed) => {
                let elapsed = started.elapsed();
                writer.comment(&format!(
                    "Exported {} blobs to {}/ ({})",
                    written,
                    job.kind.root(),
                    format_elapsed(elapsed)
                ))?;
                info!(written, skipped = streamed - written, "Extracted blobs");
                report.blobs += written;
                Ok(())
            },
            Err(e) => self.record_failure(writer, &job.name, &e, report),
        }
    }

    #[instrument(skip_all)]
    fn export_conversations<W: Write>(
        &self,
        writer: &mut ExportWriter<W>,
        queries: &ConversationQueries,
        report: &mut ExportReport,
    ) -> Result<()> {
        let exports: Vec<_> = conversations::export_queries(queries)
            .into_iter()
            .filter(|e| self.options.selects(e.table))
            .collect();
        if exports.is_empty() {
            return Ok(());
        }

        let scratch = match self.prepare_conversations(queries) {
            Ok(scratch) => scratch,
            Err(ExportError::Io(e)) => return Err(ExportError::Io(e)),
            Err(e) => return self.record_failure(writer, "conversations", &e, report),
        };

        for export in &exports {
            self.export_table(writer, export.table, &export.sql, &export.mapping, report)?;
        }
        drop(scratch);
        Ok(())
    }

    fn prepare_conversations(&self, queries: &ConversationQueries) -> Result<ScratchTables<'a, S>> {
        let clustering = conversations::collect(self.source, queries)?.build();
        let scratch = ScratchTables::create(self.source)?;
        scratch.fill(&clustering)?;
        Ok(scratch)
    }

    fn record_failure<W: Write>(
        &self,
        writer: &mut ExportWriter<W>,
        table: &str,
        error: &ExportError,
        report: &mut ExportReport,
    ) -> Result<()> {
        let reason = match error {
            ExportError::SourceUnavailable { message, .. } => message.clone(),
            ExportError::Sqlite(e) => e.to_string(),
            other => other.to_string(),
        };
        warn!(table, error = %reason, "Export step failed");
        writer.comment(&format!("Error: failed to export {}: {}", table, reason))?;
        report.failures.push(TableFailure {
            table: table.to_string(),
            reason,
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::reader::{ExportFile, ExportReader};
    use crate::source::SqliteSource;
    use crate::value::Value;

    const FIXTURE: &str = "
        CREATE TABLE vb_user (userid INTEGER, username TEXT, email TEXT, homepage TEXT);
        INSERT INTO vb_user VALUES (1, 'ann', 'ann@example.com', 'http://ann.example'),
                                   (2, 'bob, \"the builder\"', NULL, NULL);
        CREATE TABLE vb_usergroup (usergroupid INTEGER, title TEXT, genericpermissions INTEGER);
        INSERT INTO vb_usergroup VALUES (1, 'Unregistered / Not Logged In', 0),
                                        (2, 'Registered Users', 1026);
        CREATE TABLE vb_thread (threadid INTEGER, title TEXT, forumid INTEGER);
        CREATE TABLE vb_attachment (attachmentid INTEGER, userid INTEGER, filedata BLOB);
        INSERT INTO vb_attachment VALUES (77, 312, x'00ff10'), (78, 312, NULL);
        CREATE TABLE vb_pmtext (pmtextid INTEGER, title TEXT, fromuserid INTEGER, message TEXT);
        INSERT INTO vb_pmtext VALUES (10, 'Trip', 1, 'hi'), (11, 'Re: Trip', 2, 'yo'), (12, 'Trip', 1, 'hey');
        CREATE TABLE vb_pm (pmtextid INTEGER, userid INTEGER);
        INSERT INTO vb_pm VALUES (10, 2), (11, 1), (12, 3);
    ";

    const PLAN: &str = r#"
source: vBulletin
required:
  user: [userid, username]
  usergroup: [usergroupid, title]
tables:
  - table: User
    query: SELECT * FROM :_user ORDER BY userid
    mapping:
      userid: UserID
      username: Name
      email: Email
      homepage: varchar(255)
  - table: Role
    query: SELECT * FROM :_usergroup ORDER BY usergroupid
    mapping:
      usergroupid: RoleID
      title: Name
    derive:
      - { Column: CanSession, From: title, Filter: sign_in_permission }
    permissions:
      genericpermissions:
        1024: Garden.SignIn.Allow
  - table: Discussion
    query: SELECT threadid AS DiscussionID, title AS Name FROM :_thread
blobs:
  - name: attachments
    query: SELECT * FROM :_attachment
    payload: filedata
    kind: attachment
conversations:
  messages: SELECT pmtextid AS message_id, title AS subject, fromuserid AS author_id, message FROM :_pmtext
  recipients:
    - SELECT pmtextid AS message_id, userid AS user_id FROM :_pm
  mappings:
    ConversationMessage:
      message: Body
"#;

    fn source() -> SqliteSource {
        let source = SqliteSource::open_in_memory("vb_").unwrap();
        source.connection().execute_batch(FIXTURE).unwrap();
        source
    }

    fn export(source: &SqliteSource, plan: &ExportPlan, options: ExportOptions) -> (ExportFile, ExportReport) {
        let exporter = Exporter::new(source, options);
        let mut writer = ExportWriter::new(Vec::new());
        let report = exporter.write_to(plan, &mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        (ExportReader::parse(&text).unwrap(), report)
    }

    #[test]
    fn test_full_export() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let plan = ExportPlan::from_yaml(PLAN).unwrap();
        let (file, report) = export(&source, &plan, ExportOptions::new(dir.path()));

        assert_eq!(file.source.as_deref(), Some("vBulletin"));
        assert!(report.is_complete(), "{:?}", report.failures);

        let user = file.table("User").unwrap();
        let header: Vec<_> = user.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(header, vec!["UserID", "Name", "Email", "homepage"]);
        assert_eq!(user.columns[3].ty.as_deref(), Some("varchar(255)"));
        assert_eq!(user.column("Name"), vec![Value::from("ann"), Value::from("bob, \"the builder\"")]);
        assert_eq!(user.column("Email")[1], Value::Null);

        let role = file.table("Role").unwrap();
        assert_eq!(role.column("CanSession"), vec![Value::Integer(0), Value::Integer(1)]);
        assert_eq!(role.column("Garden.SignIn.Allow"), vec![Value::Integer(0), Value::Integer(1)]);

        let discussion = file.table("Discussion").unwrap();
        assert!(discussion.rows.is_empty());
        assert!(file.comments.iter().any(|c| c.starts_with("Exported Table: Discussion (0 rows, ")));

        assert_eq!(report.blobs, 1);
        assert_eq!(
            std::fs::read(dir.path().join("attachments/3/1/2/77.attach")).unwrap(),
            vec![0x00, 0xff, 0x10]
        );
        assert!(file.comments.iter().any(|c| c.starts_with("Exported 1 blobs to attachments/ (")));

        assert!(file.comments[0].starts_with("Export Started: "));
        assert!(file.comments.iter().any(|c| c.starts_with("Export Completed: ")));
        assert!(file.comments.last().unwrap().starts_with("Elapsed Time: "));
    }

    #[test]
    fn test_conversation_phase() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let plan = ExportPlan::from_yaml(PLAN).unwrap();
        let (file, _) = export(&source, &plan, ExportOptions::new(dir.path()).with_blobs(false));

        let conversation = file.table("Conversation").unwrap();
        assert_eq!(conversation.column("ConversationID"), vec![Value::Integer(10), Value::Integer(12)]);
        assert_eq!(conversation.column("FirstMessageID"), vec![Value::Integer(10), Value::Integer(12)]);
        assert_eq!(conversation.column("Subject"), vec![Value::from("Trip"), Value::from("Trip")]);

        let messages = file.table("ConversationMessage").unwrap();
        assert_eq!(
            messages.column("ConversationID"),
            vec![Value::Integer(10), Value::Integer(10), Value::Integer(12)]
        );
        assert_eq!(messages.column("Body")[1], Value::from("yo"));

        let members = file.table("UserConversation").unwrap();
        assert_eq!(members.rows.len(), 4);

        assert!(source.table_columns("z_conversation").unwrap().is_none());
        assert!(source.table_columns("z_user_conversation").unwrap().is_none());
    }

    #[test]
    fn test_partial_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let mut plan = ExportPlan::from_yaml(PLAN).unwrap();
        plan.tables[1].query = "SELECT * FROM :_nosuchtable".to_string();

        let (file, report) = export(&source, &plan, ExportOptions::new(dir.path()));

        assert!(file.table("Role").is_none());
        assert!(file.table("User").is_some());
        assert!(file.table("Discussion").is_some());
        assert!(file.table("Conversation").is_some());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].table, "Role");
        let errors: Vec<_> = file.comments.iter().filter(|c| c.starts_with("Error:")).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Error: failed to export Role: "));
    }

    #[test]
    fn test_conversation_failure_continues_run() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let mut plan = ExportPlan::from_yaml(PLAN).unwrap();
        if let Some(queries) = plan.conversations.as_mut() {
            queries.recipients = vec!["SELECT * FROM :_nosuchtable".to_string()];
        }

        let (file, report) = export(&source, &plan, ExportOptions::new(dir.path()));
        assert!(file.table("Conversation").is_none());
        assert_eq!(report.failures[0].table, "conversations");
        assert!(file.comments.last().unwrap().starts_with("Elapsed Time: "));
        assert!(source.table_columns("z_conversation").unwrap().is_none());
    }

    #[test]
    fn test_invalid_table_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let plan = ExportPlan::from_yaml("tables:\n  - table: Thread\n    query: SELECT 1 AS a\n").unwrap();
        let (file, report) = export(&source, &plan, ExportOptions::new(dir.path()));

        assert!(file.tables.is_empty());
        assert!(file
            .comments
            .iter()
            .any(|c| c.starts_with("Error: Thread is not a valid export. The valid tables for export are Activity, ")));
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_table_filter() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let plan = ExportPlan::from_yaml(PLAN).unwrap();
        let options = ExportOptions::new(dir.path()).with_tables(vec!["user".to_string()]);
        let (file, _) = export(&source, &plan, options);
        let names: Vec<_> = file.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["User"]);
    }

    #[test]
    fn test_run_writes_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let plan = ExportPlan::from_yaml(PLAN).unwrap();
        let summary = Exporter::new(&source, ExportOptions::new(dir.path())).run(&plan).unwrap();

        let name = summary.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("export ") && name.ends_with(".txt.gz"), "{name}");
        let file = ExportReader::open(&summary.path).unwrap();
        assert_eq!(file.table("User").unwrap().rows.len(), 2);
    }

    #[test]
    fn test_schema_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let mut plan = ExportPlan::from_yaml(PLAN).unwrap();
        plan.required = plan.required.clone().require("post", ["postid"]).require("user", ["salt"]);
        let out = dir.path().join("out");

        let err = Exporter::new(&source, ExportOptions::new(&out)).run(&plan).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing tables: post"));
        assert!(message.contains("missing columns in user: salt"));
        assert!(!out.exists());
    }

    #[test]
    fn test_blob_values_cannot_leave_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let source = SqliteSource::open_in_memory("vb_").unwrap();
        source
            .connection()
            .execute_batch(
                "CREATE TABLE vb_attachment (attachmentid INTEGER, userid INTEGER, hash TEXT, filedata BLOB);
                 INSERT INTO vb_attachment VALUES (1, 5, '../../escaped', x'01'), (2, 5, 'ok', x'02');",
            )
            .unwrap();
        let plan = ExportPlan::from_yaml(
            "blobs:\n  - name: attachments\n    query: SELECT * FROM :_attachment\n    payload: filedata\n    kind: attachment\n",
        )
        .unwrap();

        let (file, report) = export(&source, &plan, ExportOptions::new(&out));

        assert_eq!(report.blobs, 1);
        assert!(!dir.path().join("escaped.file").exists());
        assert_eq!(std::fs::read(out.join("attachments/ok.file")).unwrap(), vec![0x02]);
        assert!(file.comments.iter().any(|c| c.starts_with("Exported 1 blobs to attachments/ (")));
    }

    #[test]
    fn test_table_without_mapped_columns_stays_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        source
            .connection()
            .execute_batch("CREATE TABLE vb_junk (junk TEXT); INSERT INTO vb_junk VALUES ('a'), ('b'), ('c');")
            .unwrap();
        let plan = ExportPlan::from_yaml(
            "tables:\n  - table: Discussion\n    query: SELECT * FROM :_junk\n  - table: User\n    query: SELECT * FROM :_user ORDER BY userid\n    mapping:\n      userid: UserID\n",
        )
        .unwrap();

        let (file, report) = export(&source, &plan, ExportOptions::new(dir.path()));

        let discussion = file.table("Discussion").unwrap();
        assert!(discussion.columns.is_empty());
        assert!(discussion.rows.is_empty());
        assert_eq!(file.table("User").unwrap().rows.len(), 2);
        assert_eq!(report.tables[0].rows, 0);
        assert!(file
            .comments
            .iter()
            .any(|c| c == "Warning: no column of Discussion maps to the canonical schema, 3 rows dropped"));
        assert!(file.comments.iter().any(|c| c.starts_with("Exported Table: Discussion (0 rows, ")));
    }
}
