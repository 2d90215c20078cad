//! End-to-end tests for the porter binary
//!
//! These tests build a small vBulletin-shaped SQLite database and validate:
//! - Export to a gzip file that reads back through the export reader
//! - Pre-flight failures exiting non-zero without writing output
//! - Schema listing
//! - Inspecting an existing export

use assert_cmd::Command;
use porter_export::reader::ExportReader;
use porter_export::Value;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FIXTURE: &str = "
    CREATE TABLE vb_user (userid INTEGER, username TEXT, email TEXT);
    INSERT INTO vb_user VALUES (1, 'ann', 'ann@example.com'), (2, 'bob', NULL);
    CREATE TABLE vb_usergroup (usergroupid INTEGER, title TEXT, genericpermissions INTEGER);
    INSERT INTO vb_usergroup VALUES (1, 'Guests', 0), (2, 'Registered Users', 1026);
    CREATE TABLE vb_pmtext (pmtextid INTEGER, title TEXT, fromuserid INTEGER, message TEXT);
    INSERT INTO vb_pmtext VALUES (10, 'Trip', 1, 'hi'), (11, 'Re: Trip', 2, 'yo');
    CREATE TABLE vb_pm (pmtextid INTEGER, userid INTEGER);
    INSERT INTO vb_pm VALUES (10, 2), (11, 1);
";

const PLAN: &str = r#"
source: vBulletin
prefix: vb_
required:
  user: [userid, username, email]
  usergroup: [usergroupid, title]
tables:
  - table: User
    query: SELECT * FROM :_user ORDER BY userid
    mapping:
      userid: UserID
      username: Name
      email: Email
  - table: Role
    query: SELECT * FROM :_usergroup ORDER BY usergroupid
    mapping:
      usergroupid: RoleID
      title: Name
    permissions:
      genericpermissions:
        1024: Garden.SignIn.Allow
conversations:
  messages: SELECT pmtextid AS message_id, title AS subject, fromuserid AS author_id, message FROM :_pmtext
  recipients:
    - SELECT pmtextid AS message_id, userid AS user_id FROM :_pm
  mappings:
    ConversationMessage:
      message: Body
"#;

/// Fixture database plus plan in a temporary directory
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let conn = rusqlite::Connection::open(dir.path().join("forum.db")).unwrap();
        conn.execute_batch(FIXTURE).unwrap();
        std::fs::write(dir.path().join("plan.yml"), PLAN).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn porter(&self) -> Command {
        let mut cmd = Command::cargo_bin("porter").unwrap();
        cmd.current_dir(self.dir.path())
            .env_remove("PORTER_OUTPUT_DIR")
            .env_remove("PORTER_TABLE_PREFIX")
            .env_remove("PORTER_COMPRESS")
            .env_remove("PORTER_TIME_LIMIT_SECS");
        cmd
    }

    fn export_to(&self, output: &Path) -> Command {
        let mut cmd = self.porter();
        cmd.arg("export")
            .arg("--plan")
            .arg(self.path("plan.yml"))
            .arg("--source")
            .arg(self.path("forum.db"))
            .arg("--output")
            .arg(output);
        cmd
    }
}

// ============================================================================
// Export Tests
// ============================================================================

#[test]
fn test_export_writes_readable_gzip() {
    let ws = Workspace::new();
    let output = ws.path("out/export.txt.gz");

    ws.export_to(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Export Summary"))
        .stdout(predicate::str::contains("User"));

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    let file = ExportReader::open(&output).unwrap();
    assert_eq!(file.version, "1.0");
    assert_eq!(file.source.as_deref(), Some("vBulletin"));

    let user = file.table("User").unwrap();
    assert_eq!(user.column("Name"), vec![Value::from("ann"), Value::from("bob")]);
    assert_eq!(user.column("Email")[1], Value::Null);

    let role = file.table("Role").unwrap();
    assert_eq!(role.column("Garden.SignIn.Allow"), vec![Value::Integer(0), Value::Integer(1)]);

    let conversation = file.table("Conversation").unwrap();
    assert_eq!(conversation.column("ConversationID"), vec![Value::Integer(10)]);
    assert!(file.table("ConversationMessage").is_some());
    assert!(file.table("UserConversation").is_some());
}

#[test]
fn test_export_default_name_uncompressed() {
    let ws = Workspace::new();
    let out_dir = ws.path("exports");

    ws.porter()
        .arg("export")
        .arg("--plan")
        .arg(ws.path("plan.yml"))
        .arg("--source")
        .arg(ws.path("forum.db"))
        .arg("--output-dir")
        .arg(&out_dir)
        .arg("--no-compress")
        .arg("--tables")
        .arg("User")
        .arg("--skip-conversations")
        .assert()
        .success();

    let files: Vec<PathBuf> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);

    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("export "), "{}", name);
    assert!(name.ends_with(".txt"), "{}", name);

    let text = std::fs::read_to_string(&files[0]).unwrap();
    assert!(text.starts_with("Vanilla Export: 1.0, Source: vBulletin\n\n"));

    let file = ExportReader::parse(&text).unwrap();
    let names: Vec<&str> = file.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["User"]);
}

#[test]
fn test_export_prefix_from_environment() {
    let ws = Workspace::new();
    let output = ws.path("export.txt");

    // A wrong prefix means the required tables are not found
    ws.export_to(&output)
        .env("PORTER_TABLE_PREFIX", "phpbb_")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing tables"));
    assert!(!output.exists());

    // The flag overrides the environment
    ws.export_to(&output)
        .env("PORTER_TABLE_PREFIX", "phpbb_")
        .arg("--prefix")
        .arg("vb_")
        .arg("--no-compress")
        .assert()
        .success();
    assert!(output.exists());
}

#[test]
fn test_export_missing_source() {
    let ws = Workspace::new();

    ws.porter()
        .arg("export")
        .arg("--plan")
        .arg(ws.path("plan.yml"))
        .arg("--source")
        .arg(ws.path("missing.db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));

    assert!(!ws.path("missing.db").exists());
}

#[test]
fn test_export_invalid_plan() {
    let ws = Workspace::new();
    std::fs::write(ws.path("bad.yml"), "tables:\n  - table: User\n    query: SELECT 1\n    bogus: true\n").unwrap();

    ws.porter()
        .arg("export")
        .arg("--plan")
        .arg(ws.path("bad.yml"))
        .arg("--source")
        .arg(ws.path("forum.db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid export plan"));
}

// ============================================================================
// Verify Tests
// ============================================================================

#[test]
fn test_verify_success() {
    let ws = Workspace::new();

    ws.porter()
        .arg("verify")
        .arg("--plan")
        .arg(ws.path("plan.yml"))
        .arg("--source")
        .arg(ws.path("forum.db"))
        .assert()
        .success()
        .stdout(predicate::str::contains("2 tables, 5 columns checked"));
}

#[test]
fn test_verify_mismatch_names_everything_missing() {
    let ws = Workspace::new();
    let conn = rusqlite::Connection::open(ws.path("forum.db")).unwrap();
    conn.execute_batch("DROP TABLE vb_usergroup; ALTER TABLE vb_user DROP COLUMN email;")
        .unwrap();
    drop(conn);

    ws.porter()
        .arg("verify")
        .arg("--plan")
        .arg(ws.path("plan.yml"))
        .arg("--source")
        .arg(ws.path("forum.db"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("usergroup"))
        .stderr(predicate::str::contains("email"));
}

// ============================================================================
// Schema and Inspect Tests
// ============================================================================

#[test]
fn test_schema_single_table() {
    let ws = Workspace::new();

    ws.porter()
        .arg("schema")
        .arg("--table")
        .arg("UserRole")
        .assert()
        .success()
        .stdout(predicate::str::contains("UserID"))
        .stdout(predicate::str::contains("RoleID"));
}

#[test]
fn test_schema_json() {
    let ws = Workspace::new();

    let output = ws.porter().arg("schema").arg("--json").output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tables = value.as_array().unwrap();
    assert!(tables.iter().any(|t| t["table"] == "Discussion"));
}

#[test]
fn test_schema_unknown_table() {
    let ws = Workspace::new();

    ws.porter()
        .arg("schema")
        .arg("--table")
        .arg("Forum")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown table"));
}

#[test]
fn test_inspect_export() {
    let ws = Workspace::new();
    let output = ws.path("export.txt.gz");
    ws.export_to(&output).assert().success();

    ws.porter()
        .arg("inspect")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("vBulletin"))
        .stdout(predicate::str::contains("Role"))
        .stdout(predicate::str::contains("Export Started"));

    ws.porter()
        .arg("inspect")
        .arg(&output)
        .arg("--table")
        .arg("user")
        .assert()
        .success()
        .stdout(predicate::str::contains("ann@example.com"))
        .stdout(predicate::str::contains("NULL"));
}

#[test]
fn test_no_subcommand() {
    Command::cargo_bin("porter").unwrap().assert().failure().code(2);
}
