//! Blob extraction
//!
//! Binary columns (attachments, custom avatars) are written to files beneath the
//! export directory. Only the relative path ever enters the export text.
//!
//! Attachment paths follow one of two layouts, chosen per record:
//!
//! - fanout: one directory per digit of the owner id, `attachments/3/1/2/77.attach`
//! - legacy: a content hash directly under the root, `attachments/abc123.file`
//!
//! A record with a non-empty hash always uses the legacy layout. Two records that
//! resolve to the same path overwrite each other; the last write wins.

use crate::error::Result;
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// Top-level directory for attachment files
pub const ATTACHMENT_ROOT: &str = "attachments";

/// Top-level directory for avatar images, sibling of [`ATTACHMENT_ROOT`]
pub const AVATAR_ROOT: &str = "customavatars";

/// Extension of fanout attachment files
pub const FANOUT_EXTENSION: &str = "attach";

/// Extension of legacy hash-named attachment files
pub const LEGACY_EXTENSION: &str = "file";

/// Avatars are bucketed into this many directories by user id
const AVATAR_BUCKETS: i64 = 100;

/// Which attachment layout a record resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPolicy {
    Fanout { owner_id: u64, identity: String },
    Legacy { hash: String },
}

impl PathPolicy {
    /// Pick the layout for one row. `None` when the row carries neither a hash
    /// nor a usable owner id and identity, or when the hash or identity is not a
    /// plain file name.
    pub fn select(row: &Row, columns: &AttachmentColumns) -> Option<Self> {
        if let Some(hash) = row.get(&columns.hash).filter(|v| !v.is_blank()) {
            return hash
                .as_text()
                .filter(|hash| is_plain_name(hash))
                .map(|hash| PathPolicy::Legacy { hash });
        }

        let owner_id = row
            .get(&columns.owner)
            .and_then(Value::as_i64)
            .and_then(|id| u64::try_from(id).ok())?;
        let identity = columns
            .identity
            .iter()
            .filter_map(|column| row.get(column))
            .find(|value| !value.is_blank())
            .and_then(Value::as_text)
            .filter(|identity| is_plain_name(identity))?;

        Some(PathPolicy::Fanout { owner_id, identity })
    }

    /// Relative path of the file, `/`-separated
    pub fn path(&self) -> String {
        match self {
            PathPolicy::Fanout { owner_id, identity } => fanout_path(*owner_id, identity),
            PathPolicy::Legacy { hash } => legacy_path(hash),
        }
    }
}

/// A single path segment: not empty, no separators, no `..`
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0']) && !name.contains("..")
}

/// True when `path` stays beneath the directory it is joined onto
fn is_contained(path: &str) -> bool {
    !path.contains('\\')
        && Path::new(path)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// `attachments/<d>/<d>/.../<identity>.attach`, one directory per digit of `owner_id`
pub fn fanout_path(owner_id: u64, identity: &str) -> String {
    let digits = owner_id.to_string();
    let mut path = String::with_capacity(ATTACHMENT_ROOT.len() + digits.len() * 2 + identity.len() + 8);
    path.push_str(ATTACHMENT_ROOT);
    for digit in digits.chars() {
        path.push('/');
        path.push(digit);
    }
    path.push('/');
    path.push_str(identity);
    path.push('.');
    path.push_str(FANOUT_EXTENSION);
    path
}

/// `attachments/<hash>.file`
pub fn legacy_path(hash: &str) -> String {
    format!("{}/{}.{}", ATTACHMENT_ROOT, hash, LEGACY_EXTENSION)
}

/// `customavatars/<user_id % 100>/avatar_<user_id><ext>`
///
/// `<ext>` is the source file name's extension including the dot, or nothing.
pub fn avatar_path(user_id: i64, filename: &str) -> String {
    let extension = filename
        .rfind('.')
        .map(|i| &filename[i..])
        .filter(|ext| is_plain_name(ext))
        .unwrap_or("");
    format!(
        "{}/{}/avatar_{}{}",
        AVATAR_ROOT,
        user_id.rem_euclid(AVATAR_BUCKETS),
        user_id,
        extension
    )
}

/// Columns that identify an attachment on a source row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentColumns {
    /// Numeric id of the uploading user, exploded into directories
    pub owner: String,
    /// Candidate identity columns, first non-empty wins
    pub identity: Vec<String>,
    /// Precomputed content hash selecting the legacy layout
    pub hash: String,
}

impl Default for AttachmentColumns {
    fn default() -> Self {
        Self {
            owner: "userid".to_string(),
            identity: vec!["filedataid".to_string(), "attachmentid".to_string()],
            hash: "hash".to_string(),
        }
    }
}

/// Columns that identify a custom avatar on a source row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarColumns {
    pub user: String,
    pub filename: String,
}

impl Default for AvatarColumns {
    fn default() -> Self {
        Self {
            user: "userid".to_string(),
            filename: "filename".to_string(),
        }
    }
}

/// Kind of binary payload, with the columns its path is computed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlobKind {
    Attachment(AttachmentColumns),
    Avatar(AvatarColumns),
}

impl BlobKind {
    /// Root directory this kind writes beneath
    pub fn root(&self) -> &'static str {
        match self {
            BlobKind::Attachment(_) => ATTACHMENT_ROOT,
            BlobKind::Avatar(_) => AVATAR_ROOT,
        }
    }

    /// Relative destination path for a row, if it can be computed
    pub fn path_for(&self, row: &Row) -> Option<String> {
        match self {
            BlobKind::Attachment(columns) => PathPolicy::select(row, columns).map(|p| p.path()),
            BlobKind::Avatar(columns) => {
                let user_id = row.get(&columns.user).and_then(Value::as_i64)?;
                let filename = row
                    .get(&columns.filename)
                    .and_then(Value::as_text)
                    .unwrap_or_default();
                Some(avatar_path(user_id, &filename))
            },
        }
    }
}

/// A payload and where it goes
#[derive(Debug, Clone, PartialEq)]
pub struct BlobRecord {
    pub path: String,
    pub payload: Vec<u8>,
}

impl BlobRecord {
    /// Build a record from a row. `None` for a NULL payload or an unplaceable
    /// row, including one whose path would leave the blob root.
    pub fn from_row(row: &Row, payload_column: &str, kind: &BlobKind) -> Option<Self> {
        let payload = match row.get(payload_column)? {
            Value::Blob(bytes) => bytes.clone(),
            Value::Text(text) => text.clone().into_bytes(),
            _ => return None,
        };
        let Some(path) = kind.path_for(row).filter(|path| is_contained(path)) else {
            debug!(root = kind.root(), "Skipping blob without a safe path");
            return None;
        };
        Some(Self { path, payload })
    }
}

/// Writes blob payloads under an export directory
#[derive(Debug, Clone)]
pub struct BlobExtractor {
    base: PathBuf,
}

impl BlobExtractor {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Write one payload, creating directories as needed. Bytes are written
    /// unchanged; an existing file at the same path is replaced.
    pub fn write(&self, record: &BlobRecord) -> Result<PathBuf> {
        let target = self.base.join(&record.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &record.payload)?;
        trace!(path = %record.path, bytes = record.payload.len(), "Wrote blob");
        Ok(target)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn attachment_row(userid: i64, attachmentid: i64) -> Row {
        Row::new().with("userid", userid).with("attachmentid", attachmentid)
    }

    #[test]
    fn test_fanout_path() {
        assert_eq!(fanout_path(312, "77"), "attachments/3/1/2/77.attach");
        assert_eq!(fanout_path(0, "5"), "attachments/0/5.attach");
    }

    #[test]
    fn test_legacy_path_ignores_owner() {
        let row = attachment_row(312, 77).with("hash", "abc123");
        let policy = PathPolicy::select(&row, &AttachmentColumns::default()).unwrap();
        assert_eq!(policy, PathPolicy::Legacy { hash: "abc123".to_string() });
        assert_eq!(policy.path(), "attachments/abc123.file");
    }

    #[test]
    fn test_policy_is_chosen_per_record() {
        let columns = AttachmentColumns::default();
        let fanout = attachment_row(312, 77).with("hash", "");
        let null_hash = attachment_row(45, 9).with("hash", Value::Null);
        let legacy = attachment_row(45, 9).with("hash", "ffee");

        assert_eq!(
            PathPolicy::select(&fanout, &columns).unwrap().path(),
            "attachments/3/1/2/77.attach"
        );
        assert_eq!(
            PathPolicy::select(&null_hash, &columns).unwrap().path(),
            "attachments/4/5/9.attach"
        );
        assert_eq!(
            PathPolicy::select(&legacy, &columns).unwrap().path(),
            "attachments/ffee.file"
        );
    }

    #[test]
    fn test_identity_prefers_filedataid() {
        let row = attachment_row(7, 1).with("filedataid", 500);
        assert_eq!(
            BlobKind::Attachment(AttachmentColumns::default()).path_for(&row).unwrap(),
            "attachments/7/500.attach"
        );
    }

    #[test]
    fn test_unplaceable_rows() {
        let columns = AttachmentColumns::default();
        assert!(PathPolicy::select(&Row::new().with("attachmentid", 3), &columns).is_none());
        assert!(PathPolicy::select(&attachment_row(-4, 3), &columns).is_none());
    }

    #[test]
    fn test_avatar_path() {
        assert_eq!(avatar_path(1234, "me.png"), "customavatars/34/avatar_1234.png");
        assert_eq!(avatar_path(7, "noext"), "customavatars/7/avatar_7");
        assert_eq!(avatar_path(100, "a.b.jpg"), "customavatars/0/avatar_100.jpg");
    }

    #[test]
    fn test_extractor_writes_bytes_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = BlobExtractor::new(dir.path());
        let row = attachment_row(312, 77).with("filedata", Value::Blob(vec![0, 159, 146, 150]));
        let kind = BlobKind::Attachment(AttachmentColumns::default());

        let record = BlobRecord::from_row(&row, "filedata", &kind).unwrap();
        let written = extractor.write(&record).unwrap();

        assert_eq!(written, dir.path().join("attachments/3/1/2/77.attach"));
        assert_eq!(std::fs::read(written).unwrap(), vec![0, 159, 146, 150]);
    }

    #[test]
    fn test_path_collision_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = BlobExtractor::new(dir.path());
        let first = BlobRecord { path: legacy_path("same"), payload: b"first".to_vec() };
        let second = BlobRecord { path: legacy_path("same"), payload: b"second".to_vec() };

        extractor.write(&first).unwrap();
        let path = extractor.write(&second).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"second");
    }

    #[test]
    fn test_null_payload_is_skipped() {
        let row = attachment_row(1, 2).with("filedata", Value::Null);
        let kind = BlobKind::Attachment(AttachmentColumns::default());
        assert!(BlobRecord::from_row(&row, "filedata", &kind).is_none());
    }

    #[test]
    fn test_traversal_values_are_skipped() {
        let kind = BlobKind::Attachment(AttachmentColumns::default());
        let escaping_hash = attachment_row(1, 2)
            .with("hash", "../../escaped")
            .with("filedata", Value::Blob(vec![1]));
        let escaping_identity = Row::new()
            .with("userid", 5)
            .with("filedataid", "../../../etc/x")
            .with("filedata", Value::Blob(vec![1]));
        let separator_hash = attachment_row(1, 2).with("hash", "a\\b").with("filedata", Value::Blob(vec![1]));

        assert!(PathPolicy::select(&escaping_hash, &AttachmentColumns::default()).is_none());
        assert!(BlobRecord::from_row(&escaping_hash, "filedata", &kind).is_none());
        assert!(BlobRecord::from_row(&escaping_identity, "filedata", &kind).is_none());
        assert!(BlobRecord::from_row(&separator_hash, "filedata", &kind).is_none());
    }

    #[test]
    fn test_avatar_extension_cannot_add_directories() {
        assert_eq!(avatar_path(7, "x./../../up"), "customavatars/7/avatar_7");
        assert_eq!(avatar_path(7, "photo.gif"), "customavatars/7/avatar_7.gif");
    }

    #[test]
    fn test_plain_names() {
        assert!(is_plain_name("abc123"));
        assert!(is_plain_name(".png"));
        assert!(!is_plain_name(""));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name("a\\b"));
        assert!(is_contained("attachments/3/77.attach"));
        assert!(!is_contained("attachments/../../x.file"));
        assert!(!is_contained("/etc/passwd"));
    }
}
