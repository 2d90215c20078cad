//! Canonical target schema
//!
//! Every export is reconciled into these tables. Column order here is the order
//! columns are written in, regardless of the order a source query returns them.

use std::sync::LazyLock;

/// Column type tag as understood by the importer (MySQL type syntax)
pub type ColumnType = &'static str;

/// One canonical table: name plus ordered columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: Vec<(&'static str, ColumnType)>,
}

impl TableSchema {
    fn new(name: &'static str, columns: &[(&'static str, ColumnType)]) -> Self {
        Self {
            name,
            columns: columns.to_vec(),
        }
    }

    /// Canonical type of a column, if the column belongs to this table
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, ty)| *ty)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_type(column).is_some()
    }

    /// Position of a column in canonical order
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|(name, _)| *name == column)
    }
}

/// The immutable registry of canonical tables
#[derive(Debug)]
pub struct CanonicalSchema {
    tables: Vec<TableSchema>,
}

impl CanonicalSchema {
    /// The process-wide canonical schema
    pub fn get() -> &'static CanonicalSchema {
        &CANONICAL
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }
}

static CANONICAL: LazyLock<CanonicalSchema> = LazyLock::new(|| CanonicalSchema {
    tables: vec![
        TableSchema::new(
            "Activity",
            &[
                ("ActivityUserID", "int"),
                ("RegardingUserID", "int"),
                ("ActivityType", "varchar(20)"),
                ("HeadlineFormat", "varchar(255)"),
                ("Story", "text"),
                ("NotifyUserID", "int"),
                ("InsertUserID", "int"),
                ("InsertIPAddress", "varchar(15)"),
                ("DateInserted", "datetime"),
            ],
        ),
        TableSchema::new(
            "Category",
            &[
                ("CategoryID", "int"),
                ("Name", "varchar(30)"),
                ("Description", "varchar(250)"),
                ("ParentCategoryID", "int"),
                ("DateInserted", "datetime"),
                ("InsertUserID", "int"),
                ("DateUpdated", "datetime"),
                ("UpdateUserID", "int"),
            ],
        ),
        TableSchema::new(
            "Comment",
            &[
                ("CommentID", "int"),
                ("DiscussionID", "int"),
                ("DateInserted", "datetime"),
                ("InsertUserID", "int"),
                ("InsertIPAddress", "varchar(15)"),
                ("DateUpdated", "datetime"),
                ("UpdateUserID", "int"),
                ("Format", "varchar(20)"),
                ("Body", "text"),
                ("Score", "float"),
            ],
        ),
        TableSchema::new(
            "Conversation",
            &[
                ("ConversationID", "int"),
                ("FirstMessageID", "int"),
                ("DateInserted", "datetime"),
                ("InsertUserID", "int"),
                ("DateUpdated", "datetime"),
                ("UpdateUserID", "int"),
            ],
        ),
        TableSchema::new(
            "ConversationMessage",
            &[
                ("MessageID", "int"),
                ("ConversationID", "int"),
                ("Body", "text"),
                ("Format", "varchar(20)"),
                ("InsertUserID", "int"),
                ("DateInserted", "datetime"),
            ],
        ),
        TableSchema::new(
            "Discussion",
            &[
                ("DiscussionID", "int"),
                ("Name", "varchar(100)"),
                ("Body", "text"),
                ("Format", "varchar(20)"),
                ("CategoryID", "int"),
                ("DateInserted", "datetime"),
                ("InsertUserID", "int"),
                ("InsertIPAddress", "varchar(15)"),
                ("DateUpdated", "datetime"),
                ("UpdateUserID", "int"),
                ("DateLastComment", "datetime"),
                ("CountComments", "int"),
                ("CountViews", "int"),
                ("Score", "float"),
                ("Closed", "tinyint"),
                ("Announce", "tinyint"),
            ],
        ),
        TableSchema::new(
            "Media",
            &[
                ("MediaID", "int"),
                ("Name", "varchar(255)"),
                ("Type", "varchar(128)"),
                ("Size", "int"),
                ("StorageMethod", "varchar(24)"),
                ("Path", "varchar(255)"),
                ("InsertUserID", "int"),
                ("DateInserted", "datetime"),
                ("ForeignID", "int"),
                ("ForeignTable", "varchar(24)"),
                ("ImageWidth", "int"),
                ("ImageHeight", "int"),
            ],
        ),
        TableSchema::new(
            "Permission",
            &[
                ("RoleID", "int"),
                ("JunctionTable", "varchar(100)"),
                ("JunctionColumn", "varchar(100)"),
                ("JunctionID", "int"),
            ],
        ),
        TableSchema::new(
            "Role",
            &[
                ("RoleID", "int"),
                ("Name", "varchar(100)"),
                ("Description", "varchar(200)"),
                ("CanSession", "tinyint"),
            ],
        ),
        TableSchema::new(
            "User",
            &[
                ("UserID", "int"),
                ("Name", "varchar(20)"),
                ("Email", "varchar(200)"),
                ("Password", "varbinary(100)"),
                ("HashMethod", "varchar(10)"),
                ("Photo", "varchar(255)"),
                ("Score", "float"),
                ("InviteUserID", "int"),
                ("HourOffset", "int"),
                ("CountDiscussions", "int"),
                ("CountComments", "int"),
                ("Banned", "tinyint"),
                ("LastIPAddress", "varchar(15)"),
                ("DateOfBirth", "datetime"),
                ("DateFirstVisit", "datetime"),
                ("DateLastActive", "datetime"),
                ("DateInserted", "datetime"),
                ("DateUpdated", "datetime"),
            ],
        ),
        TableSchema::new(
            "UserConversation",
            &[
                ("UserID", "int"),
                ("ConversationID", "int"),
                ("LastMessageID", "int"),
            ],
        ),
        TableSchema::new(
            "UserDiscussion",
            &[
                ("UserID", "int"),
                ("DiscussionID", "int"),
                ("Bookmarked", "tinyint"),
                ("DateLastViewed", "datetime"),
                ("CountComments", "int"),
            ],
        ),
        TableSchema::new(
            "UserMeta",
            &[("UserID", "int"), ("Name", "varchar(255)"), ("Value", "text")],
        ),
        TableSchema::new("UserRole", &[("UserID", "int"), ("RoleID", "int")]),
    ],
});

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let schema = CanonicalSchema::get();
        let user = schema.table("User").unwrap();
        assert_eq!(user.column_type("UserID"), Some("int"));
        assert_eq!(user.column_type("Name"), Some("varchar(20)"));
        assert!(!user.has_column("userid"));
        assert_eq!(user.position("UserID"), Some(0));
        assert!(schema.table("Thread").is_none());
    }

    #[test]
    fn test_table_and_column_names_are_unique() {
        let schema = CanonicalSchema::get();
        let mut names = schema.table_names();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);

        for table in schema.tables() {
            let mut cols: Vec<_> = table.columns.iter().map(|(c, _)| *c).collect();
            let before = cols.len();
            cols.sort_unstable();
            cols.dedup();
            assert_eq!(cols.len(), before, "duplicate column in {}", table.name);
        }
    }
}
