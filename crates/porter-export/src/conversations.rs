//! Conversation clustering
//!
//! Private message tables carry no thread identifier. Threads are rebuilt in
//! four passes:
//!
//! 1. the participant set of each message (author plus every recipient),
//!    rendered as ascending ids joined by commas
//! 2. the subject with one leading `Re:` and surrounding whitespace removed
//! 3. messages grouped by (subject, participants); the group id is the
//!    smallest message id in the group
//! 4. the group id attached to every message and every (user, group) pair
//!
//! Passes 1-3 run in memory. The result is written to three scratch tables in
//! the source database so the ordinary table pipeline can join it with the
//! message rows. [`ScratchTables`] drops them again when it goes out of scope.
//!
//! A reply whose subject was edited without keeping the `Re:` prefix starts a
//! new conversation. The prefix match is case-sensitive.

use crate::error::{ExportError, Result};
use crate::mapping::{MappingEntry, MappingSpec};
use crate::source::RowSource;
use crate::value::{Row, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

/// Reply prefix stripped from subjects
pub const REPLY_PREFIX: &str = "Re:";

/// Column names the message and recipient queries must produce
pub const MESSAGE_ID: &str = "message_id";
pub const SUBJECT: &str = "subject";
pub const AUTHOR_ID: &str = "author_id";
pub const USER_ID: &str = "user_id";

pub const CONVERSATION_TABLE: &str = ":_z_conversation";
pub const MESSAGE_TABLE: &str = ":_z_conversation_message";
pub const MEMBERSHIP_TABLE: &str = ":_z_user_conversation";

const SCRATCH_TABLES: [(&str, &str); 3] = [
    (
        CONVERSATION_TABLE,
        "conversation_id INTEGER PRIMARY KEY, normalized_subject TEXT, participants TEXT",
    ),
    (MESSAGE_TABLE, "message_id INTEGER PRIMARY KEY, conversation_id INTEGER"),
    (
        MEMBERSHIP_TABLE,
        "user_id INTEGER, conversation_id INTEGER, PRIMARY KEY (user_id, conversation_id)",
    ),
];

/// Queries that feed clustering, plus per-table mapping overrides
#[derive(Debug, Clone, Default)]
pub struct ConversationQueries {
    /// Produces `message_id`, `subject`, `author_id` and any columns to export
    pub messages: String,
    /// Each produces `message_id`, `user_id`
    pub recipients: Vec<String>,
    /// Destination table -> mapping layered over the defaults
    pub mappings: BTreeMap<String, MappingSpec>,
}

/// One rebuilt conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationGroup {
    pub id: i64,
    pub subject: String,
    pub participants: String,
    pub messages: Vec<i64>,
}

/// Output of the in-memory passes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clustering {
    /// Ordered by group id
    pub groups: Vec<ConversationGroup>,
    /// (message id, group id), ordered by message id
    pub assignments: Vec<(i64, i64)>,
    /// Distinct (user id, group id) pairs
    pub memberships: Vec<(i64, i64)>,
}

impl Clustering {
    pub fn group_of(&self, message_id: i64) -> Option<i64> {
        self.assignments
            .binary_search_by_key(&message_id, |(m, _)| *m)
            .ok()
            .map(|i| self.assignments[i].1)
    }
}

#[derive(Debug, Default)]
struct MessageInfo {
    subject: String,
    participants: BTreeSet<i64>,
}

/// Accumulates messages and recipients, then clusters them
#[derive(Debug, Default)]
pub struct ConversationBuilder {
    messages: BTreeMap<i64, MessageInfo>,
}

impl ConversationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, id: i64, subject: &str, author: Option<i64>) {
        let info = self.messages.entry(id).or_default();
        info.subject = subject.to_string();
        info.participants.extend(author);
    }

    /// Add a recipient. Recipients of unknown messages are ignored.
    pub fn add_participant(&mut self, message_id: i64, user_id: i64) {
        if let Some(info) = self.messages.get_mut(&message_id) {
            info.participants.insert(user_id);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn build(self) -> Clustering {
        let mut partitions: BTreeMap<(String, String), Vec<i64>> = BTreeMap::new();
        let mut participants_of = BTreeMap::new();

        // messages iterate in ascending id order, so each partition's first id is its minimum
        for (id, info) in self.messages {
            let key = (normalize_subject(&info.subject), participant_key(&info.participants));
            partitions.entry(key).or_default().push(id);
            participants_of.insert(id, info.participants);
        }

        let mut groups = Vec::with_capacity(partitions.len());
        let mut assignments = Vec::new();
        let mut memberships = BTreeSet::new();
        for ((subject, participants), messages) in partitions {
            let Some(&id) = messages.first() else {
                continue;
            };
            for message in &messages {
                assignments.push((*message, id));
                if let Some(users) = participants_of.get(message) {
                    memberships.extend(users.iter().map(|user| (*user, id)));
                }
            }
            groups.push(ConversationGroup {
                id,
                subject,
                participants,
                messages,
            });
        }

        groups.sort_by_key(|g| g.id);
        assignments.sort_unstable();
        Clustering {
            groups,
            assignments,
            memberships: memberships.into_iter().collect(),
        }
    }
}

/// Strip surrounding whitespace and at most one leading `Re:`.
///
/// Only the exact English prefix is recognised, so localized or nested reply
/// prefixes end up in their own conversation. Existing imports depend on this
/// grouping.
pub fn normalize_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    trimmed
        .strip_prefix(REPLY_PREFIX)
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Ascending ids joined by commas
pub fn participant_key(participants: &BTreeSet<i64>) -> String {
    participants
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Stream the message and recipient queries into a builder
#[instrument(skip_all)]
pub fn collect<S: RowSource + ?Sized>(source: &S, queries: &ConversationQueries) -> Result<ConversationBuilder> {
    let mut builder = ConversationBuilder::new();

    source.query(&queries.messages, &mut |row| {
        let id = required_id(row, MESSAGE_ID)?;
        let subject = row.get(SUBJECT).and_then(Value::as_text).unwrap_or_default();
        let author = row.get(AUTHOR_ID).and_then(Value::as_i64);
        builder.add_message(id, &subject, author);
        Ok(())
    })?;

    for sql in &queries.recipients {
        source.query(sql, &mut |row| {
            let message = required_id(row, MESSAGE_ID)?;
            if let Some(user) = row.get(USER_ID).and_then(Value::as_i64) {
                builder.add_participant(message, user);
            }
            Ok(())
        })?;
    }

    debug!(messages = builder.len(), "Collected messages");
    Ok(builder)
}

fn required_id(row: &Row, column: &str) -> Result<i64> {
    row.get(column).and_then(Value::as_i64).ok_or_else(|| {
        ExportError::source_unavailable("conversations", format!("row without numeric {}", column))
    })
}

/// Scratch tables holding a clustering, dropped when the guard goes away
pub struct ScratchTables<'a, S: RowSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: RowSource + ?Sized> ScratchTables<'a, S> {
    /// Create empty scratch tables, replacing any left behind by an earlier run
    pub fn create(source: &'a S) -> Result<Self> {
        let guard = Self { source };
        for (table, columns) in SCRATCH_TABLES {
            source.execute(&format!("DROP TABLE IF EXISTS {}", table), &[])?;
            source.execute(&format!("CREATE TABLE {} ({})", table, columns), &[])?;
        }
        Ok(guard)
    }

    pub fn fill(&self, clustering: &Clustering) -> Result<()> {
        let groups: Vec<Vec<Value>> = clustering
            .groups
            .iter()
            .map(|g| {
                vec![
                    Value::Integer(g.id),
                    Value::Text(g.subject.clone()),
                    Value::Text(g.participants.clone()),
                ]
            })
            .collect();
        self.source.execute_batch(
            &format!(
                "INSERT INTO {} (conversation_id, normalized_subject, participants) VALUES (?1, ?2, ?3)",
                CONVERSATION_TABLE
            ),
            &groups,
        )?;

        let pairs = |pairs: &[(i64, i64)]| -> Vec<Vec<Value>> {
            pairs
                .iter()
                .map(|(a, b)| vec![Value::Integer(*a), Value::Integer(*b)])
                .collect()
        };
        self.source.execute_batch(
            &format!("INSERT INTO {} (message_id, conversation_id) VALUES (?1, ?2)", MESSAGE_TABLE),
            &pairs(&clustering.assignments),
        )?;
        self.source.execute_batch(
            &format!("INSERT INTO {} (user_id, conversation_id) VALUES (?1, ?2)", MEMBERSHIP_TABLE),
            &pairs(&clustering.memberships),
        )?;

        info!(
            conversations = clustering.groups.len(),
            messages = clustering.assignments.len(),
            "Conversations clustered"
        );
        Ok(())
    }
}

impl<S: RowSource + ?Sized> Drop for ScratchTables<'_, S> {
    fn drop(&mut self) {
        for (table, _) in SCRATCH_TABLES {
            if let Err(e) = self.source.execute(&format!("DROP TABLE IF EXISTS {}", table), &[]) {
                warn!(table, error = %e, "Failed to drop scratch table");
            }
        }
    }
}

/// One destination table fed from the scratch tables
#[derive(Debug, Clone)]
pub struct ConversationExport {
    pub table: &'static str,
    pub sql: String,
    pub mapping: MappingSpec,
}

/// The Conversation, ConversationMessage and UserConversation exports
pub fn export_queries(queries: &ConversationQueries) -> Vec<ConversationExport> {
    let messages = queries.messages.trim().trim_end_matches(';');
    let direct = |target: &str| MappingEntry::Direct(target.to_string());

    let exports = [
        (
            "Conversation",
            format!(
                "SELECT c.conversation_id, c.normalized_subject, m.* FROM {} c \
                 JOIN ({}) m ON m.message_id = c.conversation_id ORDER BY c.conversation_id",
                CONVERSATION_TABLE, messages
            ),
            MappingSpec::new()
                .with("conversation_id", direct("ConversationID"))
                .with(MESSAGE_ID, direct("FirstMessageID"))
                .with(AUTHOR_ID, direct("InsertUserID"))
                .with(
                    "normalized_subject",
                    MappingEntry::Rule {
                        name: "Subject".to_string(),
                        ty: Some("varchar(250)".to_string()),
                        transform: None,
                    },
                ),
        ),
        (
            "ConversationMessage",
            format!(
                "SELECT cm.conversation_id, m.* FROM {} cm \
                 JOIN ({}) m ON m.message_id = cm.message_id ORDER BY cm.message_id",
                MESSAGE_TABLE, messages
            ),
            MappingSpec::new()
                .with(MESSAGE_ID, direct("MessageID"))
                .with("conversation_id", direct("ConversationID"))
                .with(AUTHOR_ID, direct("InsertUserID")),
        ),
        (
            "UserConversation",
            format!(
                "SELECT uc.user_id, uc.conversation_id, MAX(cm.message_id) AS last_message_id \
                 FROM {} uc JOIN {} cm ON cm.conversation_id = uc.conversation_id \
                 GROUP BY uc.user_id, uc.conversation_id ORDER BY uc.conversation_id, uc.user_id",
                MEMBERSHIP_TABLE, MESSAGE_TABLE
            ),
            MappingSpec::new()
                .with(USER_ID, direct("UserID"))
                .with("conversation_id", direct("ConversationID"))
                .with("last_message_id", direct("LastMessageID")),
        ),
    ];

    exports
        .into_iter()
        .map(|(table, sql, mut mapping)| {
            if let Some(overlay) = queries.mappings.get(table) {
                mapping.merge(overlay);
            }
            ConversationExport { table, sql, mapping }
        })
        .collect()
}
