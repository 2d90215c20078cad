//! Row sources
//!
//! The engine never opens database connections itself. It talks to a
//! [`RowSource`], which streams query results one row at a time and can run the
//! handful of write statements conversation clustering needs.

use crate::error::Result;
use crate::value::{Row, Value};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tracing::{debug, instrument};

/// Placeholder in plan SQL that is replaced with the table prefix
pub const PREFIX_PLACEHOLDER: &str = ":_";

/// Callback receiving each streamed row
pub type RowCallback<'a> = dyn FnMut(&Row) -> Result<()> + 'a;

/// Database collaborator used by the exporter (dependency injection)
pub trait RowSource {
    /// Run a read query and hand every row to `on_row`, in order. Stops at the
    /// first callback error. Returns the number of rows streamed.
    fn query(&self, sql: &str, on_row: &mut RowCallback<'_>) -> Result<u64>;

    /// Run a write or DDL statement with positional parameters
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Run one statement for each parameter set. Sources that support
    /// transactions should group the batch into one.
    fn execute_batch(&self, sql: &str, rows: &[Vec<Value>]) -> Result<usize> {
        let mut changed = 0;
        for params in rows {
            changed += self.execute(sql, params)?;
        }
        Ok(changed)
    }

    /// Column names of a table, `None` when the table does not exist. The
    /// name is given without prefix.
    fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>>;

    /// Human readable name for the banner
    fn label(&self) -> String {
        String::new()
    }
}

/// SQLite row source
pub struct SqliteSource {
    conn: Connection,
    prefix: String,
    label: String,
}

impl SqliteSource {
    /// Open a database file. `prefix` replaces `:_` in every statement.
    pub fn open(path: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_connection(conn, prefix).with_label(label))
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory(prefix: impl Into<String>) -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, prefix))
    }

    pub fn from_connection(conn: Connection, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            label: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Expand the prefix placeholder
    pub fn expand(&self, sql: &str) -> String {
        sql.replace(PREFIX_PLACEHOLDER, &self.prefix)
    }
}

impl RowSource for SqliteSource {
    #[instrument(skip_all)]
    fn query(&self, sql: &str, on_row: &mut RowCallback<'_>) -> Result<u64> {
        let sql = self.expand(sql);
        debug!(sql = %sql, "Running query");

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;

        let mut count = 0;
        while let Some(raw) = rows.next()? {
            let mut row = Row::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                row.push(name.as_str(), Value::from(raw.get_ref(i)?));
            }
            on_row(&row)?;
            count += 1;
        }
        Ok(count)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let sql = self.expand(sql);
        Ok(self.conn.execute(&sql, params_from_iter(params.iter()))?)
    }

    fn execute_batch(&self, sql: &str, rows: &[Vec<Value>]) -> Result<usize> {
        let sql = self.expand(sql);
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for params in rows {
                changed += stmt.execute(params_from_iter(params.iter()))?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let name = format!("{}{}", self.prefix, table);
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([&name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(if columns.is_empty() { None } else { Some(columns) })
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
