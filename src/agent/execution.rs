//! SQL execution stage
//!
//! Runs generated SQL against the database and renders the rows as text for
//! the explanation prompt. Each row reads like a tuple literal: `(3503,)`,
//! `('AC/DC', 1)`, with `None` for NULL.

use crate::agent::error::PROVIDER_ERROR_PREFIX;
use crate::agent::prompt::SENTINEL_PREFIX;
use crate::database::ConnectionFactory;
use futures_util::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::fmt::{self, Write};
use tracing::{debug, info, warn};

pub const EXECUTION_ERROR_PREFIX: &str = "Error executing SQL";
pub const NO_RESULTS: &str = "Query executed successfully but returned no results.";
pub const MULTIPLE_STATEMENTS: &str = "You can only execute one statement at a time.";

/// A single SQLite value as read back from a result row
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("None"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) => write!(f, "{}", format_real(*r)),
            SqlValue::Text(s) => write_quoted_text(f, s),
            SqlValue::Blob(bytes) => write_bytes_literal(f, bytes),
        }
    }
}

// Reals always keep a fractional part: 1.0 stays "1.0"
fn format_real(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        (if value > 0.0 { "inf" } else { "-inf" }).to_string()
    } else {
        format!("{value:?}")
    }
}

fn write_quoted_text(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    f.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => {
                f.write_char('\\')?;
                f.write_char(c)?;
            }
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char(quote)
}

fn write_bytes_literal(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("b'")?;
    for &b in bytes {
        match b {
            b'\\' => f.write_str("\\\\")?,
            b'\'' => f.write_str("\\'")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            0x20..=0x7e => f.write_char(b as char)?,
            _ => write!(f, "\\x{b:02x}")?,
        }
    }
    f.write_char('\'')
}

/// Render one row as a tuple literal
fn render_row(values: &[SqlValue]) -> String {
    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
    if items.len() == 1 {
        format!("({},)", items[0])
    } else {
        format!("({})", items.join(", "))
    }
}

/// Outcome of running a generated query
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
        /// More rows existed beyond the cap
        truncated: bool,
    },
    NoRows,
    /// Driver error message
    Failed(String),
    /// Execution was not attempted; carries the text handed to the stage
    Skipped(String),
}

impl ExecutionResult {
    pub fn is_truncated(&self) -> bool {
        matches!(self, ExecutionResult::Rows { truncated: true, .. })
    }

    pub fn render(&self) -> String {
        match self {
            ExecutionResult::Rows {
                columns,
                rows,
                truncated,
            } => {
                let mut out = format!("Columns: {}\n", columns.join(", "));
                for row in rows {
                    out.push_str(&render_row(row));
                    out.push('\n');
                }
                if *truncated {
                    out.push_str(&format!("... (truncated after {} rows)\n", rows.len()));
                }
                out
            }
            ExecutionResult::NoRows => NO_RESULTS.to_string(),
            ExecutionResult::Failed(message) => format!("{EXECUTION_ERROR_PREFIX}: {message}"),
            ExecutionResult::Skipped(text) => text.clone(),
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Runs queries through a scoped pooled connection
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    connections: ConnectionFactory,
    max_rows: usize,
}

impl SqlExecutor {
    /// A `max_rows` of zero is raised to one.
    pub fn new(connections: ConnectionFactory, max_rows: usize) -> Self {
        Self {
            connections,
            max_rows: max_rows.max(1),
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Execute `query` and collect at most `max_rows` rows.
    ///
    /// Refusals and provider failures are passed through as
    /// [`ExecutionResult::Skipped`] without touching the database. Driver
    /// errors, and text holding more than one statement, become
    /// [`ExecutionResult::Failed`].
    pub async fn execute_sql(&self, query: &str) -> ExecutionResult {
        if query.starts_with(SENTINEL_PREFIX) || query.starts_with(PROVIDER_ERROR_PREFIX) {
            debug!("Skipping execution of non-SQL text");
            return ExecutionResult::Skipped(query.to_string());
        }

        if has_trailing_statement(query) {
            warn!("Refusing to run more than one statement");
            return ExecutionResult::Failed(MULTIPLE_STATEMENTS.to_string());
        }

        let mut conn = match self.connections.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Could not acquire connection: {}", e);
                return ExecutionResult::Failed(e.to_string());
            }
        };

        debug!("Executing SQL: {}", query);
        let mut stream = sqlx::query(query).fetch(&mut *conn);

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        let mut truncated = false;

        loop {
            match stream.try_next().await {
                Ok(Some(row)) => {
                    if rows.len() == self.max_rows {
                        truncated = true;
                        break;
                    }
                    if rows.is_empty() {
                        columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    rows.push(decode_row(&row));
                }
                Ok(None) => break,
                Err(e) => {
                    let message = driver_message(&e);
                    warn!("SQL execution failed: {}", message);
                    return ExecutionResult::Failed(message);
                }
            }
        }

        if rows.is_empty() {
            info!("Query returned no rows");
            return ExecutionResult::NoRows;
        }

        info!(
            "Query returned {} rows{}",
            rows.len(),
            if truncated { " (truncated)" } else { "" }
        );
        ExecutionResult::Rows {
            columns,
            rows,
            truncated,
        }
    }
}

/// Whether anything but comments and semicolons follows the first `;`.
///
/// Quoted strings, quoted identifiers and comments are skipped, so a `;`
/// inside them does not end the statement.
fn has_trailing_statement(sql: &str) -> bool {
    let mut chars = sql.chars().peekable();
    let mut ended = false;

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            ';' => ended = true,
            c if c.is_whitespace() => {}
            _ if ended => return true,
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                for c in chars.by_ref() {
                    if c == close {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    false
}

/// The database's own message when there is one, without sqlx's wrapper text
fn driver_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    }
}

fn decode_row(row: &SqliteRow) -> Vec<SqlValue> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn decode_value(row: &SqliteRow, index: usize) -> SqlValue {
    let storage_class = match row.try_get_raw(index) {
        Ok(value) if value.is_null() => return SqlValue::Null,
        Ok(value) => value.type_info().name().to_string(),
        Err(_) => return SqlValue::Null,
    };

    // Storage class of the value itself, not the declared column type
    let decoded = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(index).ok().map(SqlValue::Integer),
        "REAL" => row.try_get::<f64, _>(index).ok().map(SqlValue::Real),
        "BLOB" => row.try_get::<Vec<u8>, _>(index).ok().map(SqlValue::Blob),
        _ => row.try_get::<String, _>(index).ok().map(SqlValue::Text),
    };

    decoded.unwrap_or_else(|| {
        // Fall back through the types in order of likelihood
        if let Ok(val) = row.try_get::<i64, _>(index) {
            SqlValue::Integer(val)
        } else if let Ok(val) = row.try_get::<f64, _>(index) {
            SqlValue::Real(val)
        } else if let Ok(val) = row.try_get::<String, _>(index) {
            SqlValue::Text(val)
        } else if let Ok(val) = row.try_get::<Vec<u8>, _>(index) {
            SqlValue::Blob(val)
        } else {
            SqlValue::Text(format!("<{storage_class}>"))
        }
    })
}
