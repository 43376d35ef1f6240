//! Schema introspection for prompt context
//!
//! Reads the SQLite catalog on every call and renders a plain-text block the
//! model can read:
//!
//! ```text
//! Table: albums
//!   - AlbumId (INTEGER)
//!   - Title (NVARCHAR(160))
//!
//! ```

use crate::database::{ConnectionFactory, DatabaseError};
use sqlx::{Row, SqliteConnection};
use std::fmt;
use tracing::{debug, info, warn};

/// Prefix of the text rendered when the schema cannot be read
pub const SCHEMA_ERROR_PREFIX: &str = "Error getting schema";

/// Column name and declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
}

/// Table with its columns in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    fn render_into(&self, out: &mut String) {
        out.push_str(&format!("Table: {}\n", self.name));
        for column in &self.columns {
            out.push_str(&format!("  - {} ({})\n", column.name, column.data_type));
        }
        out.push('\n');
    }
}

/// All user tables of the database, in catalog order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDescription {
    pub tables: Vec<TableMetadata>,
}

impl SchemaDescription {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            table.render_into(&mut out);
        }
        out
    }
}

/// Outcome of a schema read.
///
/// An unreadable schema still renders to text so the generation prompt gets
/// something, but callers can tell the two apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaText {
    Described(SchemaDescription),
    Unavailable(String),
}

impl SchemaText {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SchemaText::Unavailable(_))
    }

    pub fn render(&self) -> String {
        match self {
            SchemaText::Described(description) => description.render(),
            SchemaText::Unavailable(message) => format!("{SCHEMA_ERROR_PREFIX}: {message}"),
        }
    }
}

impl fmt::Display for SchemaText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Reads table and column metadata through a scoped connection
#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    connections: ConnectionFactory,
}

impl SchemaIntrospector {
    pub fn new(connections: ConnectionFactory) -> Self {
        Self { connections }
    }

    /// Describe every user table. Never fails: errors become [`SchemaText::Unavailable`].
    pub async fn describe_schema(&self) -> SchemaText {
        match self.extract().await {
            Ok(description) => {
                debug!(
                    "Schema read: {} tables, {} bytes",
                    description.tables.len(),
                    description.render().len()
                );
                SchemaText::Described(description)
            }
            Err(e) => {
                warn!("Schema introspection failed: {}", e);
                SchemaText::Unavailable(e.to_string())
            }
        }
    }

    /// Read the full schema description
    pub async fn extract(&self) -> Result<SchemaDescription, DatabaseError> {
        let mut conn = self.connections.acquire().await?;

        let table_names = Self::table_names(&mut conn).await?;
        info!("Extracting schema for {} tables", table_names.len());

        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let columns = Self::columns(&mut conn, &name).await?;
            tables.push(TableMetadata { name, columns });
        }

        Ok(SchemaDescription { tables })
    }

    /// List user table names
    pub async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.connections.acquire().await?;
        Self::table_names(&mut conn).await
    }

    /// Describe a comma-separated list of tables.
    ///
    /// Unknown names are reported inline as `Table <name> not found.`
    pub async fn describe_tables(&self, table_names: &str) -> Result<String, DatabaseError> {
        let mut conn = self.connections.acquire().await?;
        let known = Self::table_names(&mut conn).await?;

        let mut out = String::new();
        for name in table_names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if known.iter().any(|k| k == name) {
                let columns = Self::columns(&mut conn, name).await?;
                TableMetadata {
                    name: name.to_string(),
                    columns,
                }
                .render_into(&mut out);
            } else {
                out.push_str(&format!("Table {name} not found.\n"));
            }
        }

        Ok(out)
    }

    async fn table_names(conn: &mut SqliteConnection) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT name AS table_name
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("table_name"))
            .collect())
    }

    async fn columns(
        conn: &mut SqliteConnection,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>, DatabaseError> {
        let query = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;

        // PRAGMA table_info returns columns in cid order
        Ok(rows
            .iter()
            .map(|row| ColumnMetadata {
                name: row.get::<String, _>("name"),
                data_type: row.get::<String, _>("type"),
            })
            .collect())
    }
}
