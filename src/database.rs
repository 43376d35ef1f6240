//! SQLite connection factory shared by the schema introspector and the SQL executor
use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

/// Hands out one scoped connection per call.
///
/// The pool is opened lazily: an unreachable database only shows up when a
/// stage acquires a connection, where it is folded into that stage's result.
/// A `PoolConnection` goes back to the pool when dropped, so every exit path
/// of a stage releases it.
#[derive(Clone)]
pub struct ConnectionFactory {
    pool: SqlitePool,
    database_name: String,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("database_name", &self.database_name)
            .finish()
    }
}

impl ConnectionFactory {
    /// Build a factory for a SQLite URL (`sqlite://path/to.db`) or a plain file path.
    pub fn new(database: &str) -> Result<Self, DatabaseError> {
        let options = Self::connect_options(database)?;

        debug!("[ConnectionFactory::new] Preparing pool for: {}", database);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            database_name: display_name(database),
        })
    }

    fn connect_options(database: &str) -> Result<SqliteConnectOptions, DatabaseError> {
        let database = database.trim();
        if database.is_empty() {
            return Err(DatabaseError::InvalidUrl(
                "database location is empty".to_string(),
            ));
        }

        let options = if database.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database)
                .map_err(|e| DatabaseError::InvalidUrl(format!("Failed to parse URL: {e}")))?
        } else if database.contains("://") {
            return Err(DatabaseError::InvalidUrl(format!(
                "only SQLite databases are supported, got '{database}'"
            )));
        } else {
            SqliteConnectOptions::new().filename(database)
        };

        // Never create an empty database by accident
        Ok(options.create_if_missing(false))
    }

    /// Acquire a connection for the duration of one stage.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, DatabaseError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))
    }

    /// Name of the database for display purposes
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// File stem of the database location, as shown in the REPL prompt
fn display_name(database: &str) -> String {
    let path = database
        .trim()
        .trim_start_matches("sqlite:")
        .trim_start_matches("//")
        .split('?')
        .next()
        .unwrap_or_default();

    Path::new(path)
        .file_stem()
        .and_then(|os_str| os_str.to_str())
        .unwrap_or("main")
        .to_string()
}
