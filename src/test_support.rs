//! Scratch SQLite databases and a scripted provider for unit tests
use crate::agent::client::CompletionProvider;
use crate::agent::error::ProviderError;
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::collections::VecDeque;
use std::sync::Mutex;
use tempfile::TempDir;

const MUSIC_SCHEMA: &str = r#"
CREATE TABLE artists (
    ArtistId INTEGER PRIMARY KEY AUTOINCREMENT,
    Name NVARCHAR(120)
);
CREATE TABLE albums (
    AlbumId INTEGER PRIMARY KEY AUTOINCREMENT,
    Title NVARCHAR(160) NOT NULL,
    ArtistId INTEGER NOT NULL REFERENCES artists(ArtistId)
);
CREATE TABLE tracks (
    TrackId INTEGER PRIMARY KEY AUTOINCREMENT,
    Name NVARCHAR(200) NOT NULL,
    AlbumId INTEGER REFERENCES albums(AlbumId),
    Milliseconds INTEGER NOT NULL,
    UnitPrice NUMERIC(10,2) NOT NULL
);
INSERT INTO artists (Name) VALUES ('AC/DC'), ('Accept'), ('Aerosmith');
INSERT INTO albums (Title, ArtistId) VALUES
    ('For Those About To Rock We Salute You', 1),
    ('Let There Be Rock', 1),
    ('Balls to the Wall', 2),
    ('Big Ones', 3);
INSERT INTO tracks (Name, AlbumId, Milliseconds, UnitPrice) VALUES
    ('For Those About To Rock (We Salute You)', 1, 343719, 0.99),
    ('Go Down', 2, 331180, 0.99),
    ('Balls to the Wall', 3, 342562, 0.99),
    ('Walk On Water', 4, 295680, 1.99),
    ('Untitled Demo', NULL, 120000, 1.0);
"#;

/// A temporary database file that lives as long as this value.
pub(crate) struct TestDatabase {
    _dir: TempDir,
    pub path: String,
}

/// Small music catalogue: `artists`, `albums`, `tracks` (5 rows).
pub(crate) async fn music_database() -> TestDatabase {
    database_with(MUSIC_SCHEMA).await
}

/// A database file initialised with `script`.
pub(crate) async fn database_with(script: &str) -> TestDatabase {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("music.db");

    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    sqlx::raw_sql(script).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();

    TestDatabase {
        _dir: dir,
        path: path.to_string_lossy().to_string(),
    }
}

/// Replays canned replies in order and records every prompt it receives.
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<&str, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| reply.map(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
