pub mod seed;
pub use seed::sample_slate;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};

use crate::models::{BoardError, Game};
use crate::services::{normalize_games, Tracker};
use crate::utils::export_file_name;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/pickboard.db";
pub const DEFAULT_STORAGE_KEY: &str = "football-pick-tracker";

/// Where the board lives
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub storage_key: String,
    /// Keep the board in process memory; nothing touches the database.
    pub ephemeral: bool,
}

/// Open the configured store and hydrate a tracker from it.
pub async fn open_tracker(settings: &Settings) -> Result<Tracker> {
    let kv: Arc<dyn KeyValueStore> = if settings.ephemeral {
        tracing::info!("Using an in-memory board, changes end with this process");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::open(&settings.database_url).await?)
    };
    let store = PickStore::new(kv, settings.storage_key.clone());
    Ok(Tracker::hydrate(store).await)
}

/// Durable string-to-string storage under a handful of keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BoardError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), BoardError>;
}

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<()> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await
}

pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        init_database_with_pool(&pool).await?;
        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BoardError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BoardError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BoardError> {
        sqlx::query(
            r#"INSERT INTO kv_store (key, value, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET
                   value      = excluded.value,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| BoardError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Process-local store. An optional byte quota makes oversized writes fail
/// the way a full browser store does.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Arc::default(),
            quota: Some(quota),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, BoardError> {
        self.entries
            .lock()
            .map_err(|_| BoardError::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BoardError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BoardError> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(BoardError::Storage(format!(
                    "quota exceeded: {} bytes over a {} byte limit",
                    value.len(),
                    quota
                )));
            }
        }
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Reads and writes the `{games: [...]}` document under one key.
#[derive(Clone)]
pub struct PickStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl PickStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { kv, key: key.into() }
    }

    /// Raw stored games. Unreadable or malformed data is treated as nothing stored.
    pub async fn load_raw(&self) -> Option<Vec<Value>> {
        let stored = match self.kv.get(&self.key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Unable to read stored board '{}': {}", self.key, e);
                return None;
            }
        };

        match games_array(&stored) {
            Ok(games) => Some(games),
            Err(e) => {
                tracing::warn!("Unable to parse stored data, falling back to sample slate: {}", e);
                None
            }
        }
    }

    pub async fn save(&self, games: &[Game]) -> Result<(), BoardError> {
        let body = serde_json::to_string(&BoardRef { games })
            .map_err(|e| BoardError::Storage(e.to_string()))?;
        self.kv.set(&self.key, &body).await
    }
}

#[derive(Serialize)]
struct BoardRef<'a> {
    games: &'a [Game],
}

fn games_array(contents: &str) -> Result<Vec<Value>, BoardError> {
    let mut parsed: Value =
        serde_json::from_str(contents).map_err(|e| BoardError::Format(e.to_string()))?;
    match parsed.get_mut("games").map(Value::take) {
        Some(Value::Array(games)) => Ok(games),
        _ => Err(BoardError::Format("Invalid file format.".to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: String,
}

/// Pretty-printed export named after the (UTC) date it was taken.
pub fn export_games(games: &[Game], date: NaiveDate) -> Result<ExportFile, BoardError> {
    let contents = serde_json::to_string_pretty(&BoardRef { games })
        .map_err(|e| BoardError::Format(e.to_string()))?;
    Ok(ExportFile {
        file_name: export_file_name(date),
        contents,
    })
}

/// Parse an export file back into a normalized collection.
pub fn import_games(contents: &str) -> Result<Vec<Game>, BoardError> {
    let games = games_array(contents)?;
    Ok(normalize_games(&games))
}
