//! SQLite-backed key/value store
//!
//! One `kv` table, JSON bodies as text. Writes are UPSERTs; the unique-index
//! primitive is an `INSERT OR IGNORE` checked by rows affected.

use crate::error::Result;
use crate::store::KvStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Key/value store persisted in SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the store at the given sqlx connection URL
    pub async fn open(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        let store = Self { pool };
        store.init_schema().await?;
        info!("Opened key/value store at {}", url);
        Ok(store)
    }

    /// In-memory store for tests
    pub async fn open_in_memory() -> Result<Self> {
        Self::open("sqlite::memory:").await
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<Value>> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM kv WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match body {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, id: &str, value: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (id, body, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET body = excluded.body,
                                          updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(id)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put_if_absent(&self, id: &str, value: &Value) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO kv (id, body) VALUES (?, ?)")
            .bind(id)
            .bind(value.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_ids(&self, prefix: &str) -> Result<Vec<String>> {
        // Escape LIKE wildcards so a literal prefix never over-matches
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM kv WHERE id LIKE ? ESCAPE '\\' ORDER BY id")
                .bind(format!("{}%", escaped))
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}
