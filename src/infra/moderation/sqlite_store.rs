use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

use crate::core::moderation::{ModerationError, ModerationStore};

/// SQLite persistence for per-guild prefixes and the trusted-user list.
pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prefix (
                id INTEGER PRIMARY KEY NOT NULL,
                guild_id INTEGER NOT NULL,
                prefix TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trusted (
                id INTEGER PRIMARY KEY NOT NULL,
                user_id INTEGER NOT NULL UNIQUE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ModerationStore for SqliteModerationStore {
    async fn prefixes(&self, guild_id: u64) -> Result<Vec<String>, ModerationError> {
        let rows = sqlx::query("SELECT prefix FROM prefix WHERE guild_id = ? ORDER BY id")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get("prefix")).collect())
    }

    async fn add_prefix(&self, guild_id: u64, prefix: &str) -> Result<(), ModerationError> {
        sqlx::query("INSERT INTO prefix (guild_id, prefix) VALUES (?, ?)")
            .bind(guild_id as i64)
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn remove_prefix(&self, guild_id: u64, prefix: &str) -> Result<u64, ModerationError> {
        let result = sqlx::query("DELETE FROM prefix WHERE guild_id = ? AND prefix = ?")
            .bind(guild_id as i64)
            .bind(prefix)
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn clear_prefixes(&self, guild_id: u64) -> Result<u64, ModerationError> {
        let result = sqlx::query("DELETE FROM prefix WHERE guild_id = ?")
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn trusted_ids(&self) -> Result<Vec<u64>, ModerationError> {
        let rows = sqlx::query("SELECT user_id FROM trusted")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>("user_id") as u64)
            .collect())
    }

    async fn add_trusted(&self, user_id: u64) -> Result<bool, ModerationError> {
        let result = sqlx::query(
            "INSERT INTO trusted (user_id) VALUES (?) ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_trusted(&self, user_id: u64) -> Result<u64, ModerationError> {
        let result = sqlx::query("DELETE FROM trusted WHERE user_id = ?")
            .bind(user_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ModerationError::Storage(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
