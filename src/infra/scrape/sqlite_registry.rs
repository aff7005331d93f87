use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

use crate::core::scrape::{
    ScrapeError, ScrapeRegistry, SubredditEntry, WebhookEntry, WebhookQuery,
};

/// SQLite registry for tracked subreddits, their webhooks, and the poll
/// watermark.
pub struct SqliteScrapeRegistry {
    pool: Pool<Sqlite>,
}

impl SqliteScrapeRegistry {
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

        let registry = Self { pool };
        registry.migrate().await?;
        Ok(registry)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webhook (
                id INTEGER PRIMARY KEY NOT NULL,
                name TEXT COLLATE NOCASE NOT NULL UNIQUE,
                url TEXT NOT NULL UNIQUE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subreddit (
                id INTEGER PRIMARY KEY NOT NULL,
                name TEXT COLLATE NOCASE NOT NULL UNIQUE,
                webhook_id INTEGER,
                FOREIGN KEY (webhook_id) REFERENCES webhook(id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scrape_state (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_subreddit(row: &sqlx::sqlite::SqliteRow) -> SubredditEntry {
    SubredditEntry {
        id: row.get::<i64, _>("id"),
        name: row.get("name"),
        webhook_id: row.get::<Option<i64>, _>("webhook_id"),
    }
}

fn row_to_webhook(row: &sqlx::sqlite::SqliteRow) -> WebhookEntry {
    WebhookEntry {
        id: row.get::<i64, _>("id"),
        name: row.get("name"),
        url: row.get("url"),
    }
}

#[async_trait]
impl ScrapeRegistry for SqliteScrapeRegistry {
    async fn get_subreddit(&self, name: &str) -> Result<Option<SubredditEntry>, ScrapeError> {
        let row = sqlx::query("SELECT id, name, webhook_id FROM subreddit WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(row.as_ref().map(row_to_subreddit))
    }

    async fn add_subreddit(&self, name: &str) -> Result<Option<SubredditEntry>, ScrapeError> {
        if self.get_subreddit(name).await?.is_some() {
            return Ok(None);
        }

        sqlx::query("INSERT INTO subreddit (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        self.get_subreddit(name).await
    }

    async fn remove_subreddit(&self, name: &str) -> Result<u64, ScrapeError> {
        let result = sqlx::query("DELETE FROM subreddit WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn list_subreddits(&self) -> Result<Vec<SubredditEntry>, ScrapeError> {
        let rows = sqlx::query("SELECT id, name, webhook_id FROM subreddit ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(rows.iter().map(row_to_subreddit).collect())
    }

    async fn assign_webhook(
        &self,
        subreddit: &str,
        webhook_id: Option<i64>,
    ) -> Result<bool, ScrapeError> {
        let result = sqlx::query("UPDATE subreddit SET webhook_id = ? WHERE name = ?")
            .bind(webhook_id)
            .bind(subreddit)
            .execute(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_webhook(&self, query: &WebhookQuery) -> Result<Option<WebhookEntry>, ScrapeError> {
        let sql = match query {
            WebhookQuery::Id(_) => "SELECT id, name, url FROM webhook WHERE id = ?",
            WebhookQuery::Url(_) => "SELECT id, name, url FROM webhook WHERE url = ?",
            WebhookQuery::Name(_) => "SELECT id, name, url FROM webhook WHERE name = ?",
        };

        let statement = match query {
            WebhookQuery::Id(id) => sqlx::query(sql).bind(*id),
            WebhookQuery::Url(url) => sqlx::query(sql).bind(url.as_str()),
            WebhookQuery::Name(name) => sqlx::query(sql).bind(name.as_str()),
        };

        let row = statement
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(row.as_ref().map(row_to_webhook))
    }

    async fn add_webhook(
        &self,
        name: &str,
        url: &str,
    ) -> Result<Option<WebhookEntry>, ScrapeError> {
        if self
            .get_webhook(&WebhookQuery::Url(url.to_string()))
            .await?
            .is_some()
        {
            return Ok(None);
        }

        sqlx::query("INSERT INTO webhook (name, url) VALUES (?, ?) ON CONFLICT(url) DO NOTHING")
            .bind(name)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        self.get_webhook(&WebhookQuery::Url(url.to_string())).await
    }

    async fn remove_webhook(&self, query: &WebhookQuery) -> Result<u64, ScrapeError> {
        let Some(webhook) = self.get_webhook(query).await? else {
            return Ok(0);
        };

        // Clear the reference on any subreddit still pointing at it.
        sqlx::query("UPDATE subreddit SET webhook_id = NULL WHERE webhook_id = ?")
            .bind(webhook.id)
            .execute(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        let result = sqlx::query("DELETE FROM webhook WHERE id = ?")
            .bind(webhook.id)
            .execute(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookEntry>, ScrapeError> {
        let rows = sqlx::query("SELECT id, name, url FROM webhook ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(rows.iter().map(row_to_webhook).collect())
    }

    async fn load_watermark(&self) -> Result<Option<DateTime<Utc>>, ScrapeError> {
        let row = sqlx::query("SELECT value FROM scrape_state WHERE key = 'last_check'")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(row
            .map(|row| row.get::<String, _>("value"))
            .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    async fn save_watermark(&self, at: DateTime<Utc>) -> Result<(), ScrapeError> {
        sqlx::query(
            r#"
            INSERT INTO scrape_state (key, value)
            VALUES ('last_check', ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ScrapeError::Store(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_registry() -> (tempfile::TempDir, SqliteScrapeRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrape.db");
        let registry = SqliteScrapeRegistry::new(path.to_str().unwrap())
            .await
            .unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn subreddit_lifecycle() {
        let (_dir, registry) = temp_registry().await;

        let entry = registry.add_subreddit("pics").await.unwrap().unwrap();
        assert_eq!(entry.name, "pics");
        assert!(entry.webhook_id.is_none());

        // Names collate case-insensitively, like the rest of reddit.
        assert!(registry.add_subreddit("PICS").await.unwrap().is_none());
        assert!(registry.get_subreddit("Pics").await.unwrap().is_some());

        assert_eq!(registry.remove_subreddit("pics").await.unwrap(), 1);
        assert_eq!(registry.remove_subreddit("pics").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn webhook_lookup_by_every_key() {
        let (_dir, registry) = temp_registry().await;

        let webhook = registry
            .add_webhook("gallery", "https://hooks.example/a")
            .await
            .unwrap()
            .unwrap();

        for query in [
            WebhookQuery::Id(webhook.id),
            WebhookQuery::Name("gallery".to_string()),
            WebhookQuery::Url("https://hooks.example/a".to_string()),
        ] {
            let found = registry.get_webhook(&query).await.unwrap().unwrap();
            assert_eq!(found.id, webhook.id);
        }

        // Duplicate url is refused.
        assert!(registry
            .add_webhook("other-name", "https://hooks.example/a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn removing_a_webhook_clears_subreddit_references() {
        let (_dir, registry) = temp_registry().await;

        registry.add_subreddit("pics").await.unwrap();
        let webhook = registry
            .add_webhook("gallery", "https://hooks.example/a")
            .await
            .unwrap()
            .unwrap();
        assert!(registry
            .assign_webhook("pics", Some(webhook.id))
            .await
            .unwrap());

        let removed = registry
            .remove_webhook(&WebhookQuery::Name("gallery".to_string()))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let entry = registry.get_subreddit("pics").await.unwrap().unwrap();
        assert!(entry.webhook_id.is_none());
    }

    #[tokio::test]
    async fn assigning_to_missing_subreddit_reports_false() {
        let (_dir, registry) = temp_registry().await;
        assert!(!registry.assign_webhook("ghost", None).await.unwrap());
    }

    #[tokio::test]
    async fn watermark_roundtrips() {
        let (_dir, registry) = temp_registry().await;

        assert!(registry.load_watermark().await.unwrap().is_none());

        let at = Utc::now();
        registry.save_watermark(at).await.unwrap();
        let loaded = registry.load_watermark().await.unwrap().unwrap();
        assert_eq!(loaded.timestamp(), at.timestamp());

        // Last write wins.
        let later = at + chrono::Duration::minutes(5);
        registry.save_watermark(later).await.unwrap();
        let loaded = registry.load_watermark().await.unwrap().unwrap();
        assert_eq!(loaded.timestamp(), later.timestamp());
    }
}
