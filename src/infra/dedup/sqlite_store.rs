use crate::core::dedup::{Fingerprint, FingerprintStore, GateError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// SQLite-backed seen-set. One row per fingerprint, keyed by the raw digest;
/// rows are only ever inserted.
pub struct SqliteFingerprintStore {
    pool: Pool<Sqlite>,
}

impl SqliteFingerprintStore {
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
            CREATE TABLE IF NOT EXISTS fingerprint (
                digest BLOB PRIMARY KEY NOT NULL,
                first_seen TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, GateError> {
        let row = sqlx::query("SELECT 1 FROM fingerprint WHERE digest = ?")
            .bind(fingerprint.as_bytes().to_vec())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GateError::Store(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn insert(&self, fingerprint: &Fingerprint) -> Result<(), GateError> {
        sqlx::query(
            r#"
            INSERT INTO fingerprint (digest, first_seen)
            VALUES (?, ?)
            ON CONFLICT(digest) DO NOTHING
            "#,
        )
        .bind(fingerprint.as_bytes().to_vec())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| GateError::Store(e.to_string()))?;

        Ok(())
    }

    async fn len(&self) -> Result<u64, GateError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM fingerprint")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GateError::Store(e.to_string()))?;

        Ok(row.get::<i64, _>("count") as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, SqliteFingerprintStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.db");
        let store = SqliteFingerprintStore::new(path.to_str().unwrap())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn insert_then_contains_roundtrip() {
        let (_dir, store) = temp_store().await;
        let fp = Fingerprint::from_bytes(b"some image bytes");

        assert!(!store.contains(&fp).await.unwrap());
        store.insert(&fp).await.unwrap();
        assert!(store.contains(&fp).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn repeated_insert_keeps_one_row() {
        let (_dir, store) = temp_store().await;
        let fp = Fingerprint::from_bytes(b"dup");

        store.insert(&fp).await.unwrap();
        store.insert(&fp).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_digests_are_distinct_rows() {
        let (_dir, store) = temp_store().await;

        store.insert(&Fingerprint::from_bytes(b"a")).await.unwrap();
        store.insert(&Fingerprint::from_bytes(b"b")).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
        assert!(!store
            .contains(&Fingerprint::from_bytes(b"c"))
            .await
            .unwrap());
    }
}
