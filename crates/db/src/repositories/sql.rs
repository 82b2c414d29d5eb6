use chrono::Utc;
use serde_json::Value;
use sqlx::Row;

use super::{validate_key, DocumentStore, Namespace, RepositoryError};
use crate::DbPool;

pub struct SqlDocumentStore {
    pool: DbPool,
}

impl SqlDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqlDocumentStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>, RepositoryError> {
        validate_key(key)?;
        let row = sqlx::query("SELECT body FROM documents WHERE namespace = ? AND key = ?")
            .bind(namespace.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let body: String = row.try_get("body").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn put(
        &self,
        namespace: Namespace,
        key: &str,
        document: &Value,
    ) -> Result<(), RepositoryError> {
        validate_key(key)?;
        let body = serde_json::to_string(document)?;

        sqlx::query(
            "INSERT INTO documents (namespace, key, body, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(namespace, key) DO UPDATE SET
                 body = excluded.body,
                 updated_at = excluded.updated_at",
        )
        .bind(namespace.as_str())
        .bind(key)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, RepositoryError> {
        validate_key(key)?;
        let result = sqlx::query("DELETE FROM documents WHERE namespace = ? AND key = ?")
            .bind(namespace.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self, namespace: Namespace) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT key FROM documents WHERE namespace = ? ORDER BY key")
            .bind(namespace.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(|e| RepositoryError::Decode(e.to_string())))
            .collect()
    }
}
