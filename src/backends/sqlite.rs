//! SQLite-backed document store
//!
//! One `documents` table keyed by (collection, id) with a JSON body. Uses
//! the runtime sqlx query API; equality filters are applied in Rust after
//! loading the collection, which keeps filter semantics identical to
//! [`super::store::MemoryStore`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::store::{DocumentStore, FieldFilter, matches_filters};
use crate::utils::{AdvisorError, AdvisorResult};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create the store and its backing table if missing.
    pub async fn new(pool: SqlitePool) -> AdvisorResult<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                body       TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> AdvisorResult<()> {
        sqlx::query(
            "INSERT INTO documents (collection, id, body, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body,
                 updated_at = excluded.updated_at",
        )
        .bind(collection)
        .bind(id)
        .bind(body.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> AdvisorResult<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(serde_json::from_str(&body)?))
            },
            None => Ok(None),
        }
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> AdvisorResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET body = ?, updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(body.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AdvisorError::not_found(format!("document {}/{}", collection, id)));
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> AdvisorResult<()> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> AdvisorResult<Vec<serde_json::Value>> {
        let rows = sqlx::query("SELECT body FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.get("body");
            let doc: serde_json::Value = serde_json::from_str(&body)?;
            if matches_filters(&doc, filters) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }
}
