//! Postgres-backed document store.
//!
//! Documents live in a single JSONB table keyed by (collection, key) with a
//! version column carrying the compare-and-swap token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use crate::config::DatabaseSettings;
use crate::error::StoreError;
use crate::profile::store::{DocumentStore, VersionedDocument};

pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub async fn connect(config: &DatabaseSettings) -> Result<Self> {
        info!(
            "Initializing database connection pool with max_connections={}",
            config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await
            .context("Failed to connect to database")?;

        Ok(PostgresDocumentStore { pool })
    }

    /// Create the documents table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection VARCHAR(64) NOT NULL,
                key VARCHAR(255) NOT NULL,
                body JSONB NOT NULL,
                version BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (collection, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create documents table")?;

        Ok(())
    }

    fn backend(e: sqlx::Error) -> StoreError {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<VersionedDocument>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body, version FROM documents
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::backend)?;

        match row {
            Some(row) => {
                let body: Value = row.try_get("body").map_err(Self::backend)?;
                let version: i64 = row.try_get("version").map_err(Self::backend)?;
                Ok(Some(VersionedDocument {
                    body,
                    version: version as u64,
                }))
            }
            None => Ok(None),
        }
    }

    async fn insert_new(
        &self,
        collection: &str,
        key: &str,
        body: Value,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, key, body, version)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (collection, key) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn put_versioned(
        &self,
        collection: &str,
        key: &str,
        body: Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = $3, version = version + 1, updated_at = NOW()
            WHERE collection = $1 AND key = $2 AND version = $4
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(body)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        Ok(expected_version + 1)
    }
}
