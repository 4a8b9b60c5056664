//! PostgreSQL storage for the cursor and the indicator database

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::FeedError;
use crate::models::{CursorContext, Indicator};
use crate::storage::{ContextStore, IndicatorSink};

/// Database repository keyed by instance name
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    instance: String,
}

impl PgStore {
    /// Create new repository with database connection
    pub async fn new(database_url: &str, instance: impl Into<String>) -> Result<Self, FeedError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            instance: instance.into(),
        })
    }

    /// Create the tables this store uses when they are missing
    pub async fn ensure_schema(&self) -> Result<(), FeedError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS integration_context (
                instance TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_indicators (
                id UUID PRIMARY KEY,
                indicator_type TEXT NOT NULL,
                value TEXT NOT NULL,
                raw_json JSONB NOT NULL,
                fields JSONB NOT NULL,
                source_instance TEXT NOT NULL,
                first_seen TIMESTAMPTZ NOT NULL,
                last_seen TIMESTAMPTZ NOT NULL,
                UNIQUE (indicator_type, value)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ContextStore for PgStore {
    async fn load(&self) -> Result<CursorContext, FeedError> {
        let row: Option<(Json<CursorContext>,)> =
            sqlx::query_as("SELECT data FROM integration_context WHERE instance = $1")
                .bind(&self.instance)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(ctx),)| ctx).unwrap_or_default())
    }

    async fn save(&self, context: &CursorContext) -> Result<(), FeedError> {
        sqlx::query(
            r#"
            INSERT INTO integration_context (instance, data, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (instance) DO UPDATE SET
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&self.instance)
        .bind(Json(context))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), FeedError> {
        sqlx::query("DELETE FROM integration_context WHERE instance = $1")
            .bind(&self.instance)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl IndicatorSink for PgStore {
    /// Upsert a batch in one transaction; a re-delivered indicator refreshes `last_seen`
    async fn create_indicators(&self, batch: &[Indicator]) -> Result<usize, FeedError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for indicator in batch {
            sqlx::query(
                r#"
                INSERT INTO feed_indicators (
                    id, indicator_type, value, raw_json, fields, source_instance, first_seen, last_seen
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                ON CONFLICT (indicator_type, value) DO UPDATE SET
                    raw_json = EXCLUDED.raw_json,
                    fields = EXCLUDED.fields,
                    last_seen = EXCLUDED.last_seen
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(indicator.indicator_type.as_str())
            .bind(&indicator.value)
            .bind(Json(&indicator.raw_json))
            .bind(Json(&indicator.fields))
            .bind(&self.instance)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(batch.len())
    }
}
