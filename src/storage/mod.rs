//! Persisted instance state and the indicator database

pub mod file;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::InstanceArgs;
use crate::error::FeedError;
use crate::models::{CursorContext, Indicator};

pub use file::{JsonFileStore, JsonLinesSink};
pub use postgres::PgStore;

/// Number of indicators handed to a sink at once
pub const INDICATOR_BATCH_SIZE: usize = 2000;

/// Key-value storage for the per-instance fetch cursor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Stored cursor, empty when nothing was saved yet
    async fn load(&self) -> Result<CursorContext, FeedError>;

    async fn save(&self, context: &CursorContext) -> Result<(), FeedError>;

    async fn clear(&self) -> Result<(), FeedError>;
}

/// Destination for fetched indicators
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndicatorSink: Send + Sync {
    /// Store one batch, returning how many indicators were written
    async fn create_indicators(&self, batch: &[Indicator]) -> Result<usize, FeedError>;
}

/// Storage an instance reads and writes
#[derive(Clone)]
pub struct Backends {
    pub context: Arc<dyn ContextStore>,
    pub sink: Arc<dyn IndicatorSink>,
}

impl Backends {
    /// PostgreSQL when a database URL is configured, files otherwise
    pub async fn open(instance: &InstanceArgs) -> Result<Self, FeedError> {
        if let Some(database_url) = &instance.database_url {
            let store = PgStore::new(database_url, instance.instance.clone()).await?;
            store.ensure_schema().await?;
            tracing::info!(instance = %instance.instance, "Using PostgreSQL storage");
            let store = Arc::new(store);
            return Ok(Self {
                context: store.clone(),
                sink: store,
            });
        }

        let sink = match &instance.indicators_out {
            Some(path) => JsonLinesSink::file(path),
            None => JsonLinesSink::stdout(),
        };
        tracing::debug!(context_file = %instance.context_file.display(), "Using file storage");
        Ok(Self {
            context: Arc::new(JsonFileStore::new(&instance.context_file)),
            sink: Arc::new(sink),
        })
    }
}
