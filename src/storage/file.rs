//! File-backed storage for running without a database

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::FeedError;
use crate::models::{CursorContext, Indicator};
use crate::storage::{ContextStore, IndicatorSink};

/// Cursor kept as a JSON object in a single file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContextStore for JsonFileStore {
    async fn load(&self) -> Result<CursorContext, FeedError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CursorContext::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(CursorContext::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, context: &CursorContext) -> Result<(), FeedError> {
        // Readers never observe a partially written file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(context)?).await?;
        fs::rename(&tmp, &self.path).await?;
        tracing::debug!(
            path = %self.path.display(),
            collections = context.len(),
            "Saved fetch cursor"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<(), FeedError> {
        self.save(&CursorContext::new()).await
    }
}

/// Indicators appended as JSON lines to a file, or written to stdout
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: Option<PathBuf>,
}

impl JsonLinesSink {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn stdout() -> Self {
        Self { path: None }
    }
}

#[async_trait]
impl IndicatorSink for JsonLinesSink {
    async fn create_indicators(&self, batch: &[Indicator]) -> Result<usize, FeedError> {
        let mut buf = Vec::new();
        for indicator in batch {
            serde_json::to_writer(&mut buf, indicator)?;
            buf.push(b'\n');
        }

        match &self.path {
            Some(path) => {
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(&buf).await?;
                file.flush().await?;
            }
            None => {
                let mut out = tokio::io::stdout();
                out.write_all(&buf).await?;
                out.flush().await?;
            }
        }

        Ok(batch.len())
    }
}
