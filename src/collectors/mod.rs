//! Threat intelligence feed collectors

pub mod taxii2;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::models::{Collection, FetchedBatch};

pub use taxii2::Taxii2FeedClient;

/// Source of indicators organised in collections
#[async_trait]
pub trait Taxii2Source: Send + Sync {
    /// Collections resolved when the client was initialised
    fn collections(&self) -> &[Collection];

    /// The single collection this instance is pinned to, if any
    fn collection_to_fetch(&self) -> Option<&Collection>;

    /// Fetch up to `limit` indicators (negative for no limit) added after `added_after`
    async fn fetch_indicators(
        &self,
        collection: &Collection,
        limit: i64,
        added_after: Option<&str>,
    ) -> Result<FetchedBatch, FeedError>;
}
