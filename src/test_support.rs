//! In-memory TAXII source for unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::collectors::Taxii2Source;
use crate::error::FeedError;
use crate::models::{Collection, FetchedBatch, Indicator, IndicatorType};
use crate::timeutil::parse_taxii_time;

/// Domain indicator whose raw payload carries `created`
pub fn indicator(value: &str, created: &str) -> Indicator {
    Indicator {
        value: value.to_string(),
        indicator_type: IndicatorType::Domain,
        raw_json: json!({
            "created": created,
            "pattern": format!("[domain-name:value = '{}']", value),
        }),
        fields: Default::default(),
    }
}

type Request = (String, i64, Option<String>);

#[derive(Default)]
pub struct FakeSource {
    collections: Vec<Collection>,
    indicators: HashMap<String, Vec<Indicator>>,
    pinned: Option<Collection>,
    failure: Option<fn() -> FeedError>,
    requests: Mutex<Vec<Request>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, id: &str, indicators: Vec<Indicator>) -> Self {
        self.collections
            .push(Collection::new(id, format!("{} title", id)));
        self.indicators.insert(id.to_string(), indicators);
        self
    }

    pub fn pinned(mut self, id: &str) -> Self {
        self.pinned = self.collections.iter().find(|c| c.id == id).cloned();
        self
    }

    pub fn failing_with(mut self, failure: fn() -> FeedError) -> Self {
        self.failure = Some(failure);
        self
    }

    /// `(collection, limit, added_after)` for every fetch, in order
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Taxii2Source for FakeSource {
    fn collections(&self) -> &[Collection] {
        &self.collections
    }

    fn collection_to_fetch(&self) -> Option<&Collection> {
        self.pinned.as_ref()
    }

    async fn fetch_indicators(
        &self,
        collection: &Collection,
        limit: i64,
        added_after: Option<&str>,
    ) -> Result<FetchedBatch, FeedError> {
        self.requests.lock().unwrap().push((
            collection.id.clone(),
            limit,
            added_after.map(str::to_string),
        ));
        if let Some(failure) = self.failure {
            return Err(failure());
        }

        let mut indicators = self
            .indicators
            .get(&collection.id)
            .cloned()
            .unwrap_or_default();
        if limit >= 0 {
            indicators.truncate(limit as usize);
        }

        let latest_created = indicators
            .iter()
            .filter_map(|i| i.raw_json["created"].as_str())
            .max_by_key(|c| parse_taxii_time(c))
            .map(str::to_string);

        Ok(FetchedBatch {
            indicators,
            latest_created,
        })
    }
}
