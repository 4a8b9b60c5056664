//! TAXII 2 feed collector
//! Resolves the API root, lists collections and pulls STIX indicators

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, CONTENT_RANGE, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::collectors::Taxii2Source;
use crate::config::{ClientConfig, TaxiiVersion};
use crate::error::FeedError;
use crate::models::ioc_utils::{extract_pattern_terms, indicator_type_for, normalize_ioc};
use crate::models::{Collection, FetchedBatch, Indicator};
use crate::timeutil::parse_taxii_time;

const PAGE_SIZE: i64 = 1000;
const HEADER_AUTH_PREFIX: &str = "_header:";

/// Discovery document served at the server root
#[derive(Debug, Deserialize)]
struct Discovery {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    api_roots: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    #[serde(default)]
    collections: Vec<Collection>,
}

/// TAXII 2.1 envelope or TAXII 2.0 bundle
#[derive(Debug, Deserialize)]
struct ObjectsPage {
    #[serde(default)]
    more: bool,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    objects: Vec<Value>,
}

/// Client for one TAXII 2 server
pub struct Taxii2FeedClient {
    client: Client,
    config: ClientConfig,
    api_root: Option<Url>,
    collections: Vec<Collection>,
    collection_to_fetch: Option<Collection>,
}

impl Taxii2FeedClient {
    /// Create a client. No request is made until [`initialise`](Self::initialise).
    pub fn new(config: ClientConfig) -> Result<Self, FeedError> {
        debug!(
            url = %config.url,
            verify = config.verify_certificate,
            proxy = config.proxy,
            "Creating TAXII 2 client"
        );

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("taxii2-feed/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!config.verify_certificate);
        if !config.proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(FeedError::HttpClientCreation)?;

        Ok(Self {
            client,
            config,
            api_root: None,
            collections: vec![],
            collection_to_fetch: None,
        })
    }

    pub fn api_root(&self) -> Option<&Url> {
        self.api_root.as_ref()
    }

    /// Resolve the API root, list its collections and pick the pinned one
    pub async fn initialise(&mut self) -> Result<(), FeedError> {
        let server = with_trailing_slash(&self.config.url)?;
        let document = self.get_json(server.clone(), &[]).await?;

        let api_root = if document.get("api_roots").is_some() {
            let discovery: Discovery = serde_json::from_value(document)?;
            let chosen = discovery
                .default
                .or_else(|| discovery.api_roots.into_iter().next())
                .ok_or(FeedError::NoCollections)?;
            let joined = server
                .join(&chosen)
                .map_err(|e| FeedError::config(format!("Invalid API root {}: {}", chosen, e)))?;
            with_trailing_slash(joined.as_str())?
        } else {
            server
        };
        info!(api_root = %api_root, "Resolved TAXII API root");

        let collections_url = join(&api_root, "collections/")?;
        let response: CollectionsResponse =
            serde_json::from_value(self.get_json(collections_url, &[]).await?)?;
        debug!(count = response.collections.len(), "Listed collections");

        self.collection_to_fetch = match &self.config.collection_to_fetch {
            Some(wanted) => Some(
                response
                    .collections
                    .iter()
                    .find(|c| &c.title == wanted)
                    .or_else(|| response.collections.iter().find(|c| &c.id == wanted))
                    .cloned()
                    .ok_or_else(|| {
                        FeedError::config(format!(
                            "Could not find the provided Collection name {} in the available collections. Please make sure you entered the name correctly.",
                            wanted
                        ))
                    })?,
            ),
            None => None,
        };
        self.collections = response.collections;
        self.api_root = Some(api_root);
        Ok(())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.credentials {
            Some(creds) => match creds.identifier.strip_prefix(HEADER_AUTH_PREFIX) {
                Some(header) => request.header(header, &creds.password),
                None => request.basic_auth(&creds.identifier, Some(&creds.password)),
            },
            None => request,
        }
    }

    async fn send(
        &self,
        url: Url,
        query: &[(&str, String)],
        range: Option<String>,
    ) -> Result<Response, FeedError> {
        debug!(%url, ?query, ?range, "GET");
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, self.config.version.media_type())
            .query(query);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        let response = self.authorize(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Api { status, body });
        }

        Ok(response)
    }

    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> Result<Value, FeedError> {
        Ok(self.send(url, query, None).await?.json().await?)
    }

    /// Turn one STIX object into indicators, one per recognised pattern term
    fn indicators_from_object(&self, object: &Value) -> Vec<Indicator> {
        let Some(pattern) = object.get("pattern").and_then(Value::as_str) else {
            return vec![];
        };

        let fields = self.indicator_fields(object);
        let mut seen = HashSet::new();
        let mut indicators = vec![];

        for term in extract_pattern_terms(pattern) {
            let Some(indicator_type) = indicator_type_for(&term.object_path, &term.value) else {
                debug!(path = %term.object_path, "Skipping unsupported pattern term");
                continue;
            };
            let value = normalize_ioc(&term.value, indicator_type);
            if value.is_empty() || !seen.insert((indicator_type, value.clone())) {
                continue;
            }
            indicators.push(Indicator {
                value,
                indicator_type,
                raw_json: object.clone(),
                fields: fields.clone(),
            });
        }

        indicators
    }

    fn indicator_fields(&self, object: &Value) -> Map<String, Value> {
        let mut fields = Map::new();
        for (field, key) in [
            ("stixid", "id"),
            ("firstseenbysource", "created"),
            ("modified", "modified"),
            ("description", "description"),
        ] {
            if let Some(v) = object.get(key).filter(|v| !v.is_null()) {
                fields.insert(field.to_string(), v.clone());
            }
        }

        let mut tags: Vec<Value> = object
            .get("labels")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        tags.extend(self.config.feed_tags.iter().map(|t| json!(t)));
        if !tags.is_empty() {
            fields.insert("tags".to_string(), Value::Array(tags));
        }

        if let Some(tlp) = &self.config.tlp_color {
            fields.insert("trafficlightprotocol".to_string(), json!(tlp));
        }
        fields
    }
}

#[async_trait]
impl Taxii2Source for Taxii2FeedClient {
    fn collections(&self) -> &[Collection] {
        &self.collections
    }

    fn collection_to_fetch(&self) -> Option<&Collection> {
        self.collection_to_fetch.as_ref()
    }

    async fn fetch_indicators(
        &self,
        collection: &Collection,
        limit: i64,
        added_after: Option<&str>,
    ) -> Result<FetchedBatch, FeedError> {
        let mut batch = FetchedBatch::default();
        if limit == 0 {
            return Ok(batch);
        }

        let api_root = self
            .api_root
            .as_ref()
            .ok_or_else(|| FeedError::config("TAXII client was not initialised"))?;
        let objects_url = join(api_root, &format!("collections/{}/objects/", collection.id))?;

        let full = |batch: &FetchedBatch| limit >= 0 && batch.indicators.len() as i64 >= limit;
        let mut latest: Option<DateTime<Utc>> = None;
        let mut next: Option<String> = None;
        // TAXII 2.0 pages by item offset
        let mut offset: u64 = 0;

        loop {
            let page_size = if limit < 0 {
                PAGE_SIZE
            } else {
                (limit - batch.indicators.len() as i64).min(PAGE_SIZE)
            };
            let mut query = vec![("match[type]", "indicator".to_string())];
            if let Some(after) = added_after {
                query.push(("added_after", after.to_string()));
            }
            let range = match self.config.version {
                TaxiiVersion::V20 => {
                    Some(format!("items {}-{}", offset, offset + page_size as u64 - 1))
                }
                TaxiiVersion::V21 => {
                    query.push(("limit", page_size.to_string()));
                    if let Some(token) = &next {
                        query.push(("next", token.clone()));
                    }
                    None
                }
            };

            let response = self.send(objects_url.clone(), &query, range).await?;
            let content_range = (response.status() == StatusCode::PARTIAL_CONTENT)
                .then(|| response.headers().get(CONTENT_RANGE))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range);
            let page: ObjectsPage = serde_json::from_value(response.json().await?)?;
            debug!(
                collection = %collection.id,
                objects = page.objects.len(),
                more = page.more,
                "Fetched objects page"
            );

            for object in &page.objects {
                if full(&batch) {
                    break;
                }
                if object.get("type").and_then(Value::as_str) != Some("indicator") {
                    continue;
                }

                let mut produced = self.indicators_from_object(object);
                if limit >= 0 {
                    produced.truncate((limit - batch.indicators.len() as i64) as usize);
                }
                if produced.is_empty() {
                    continue;
                }
                batch.indicators.extend(produced);

                match object.get("created").and_then(Value::as_str) {
                    Some(created) => match parse_taxii_time(created) {
                        Some(ts) if latest.is_none_or(|l| ts > l) => {
                            latest = Some(ts);
                            batch.latest_created = Some(created.to_string());
                        }
                        Some(_) => {}
                        None => warn!(created, "Unparseable indicator creation time"),
                    },
                    None => warn!(collection = %collection.id, "Indicator without creation time"),
                }
            }

            if full(&batch) || page.objects.is_empty() {
                break;
            }
            match self.config.version {
                TaxiiVersion::V20 => match content_range {
                    Some(range) if range.has_more() && range.last >= offset => {
                        offset = range.last + 1;
                    }
                    _ => break,
                },
                TaxiiVersion::V21 => match page.next {
                    Some(token) if page.more && next.as_ref() != Some(&token) => {
                        next = Some(token);
                    }
                    _ => break,
                },
            }
        }

        info!(
            collection = %collection.id,
            fetched = batch.indicators.len(),
            latest_created = batch.latest_created.as_deref().unwrap_or("-"),
            "Fetched indicators"
        );
        Ok(batch)
    }
}

/// `Content-Range: items <first>-<last>/<total>` of a TAXII 2.0 partial response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ItemRange {
    last: u64,
    /// `None` when the server answers `*`
    total: Option<u64>,
}

impl ItemRange {
    fn has_more(&self) -> bool {
        self.total.is_none_or(|total| self.last + 1 < total)
    }
}

fn parse_content_range(value: &str) -> Option<ItemRange> {
    let rest = value.trim().strip_prefix("items")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (_, last) = span.split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    Some(ItemRange {
        last: last.trim().parse().ok()?,
        total,
    })
}

fn with_trailing_slash(raw: &str) -> Result<Url, FeedError> {
    let raw = raw.trim();
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized)
        .map_err(|e| FeedError::config(format!("Invalid server URL {}: {}", raw, e)))
}

fn join(base: &Url, path: &str) -> Result<Url, FeedError> {
    base.join(path)
        .map_err(|e| FeedError::config(format!("Invalid URL {}{}: {}", base, path, e)))
}
