//! Core data models for the TAXII 2 feed

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod ioc_utils;

/// Namespace under which command outputs are published
pub const CONTEXT_PREFIX: &str = "TAXII2";

/// Indicator types produced from STIX patterns
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    #[serde(rename = "IP")]
    Ip,
    #[serde(rename = "CIDR")]
    Cidr,
    #[serde(rename = "IPv6")]
    Ipv6,
    #[serde(rename = "IPv6CIDR")]
    Ipv6Cidr,
    Domain,
    #[serde(rename = "URL")]
    Url,
    Email,
    File,
}

impl IndicatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorType::Ip => "IP",
            IndicatorType::Cidr => "CIDR",
            IndicatorType::Ipv6 => "IPv6",
            IndicatorType::Ipv6Cidr => "IPv6CIDR",
            IndicatorType::Domain => "Domain",
            IndicatorType::Url => "URL",
            IndicatorType::Email => "Email",
            IndicatorType::File => "File",
        }
    }
}

impl std::fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A TAXII collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub can_read: bool,
}

fn default_true() -> bool {
    true
}

impl Collection {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            can_read: true,
        }
    }
}

/// Indicator in the indicator-database shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Indicator {
    pub value: String,
    #[serde(rename = "type")]
    pub indicator_type: IndicatorType,
    #[serde(rename = "rawJSON")]
    pub raw_json: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// Indicators pulled from one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedBatch {
    pub indicators: Vec<Indicator>,
    /// `created` of the newest indicator in the batch, verbatim from the server
    pub latest_created: Option<String>,
}

/// Per-collection `added_after` cursor persisted between fetch cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorContext(BTreeMap<String, String>);

impl CursorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection_id: &str) -> Option<&str> {
        self.0.get(collection_id).map(String::as_str)
    }

    pub fn set(&mut self, collection_id: impl Into<String>, added_after: impl Into<String>) {
        self.0.insert(collection_id.into(), added_after.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CursorContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Structured command result: readable table plus context outputs
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandResults {
    pub outputs_prefix: String,
    pub outputs_key_field: String,
    pub outputs: Value,
    pub readable_output: String,
}

/// What a command hands back to the host
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Plain status string or markdown
    Text(String),
    /// Raw payloads, no shaping
    Raw(Value),
    Results(CommandResults),
}

impl CommandOutput {
    /// Human-readable rendering
    pub fn readable(&self) -> String {
        match self {
            CommandOutput::Text(text) => text.clone(),
            CommandOutput::Raw(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            CommandOutput::Results(results) => results.readable_output.clone(),
        }
    }

    /// JSON rendering
    pub fn to_json(&self) -> Value {
        match self {
            CommandOutput::Text(text) => Value::String(text.clone()),
            CommandOutput::Raw(value) => value.clone(),
            CommandOutput::Results(results) => {
                serde_json::to_value(results).unwrap_or(Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cursor_serializes_as_plain_object() {
        let ctx: CursorContext = [("col-1", "2024-01-01T00:00:00Z")].into_iter().collect();
        assert_eq!(
            serde_json::to_value(&ctx).unwrap(),
            json!({"col-1": "2024-01-01T00:00:00Z"})
        );

        let back: CursorContext =
            serde_json::from_value(json!({"col-2": "2024-02-01T00:00:00Z"})).unwrap();
        assert_eq!(back.get("col-2"), Some("2024-02-01T00:00:00Z"));
        assert_eq!(back.get("col-1"), None);
    }

    #[test]
    fn indicator_uses_platform_field_names() {
        let indicator = Indicator {
            value: "1.2.3.4".into(),
            indicator_type: IndicatorType::Ip,
            raw_json: json!({"id": "indicator--1"}),
            fields: Map::new(),
        };
        let value = serde_json::to_value(&indicator).unwrap();
        assert_eq!(value["type"], "IP");
        assert_eq!(value["rawJSON"]["id"], "indicator--1");
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn collection_defaults_to_readable() {
        let coll: Collection = serde_json::from_value(json!({"id": "c1", "title": "T"})).unwrap();
        assert!(coll.can_read);
    }
}
