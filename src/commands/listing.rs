//! On-demand commands: connectivity, listings and cursor reset

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::collectors::Taxii2Source;
use crate::commands::GetIndicatorsArgs;
use crate::commands::fetch::collections_to_fetch;
use crate::config::{DEFAULT_LIMIT_ERR, try_parse_integer};
use crate::error::FeedError;
use crate::models::{CONTEXT_PREFIX, CommandOutput, CommandResults, Indicator};
use crate::output::table_to_markdown;
use crate::storage::ContextStore;
use crate::timeutil::parse_date_range;

pub const RESET_MESSAGE: &str = "Fetch was reset successfully. Your next indicator fetch will collect indicators from the configured \"First Fetch Time\"";

pub fn module_test_command(source: &dyn Taxii2Source) -> Result<CommandOutput, FeedError> {
    if source.collections().is_empty() {
        return Err(FeedError::Connection("Could not connect to server".to_string()));
    }
    Ok(CommandOutput::Text("ok".to_string()))
}

/// List indicators across collections without touching the cursor
pub async fn get_indicators_command(
    source: &dyn Taxii2Source,
    args: &GetIndicatorsArgs,
    now: DateTime<Utc>,
) -> Result<CommandOutput, FeedError> {
    let mut limit = try_parse_integer(&args.limit, DEFAULT_LIMIT_ERR)?;
    let added_after = args
        .added_after
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|expr| parse_date_range(expr, now))
        .transpose()?;
    let raw = args.raw == "true";

    let mut indicators: Vec<Indicator> = vec![];
    for collection in collections_to_fetch(source)? {
        let batch = source
            .fetch_indicators(collection, limit, added_after.as_deref())
            .await?;
        let fetched = batch.indicators.len() as i64;
        indicators.extend(batch.indicators);

        if limit >= 0 {
            limit -= fetched;
            if limit <= 0 {
                break;
            }
        }
    }

    if raw {
        let payloads: Vec<Value> = indicators.into_iter().map(|i| i.raw_json).collect();
        return Ok(CommandOutput::Raw(json!({ "indicators": payloads })));
    }

    let rows: Vec<Value> = indicators
        .iter()
        .map(|i| json!({ "value": i.value, "type": i.indicator_type }))
        .collect();
    let md = format!(
        "Found {} results:\n{}",
        indicators.len(),
        table_to_markdown("", &rows, &["value", "type"])
    );

    if indicators.is_empty() {
        return Ok(CommandOutput::Text(md));
    }

    Ok(CommandOutput::Results(CommandResults {
        outputs_prefix: format!("{}.Indicators", CONTEXT_PREFIX),
        outputs_key_field: "value".to_string(),
        outputs: serde_json::to_value(&indicators)?,
        readable_output: md,
    }))
}

pub fn get_collections_command(source: &dyn Taxii2Source) -> CommandOutput {
    let collections: Vec<Value> = source
        .collections()
        .iter()
        .map(|c| json!({ "Name": c.title, "ID": c.id }))
        .collect();
    let md = table_to_markdown("TAXII2 Server Collections:", &collections, &["Name", "ID"]);

    CommandOutput::Results(CommandResults {
        outputs_prefix: format!("{}.Collections", CONTEXT_PREFIX),
        outputs_key_field: "ID".to_string(),
        outputs: Value::Array(collections),
        readable_output: md,
    })
}

pub async fn reset_fetch_command(store: &dyn ContextStore) -> Result<CommandOutput, FeedError> {
    store.clear().await?;
    tracing::info!("Fetch cursor cleared");
    Ok(CommandOutput::Text(RESET_MESSAGE.to_string()))
}
