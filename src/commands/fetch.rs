//! Fetch cycle: pull every collection past its cursor

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::collectors::Taxii2Source;
use crate::error::FeedError;
use crate::models::{Collection, CursorContext, Indicator};
use crate::storage::{ContextStore, INDICATOR_BATCH_SIZE, IndicatorSink};
use crate::timeutil::parse_date_range;

/// Collections a cycle walks: the pinned one, or every known collection
pub(crate) fn collections_to_fetch(source: &dyn Taxii2Source) -> Result<&[Collection], FeedError> {
    if let Some(pinned) = source.collection_to_fetch() {
        return Ok(std::slice::from_ref(pinned));
    }
    let collections = source.collections();
    if collections.is_empty() {
        return Err(FeedError::NoCollections);
    }
    Ok(collections)
}

/// One fetch cycle.
///
/// Each collection is fetched from its cursor in `last_run`, or from
/// `initial_interval` before `now` when it has none. A negative `limit`
/// means no limit; otherwise the cycle stops once `limit` indicators were
/// collected. The returned cursor holds, per visited collection, the newest
/// `created` time fetched, or the `added_after` that was requested when the
/// collection returned nothing.
pub async fn fetch_indicators_command(
    source: &dyn Taxii2Source,
    initial_interval: &str,
    mut limit: i64,
    mut last_run: CursorContext,
    now: DateTime<Utc>,
) -> Result<(Vec<Indicator>, CursorContext), FeedError> {
    let initial_added_after = parse_date_range(initial_interval, now)?;
    let collections = collections_to_fetch(source)?;
    let mut indicators = vec![];

    for collection in collections {
        let added_after = last_run
            .get(&collection.id)
            .map(str::to_string)
            .unwrap_or_else(|| initial_added_after.clone());
        debug!(collection = %collection.id, %added_after, limit, "Fetching collection");

        let batch = source
            .fetch_indicators(collection, limit, Some(added_after.as_str()))
            .await?;
        let fetched = batch.indicators.len() as i64;

        last_run.set(
            collection.id.clone(),
            batch.latest_created.unwrap_or(added_after),
        );
        indicators.extend(batch.indicators);

        if limit >= 0 {
            limit -= fetched;
            if limit <= 0 {
                break;
            }
        }
    }

    Ok((indicators, last_run))
}

/// Load the cursor, run a cycle, deliver the indicators, then persist the cursor
pub async fn run_fetch_cycle(
    source: &dyn Taxii2Source,
    store: &dyn ContextStore,
    sink: &dyn IndicatorSink,
    initial_interval: &str,
    limit: i64,
) -> Result<usize, FeedError> {
    let last_run = store.load().await?;
    let (indicators, last_run) =
        fetch_indicators_command(source, initial_interval, limit, last_run, Utc::now()).await?;

    let mut created = 0;
    for batch in indicators.chunks(INDICATOR_BATCH_SIZE) {
        created += sink.create_indicators(batch).await?;
    }
    store.save(&last_run).await?;

    info!(
        indicators = created,
        collections = last_run.len(),
        "Fetch cycle complete"
    );
    Ok(created)
}
