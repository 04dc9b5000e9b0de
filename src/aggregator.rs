//! Concurrent execution of query batches.
//!
//! [`execute_multiple`] fans a batch of [`QueryDescriptor`]s out to the
//! Prometheus client and collects one [`AggregatedOutcome`] per descriptor.
//! A failing query only fails its own outcome. [`resolve_stored_queries`]
//! builds such a batch from stored dashboard query items and writes the
//! outcomes back into them. [`execute_submitted`] takes a batch as raw JSON
//! and decodes each descriptor on its own, so one malformed item fails alone.

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    metrics,
    models::{id_text, AggregatedOutcome, QueryDescriptor, StoredQuery},
    upstream::PrometheusApi,
};

/// Lookback window for stored `graph` queries, in seconds.
pub const GRAPH_WINDOW_SECS: i64 = 3600;
pub const GRAPH_STEP: &str = "30s";

async fn execute_one<C>(client: &C, descriptor: &QueryDescriptor) -> AggregatedOutcome
where
    C: PrometheusApi + ?Sized,
{
    let result = match descriptor.range_bounds() {
        Some((start, end)) => {
            client
                .range_query(&descriptor.query, start, end, descriptor.step.as_deref())
                .await
        }
        None => client.instant_query(&descriptor.query, None).await,
    };

    match result {
        Ok(data) => AggregatedOutcome::ok(descriptor.id.clone(), data),
        Err(e) => {
            warn!("Query {} failed: {}", descriptor.id, e);
            AggregatedOutcome::failed(descriptor.id.clone(), e.to_string())
        }
    }
}

/// Runs every descriptor concurrently and waits for all of them to settle.
///
/// Outcomes come back in input order, but callers should match them up by
/// `id`. A range descriptor without a usable `start` and `end` runs as an
/// instant query.
pub async fn execute_multiple<C>(client: &C, descriptors: &[QueryDescriptor]) -> Vec<AggregatedOutcome>
where
    C: PrometheusApi + ?Sized,
{
    if descriptors.is_empty() {
        return Vec::new();
    }

    metrics::record_batch_size(descriptors.len());
    debug!("Executing batch of {} queries", descriptors.len());

    join_all(descriptors.iter().map(|d| execute_one(client, d))).await
}

/// Decodes and runs a submitted batch. Items that do not decode into a
/// descriptor get a failed outcome; the rest run as in [`execute_multiple`].
/// Outcomes keep the order of `items`.
pub async fn execute_submitted<C>(client: &C, items: Vec<Value>) -> Vec<AggregatedOutcome>
where
    C: PrometheusApi + ?Sized,
{
    let decoded: Vec<std::result::Result<QueryDescriptor, AggregatedOutcome>> =
        items.into_iter().map(decode_descriptor).collect();
    let valid: Vec<QueryDescriptor> = decoded
        .iter()
        .filter_map(|d| d.as_ref().ok().cloned())
        .collect();

    let mut executed = execute_multiple(client, &valid).await.into_iter();
    decoded
        .into_iter()
        .filter_map(|d| match d {
            Ok(_) => executed.next(),
            Err(rejected) => Some(rejected),
        })
        .collect()
}

fn decode_descriptor(item: Value) -> std::result::Result<QueryDescriptor, AggregatedOutcome> {
    let id = id_text(item.get("id"));
    serde_json::from_value(item).map_err(|e| {
        warn!("Query {} rejected: {}", id, e);
        AggregatedOutcome::failed(id, format!("Invalid query descriptor: {}", e))
    })
}

fn stored_id(item: &StoredQuery) -> String {
    id_text(item.get("id"))
}

fn stored_str<'a>(item: &'a StoredQuery, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Builds the descriptor for a stored query item: `graph` items cover the
/// last hour at a 30s step, everything else is an instant query.
pub fn descriptor_for_stored(item: &StoredQuery, now: i64) -> QueryDescriptor {
    let id = stored_id(item);
    let query = stored_str(item, "query");

    if stored_str(item, "type") == "graph" {
        QueryDescriptor::range(
            id,
            query,
            (now - GRAPH_WINDOW_SECS) as f64,
            now as f64,
            Some(GRAPH_STEP.to_string()),
        )
    } else {
        QueryDescriptor::instant(id, query)
    }
}

/// Executes a list of stored query items and returns them enriched with
/// `result` and `error` fields. `now` is the evaluation time in unix seconds.
pub async fn resolve_stored_queries<C>(
    client: &C,
    stored: Vec<StoredQuery>,
    now: i64,
) -> Vec<StoredQuery>
where
    C: PrometheusApi + ?Sized,
{
    if stored.is_empty() {
        return stored;
    }

    let descriptors: Vec<QueryDescriptor> = stored
        .iter()
        .map(|item| descriptor_for_stored(item, now))
        .collect();
    let outcomes = execute_multiple(client, &descriptors).await;

    stored
        .into_iter()
        .map(|mut item| {
            let id = stored_id(&item);
            let outcome = outcomes.iter().find(|o| o.id == id);

            let result = outcome
                .filter(|o| o.success)
                .and_then(|o| o.data.as_ref())
                .and_then(|data| serde_json::to_value(data).ok())
                .unwrap_or(Value::Null);
            let error = outcome
                .and_then(|o| o.error.clone())
                .map(Value::String)
                .unwrap_or(Value::Null);

            item.insert("result".to_string(), result);
            item.insert("error".to_string(), error);
            item
        })
        .collect()
}
