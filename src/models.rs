use std::collections::BTreeMap;

use serde::{ser::SerializeStruct, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Label set of a single series, ordered by label name.
pub type LabelSet = BTreeMap<String, String>;

/// A query item as stored in the global config or a UA page. Kept as a raw
/// JSON object so unknown fields and their order survive enrichment.
pub type StoredQuery = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Range,
    #[default]
    #[serde(other)]
    Instant,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    pub query: String,
    #[serde(rename = "type", default)]
    pub kind: QueryKind,
    #[serde(default, deserialize_with = "de_opt_seconds", skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_seconds", skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl QueryDescriptor {
    pub fn instant(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn range(
        id: impl Into<String>,
        query: impl Into<String>,
        start: f64,
        end: f64,
        step: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            kind: QueryKind::Range,
            start: Some(start),
            end: Some(end),
            step,
        }
    }

    /// Bounds used for a range evaluation. A range descriptor with a missing,
    /// zero or NaN bound yields `None` and is evaluated as an instant query.
    pub fn range_bounds(&self) -> Option<(f64, f64)> {
        let truthy = |v: Option<f64>| v.filter(|v| *v != 0.0 && !v.is_nan());
        match self.kind {
            QueryKind::Range => Some((truthy(self.start)?, truthy(self.end)?)),
            QueryKind::Instant => None,
        }
    }
}

/// Text form of a JSON id. Numeric ids are stringified, `null` is empty.
pub fn id_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn de_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        value @ (Value::String(_) | Value::Number(_) | Value::Null) => Ok(id_text(Some(&value))),
        other => Err(serde::de::Error::custom(format!(
            "id must be a string or a number, got {}",
            other
        ))),
    }
}

/// Treats an explicit `null` like a missing field.
fn de_null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn de_opt_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(f64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Seconds::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorSample {
    #[serde(rename = "metric")]
    pub labels: LabelSet,
    pub value: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplePoint {
    #[serde(rename = "timestamp")]
    pub timestamp_seconds: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixSeries {
    #[serde(rename = "metric")]
    pub labels: LabelSet,
    #[serde(rename = "values")]
    pub samples: Vec<SamplePoint>,
}

/// A normalized Prometheus result. Produced once by the normalizer so that
/// nothing downstream has to inspect `resultType` again.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Vector(Vec<VectorSample>),
    Scalar { value: f64, timestamp_seconds: f64 },
    Matrix(Vec<MatrixSeries>),
    Raw(Value),
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            QueryResult::Vector(results) => {
                let mut s = serializer.serialize_struct("QueryResult", 2)?;
                s.serialize_field("type", "vector")?;
                s.serialize_field("results", results)?;
                s.end()
            }
            QueryResult::Scalar {
                value,
                timestamp_seconds,
            } => {
                let mut s = serializer.serialize_struct("QueryResult", 3)?;
                s.serialize_field("type", "scalar")?;
                s.serialize_field("value", value)?;
                s.serialize_field("timestamp", timestamp_seconds)?;
                s.end()
            }
            QueryResult::Matrix(results) => {
                let mut s = serializer.serialize_struct("QueryResult", 2)?;
                s.serialize_field("type", "matrix")?;
                s.serialize_field("results", results)?;
                s.end()
            }
            QueryResult::Raw(raw) => raw.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedOutcome {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregatedOutcome {
    pub fn ok(id: String, data: QueryResult) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(id: String, error: String) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UaPage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "metrics", alias = "metricsEnabled", default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(rename = "prometheusQueries", default, deserialize_with = "de_null_as_default")]
    pub prometheus_queries: Vec<StoredQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UaIndex {
    pub uas: Vec<String>,
    #[serde(rename = "lastUpdate")]
    pub last_update: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GlobalQueries {
    #[serde(default, deserialize_with = "de_null_as_default")]
    pub queries: Vec<StoredQuery>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_kind_defaults_to_instant() {
        let d: QueryDescriptor = serde_json::from_value(json!({
            "id": "cpu", "query": "up", "type": "gauge"
        }))
        .unwrap();
        assert_eq!(d.kind, QueryKind::Instant);

        let d: QueryDescriptor = serde_json::from_value(json!({ "id": "a", "query": "up" })).unwrap();
        assert_eq!(d.kind, QueryKind::Instant);
    }

    #[test]
    fn test_descriptor_accepts_string_bounds() {
        let d: QueryDescriptor = serde_json::from_value(json!({
            "id": "a", "query": "up", "type": "range", "start": "100", "end": 200
        }))
        .unwrap();
        assert_eq!(d.range_bounds(), Some((100.0, 200.0)));
    }

    #[test]
    fn test_range_bounds_require_truthy_start_and_end() {
        let mut d = QueryDescriptor::range("a", "up", 100.0, 200.0, None);
        assert_eq!(d.range_bounds(), Some((100.0, 200.0)));

        d.end = None;
        assert_eq!(d.range_bounds(), None);

        d.end = Some(200.0);
        d.start = Some(0.0);
        assert_eq!(d.range_bounds(), None);

        // A bound sent as the text "0" parses to zero and is treated the same.
        let d: QueryDescriptor = serde_json::from_value(json!({
            "id": "a", "query": "up", "type": "range", "start": "0", "end": "200"
        }))
        .unwrap();
        assert_eq!(d.range_bounds(), None);
    }

    #[test]
    fn test_descriptor_ids() {
        let d: QueryDescriptor = serde_json::from_value(json!({ "id": 2, "query": "up" })).unwrap();
        assert_eq!(d.id, "2");

        let err = serde_json::from_value::<QueryDescriptor>(json!({ "id": [1], "query": "up" }));
        assert!(err.is_err());
        assert_eq!(id_text(Some(&json!(null))), "");
    }

    #[test]
    fn test_query_result_wire_shape() {
        let result = QueryResult::Vector(vec![VectorSample {
            labels: LabelSet::from([("job".to_string(), "api".to_string())]),
            value: 1.5,
            timestamp_seconds: 10.0,
        }]);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "type": "vector",
                "results": [{ "metric": { "job": "api" }, "value": 1.5, "timestamp": 10.0 }]
            })
        );

        let raw = json!({ "resultType": "string", "result": [1, "x"] });
        assert_eq!(serde_json::to_value(QueryResult::Raw(raw.clone())).unwrap(), raw);
    }

    #[test]
    fn test_page_metrics_flag() {
        let page: UaPage = serde_json::from_value(json!({
            "title": "T", "content": "C", "metricsEnabled": false
        }))
        .unwrap();
        assert!(!page.metrics_enabled);
        assert!(page.prometheus_queries.is_empty());

        let page: UaPage = serde_json::from_value(json!({ "title": "T", "content": "C" })).unwrap();
        assert!(page.metrics_enabled);
        assert_eq!(serde_json::to_value(&page).unwrap()["metrics"], json!(true));
    }

    #[test]
    fn test_null_query_lists_read_as_empty() {
        let page: UaPage = serde_json::from_value(json!({
            "title": "L", "content": "c", "metrics": true, "prometheusQueries": null
        }))
        .unwrap();
        assert!(page.prometheus_queries.is_empty());

        let global: GlobalQueries = serde_json::from_value(json!({ "queries": null })).unwrap();
        assert!(global.queries.is_empty());
    }
}
