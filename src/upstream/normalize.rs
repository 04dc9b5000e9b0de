//! Conversion of Prometheus `data` objects into [`QueryResult`].
//!
//! Both entry points are pure: they look at `resultType`, transform the shapes
//! they know about and hand anything else back untouched as
//! [`QueryResult::Raw`].

use serde::Deserialize;
use serde_json::Value;

use crate::{
    models::{LabelSet, MatrixSeries, QueryResult, SamplePoint, VectorSample},
    DashboardError, Result,
};

#[derive(Deserialize)]
struct RawInstantSample {
    #[serde(default)]
    metric: LabelSet,
    value: (f64, String),
}

#[derive(Deserialize)]
struct RawSeries {
    #[serde(default)]
    metric: LabelSet,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Parses a sample value the way Prometheus encodes it. Anything that is not
/// a number becomes NaN.
pub fn parse_sample_value(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn result_type(data: &Value) -> Option<&str> {
    data.get("resultType").and_then(Value::as_str)
}

fn result_field(data: &Value) -> &Value {
    data.get("result").unwrap_or(&Value::Null)
}

fn malformed(kind: &str, err: serde_json::Error) -> DashboardError {
    DashboardError::Upstream(format!("malformed {} result: {}", kind, err))
}

/// Normalizes the `data` object of an instant query response.
pub fn normalize_instant(data: Value) -> Result<QueryResult> {
    match result_type(&data) {
        Some("vector") => {
            let samples = Vec::<RawInstantSample>::deserialize(result_field(&data))
                .map_err(|e| malformed("vector", e))?;
            Ok(QueryResult::Vector(
                samples
                    .into_iter()
                    .map(|s| VectorSample {
                        labels: s.metric,
                        value: parse_sample_value(&s.value.1),
                        timestamp_seconds: s.value.0,
                    })
                    .collect(),
            ))
        }
        Some("scalar") => {
            let (timestamp_seconds, value) = <(f64, String)>::deserialize(result_field(&data))
                .map_err(|e| malformed("scalar", e))?;
            Ok(QueryResult::Scalar {
                value: parse_sample_value(&value),
                timestamp_seconds,
            })
        }
        _ => Ok(QueryResult::Raw(data)),
    }
}

/// Normalizes the `data` object of a range query response.
pub fn normalize_range(data: Value) -> Result<QueryResult> {
    match result_type(&data) {
        Some("matrix") => {
            let series = Vec::<RawSeries>::deserialize(result_field(&data))
                .map_err(|e| malformed("matrix", e))?;
            Ok(QueryResult::Matrix(
                series
                    .into_iter()
                    .map(|s| MatrixSeries {
                        labels: s.metric,
                        samples: s
                            .values
                            .into_iter()
                            .map(|(timestamp_seconds, value)| SamplePoint {
                                timestamp_seconds,
                                value: parse_sample_value(&value),
                            })
                            .collect(),
                    })
                    .collect(),
            ))
        }
        _ => Ok(QueryResult::Raw(data)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_vector_normalization() {
        let data = json!({
            "resultType": "vector",
            "result": [
                { "metric": { "__name__": "up", "job": "prometheus" }, "value": [1435781451.781, "1"] },
                { "metric": { "__name__": "up", "job": "node" }, "value": [1435781451.781, "0"] },
                { "metric": {}, "value": [1435781451.781, "not-a-number"] }
            ]
        });

        let QueryResult::Vector(samples) = normalize_instant(data).unwrap() else {
            panic!("expected vector");
        };
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[0].timestamp_seconds, 1435781451.781);
        assert_eq!(samples[0].labels.get("job").map(String::as_str), Some("prometheus"));
        assert_eq!(samples[1].value, 0.0);
        assert!(samples[2].value.is_nan());
        assert!(samples[2].labels.is_empty());
    }

    #[test]
    fn test_empty_vector() {
        let data = json!({ "resultType": "vector", "result": [] });
        assert_eq!(normalize_instant(data).unwrap(), QueryResult::Vector(vec![]));
    }

    #[test]
    fn test_scalar_normalization() {
        let data = json!({ "resultType": "scalar", "result": [1700000000, "42.5"] });
        assert_eq!(
            normalize_instant(data).unwrap(),
            QueryResult::Scalar {
                value: 42.5,
                timestamp_seconds: 1700000000.0
            }
        );
    }

    #[test]
    fn test_special_float_values() {
        assert_eq!(parse_sample_value("+Inf"), f64::INFINITY);
        assert_eq!(parse_sample_value("-Inf"), f64::NEG_INFINITY);
        assert!(parse_sample_value("NaN").is_nan());
        assert_eq!(parse_sample_value("1e3"), 1000.0);
    }

    #[test]
    fn test_matrix_preserves_order_and_count() {
        let data = json!({
            "resultType": "matrix",
            "result": [
                {
                    "metric": { "instance": "a" },
                    "values": [[100, "1"], [130, "2"], [160, "3"]]
                },
                {
                    "metric": { "instance": "b" },
                    "values": [[100, "9"]]
                }
            ]
        });

        let QueryResult::Matrix(series) = normalize_range(data).unwrap() else {
            panic!("expected matrix");
        };
        assert_eq!(series.len(), 2);
        assert_eq!(
            series[0].samples,
            vec![
                SamplePoint { timestamp_seconds: 100.0, value: 1.0 },
                SamplePoint { timestamp_seconds: 130.0, value: 2.0 },
                SamplePoint { timestamp_seconds: 160.0, value: 3.0 },
            ]
        );
        assert_eq!(series[1].samples.len(), 1);
        assert_eq!(series[1].labels.get("instance").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_unknown_shapes_pass_through() {
        let string_result = json!({ "resultType": "string", "result": [1, "hello"] });
        assert_eq!(
            normalize_instant(string_result.clone()).unwrap(),
            QueryResult::Raw(string_result)
        );

        // A matrix answered on the instant path is not transformed.
        let matrix = json!({ "resultType": "matrix", "result": [] });
        assert_eq!(
            normalize_instant(matrix.clone()).unwrap(),
            QueryResult::Raw(matrix)
        );

        let vector = json!({ "resultType": "vector", "result": [] });
        assert_eq!(normalize_range(vector.clone()).unwrap(), QueryResult::Raw(vector));
    }

    #[test]
    fn test_malformed_known_shape_is_an_error() {
        let data = json!({ "resultType": "vector", "result": { "oops": true } });
        let err = normalize_instant(data).unwrap_err();
        assert!(matches!(err, DashboardError::Upstream(_)));
        assert!(err.to_string().contains("malformed vector result"));
    }
}
