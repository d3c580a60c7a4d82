//! Scalar/series metric values.

use serde::{Deserialize, Serialize};

/// A QA metric or reference value.
///
/// In JSON a scalar is a number and a series is an array of numbers. A `null`
/// inside an array stands for NaN, since that is how `serde_json` writes a
/// NaN float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// A single number.
    Scalar(f64),
    /// An ordered sequence of numbers.
    Series(Vec<f64>),
}

impl MetricValue {
    /// Interprets a JSON value as a metric.
    ///
    /// Returns `None` for anything that is not a number or an array of
    /// numbers/nulls. Numeric strings are accepted, since some QA writers
    /// stringify their results.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Self::Scalar),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(Self::Scalar),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::Null => Some(f64::NAN),
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::Series),
            _ => None,
        }
    }

    /// Converts to JSON, NaN elements becoming `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(v) => serde_json::json!(v),
            Self::Series(values) => serde_json::json!(values),
        }
    }

    /// Number of elements (1 for a scalar).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Series(values) => values.len(),
        }
    }

    /// Returns true for an empty series.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Series(values) if values.is_empty())
    }

    /// Returns true if this is a series.
    #[must_use]
    pub fn is_series(&self) -> bool {
        matches!(self, Self::Series(_))
    }

    /// The elements as a slice-like vector.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::Series(values) => values.clone(),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Series(values)
    }
}
