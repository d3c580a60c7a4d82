//! The record a monitoring stage produces.

use crate::core::QaStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics, parameters and status of one QA check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResult {
    /// Name of the check.
    #[serde(rename = "QA")]
    pub name: String,
    /// Measured values, plus the status under the check's status key.
    #[serde(rename = "METRICS", default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Configuration the check ran with.
    #[serde(rename = "PARAMS", default)]
    pub params: BTreeMap<String, serde_json::Value>,
    /// Overall status of the check.
    #[serde(rename = "STATUS", default)]
    pub status: QaStatus,
}

impl QaResult {
    /// Creates an empty result with UNKNOWN status.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: BTreeMap::new(),
            params: BTreeMap::new(),
            status: QaStatus::Unknown,
        }
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Gets a metric.
    #[must_use]
    pub fn metric(&self, key: &str) -> Option<&serde_json::Value> {
        self.metrics.get(key)
    }

    /// Reads a status previously written under `key`.
    #[must_use]
    pub fn status_of(&self, key: &str) -> Option<QaStatus> {
        self.metrics
            .get(key)
            .and_then(serde_json::Value::as_str)
            .and_then(QaStatus::parse)
    }

    /// Sets the overall status and mirrors it into `metrics[status_key]`.
    pub fn set_status(&mut self, status_key: &str, status: QaStatus) {
        self.status = status;
        self.metrics
            .insert(status_key.to_string(), serde_json::Value::String(status.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_status_mirrors_into_metrics() {
        let mut result = QaResult::new("Count_Pixels").with_metric("COUNT", 1200.0);
        result.set_status("COUNT_STATUS", QaStatus::Warning);

        assert_eq!(result.status, QaStatus::Warning);
        assert_eq!(result.metric("COUNT_STATUS"), Some(&serde_json::json!("WARNING")));
        assert_eq!(result.status_of("COUNT_STATUS"), Some(QaStatus::Warning));
    }

    #[test]
    fn test_serialized_keys() {
        let result = QaResult::new("Check_HDUs").with_param("night", "20130119");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["QA"], "Check_HDUs");
        assert_eq!(json["PARAMS"]["night"], "20130119");
        assert_eq!(json["STATUS"], "UNKNOWN");
    }
}
