//! Data passed between processing stages.

use super::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The value flowing from one processing stage to the next.
///
/// The heavy lifting happens in external tools, so a stage's output is a set
/// of files on disk plus whatever scalar facts the tools reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageData {
    /// What kind of data this is.
    pub capability: Capability,
    /// Image files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PathBuf>,
    /// Product files (catalogs, light curve tables, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<PathBuf>,
    /// Facts reported by the producing stage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Metrics merged into the producing step's record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl StageData {
    /// Creates empty data with the given capability.
    #[must_use]
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            images: Vec::new(),
            products: Vec::new(),
            attributes: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// The raw run request that starts a pipeline.
    #[must_use]
    pub fn request() -> Self {
        Self::new(Capability::Request)
    }

    /// Sets the image files.
    #[must_use]
    pub fn with_images(mut self, images: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the product files.
    #[must_use]
    pub fn with_products(mut self, products: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Re-tags the data, keeping files and attributes.
    #[must_use]
    pub fn into_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self.metrics.clear();
        self
    }

    /// Gets an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let data = StageData::new(Capability::Images)
            .with_images(["a_c.fit", "b_c.fit"])
            .with_products(["a_cobj.fit"])
            .with_attribute("field", serde_json::json!("sks0246+3652"));

        assert_eq!(data.images.len(), 2);
        assert_eq!(data.products, vec![PathBuf::from("a_cobj.fit")]);
        assert_eq!(data.attribute("field"), Some(&serde_json::json!("sks0246+3652")));
    }

    #[test]
    fn test_into_capability_drops_metrics() {
        let data = StageData::new(Capability::Coadds)
            .with_images(["c.fit"])
            .with_metric("NCOADD", serde_json::json!(1))
            .into_capability(Capability::Catalogs);

        assert_eq!(data.capability, Capability::Catalogs);
        assert_eq!(data.images.len(), 1);
        assert!(data.metrics.is_empty());
    }

    #[test]
    fn test_serialization_skips_empty() {
        let json = serde_json::to_value(StageData::request()).unwrap();
        assert_eq!(json, serde_json::json!({"capability": "request"}));
    }
}
