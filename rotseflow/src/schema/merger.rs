//! Accumulating QA output into step records.

use crate::errors::RotseflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Which block of a step record to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// The `METRICS` block.
    Metrics,
    /// The `PARAMS` block.
    Params,
}

/// Parameters and metrics of one pipeline step.
///
/// Fields are declared in key order so the serialized form is sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Metrics reported for the step.
    #[serde(rename = "METRICS", default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Parameters the step's checks ran with.
    #[serde(rename = "PARAMS", default)]
    pub params: BTreeMap<String, serde_json::Value>,
    /// Uppercased step name.
    #[serde(rename = "PIPELINE_STEP")]
    pub step: String,
}

impl StepRecord {
    /// Creates an empty record; the name is uppercased.
    #[must_use]
    pub fn new(step: &str) -> Self {
        Self {
            step: step.to_uppercase(),
            ..Self::default()
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut BTreeMap<String, serde_json::Value> {
        match section {
            Section::Metrics => &mut self.metrics,
            Section::Params => &mut self.params,
        }
    }
}

/// Write access to one record while it is being filled.
#[derive(Debug)]
pub struct StepHandle<'a> {
    record: &'a mut StepRecord,
}

impl StepHandle<'_> {
    /// Merges parameters into the record; later keys overwrite earlier ones.
    pub fn add_params<I>(&mut self, params: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        self.record.params.extend(params);
        self
    }

    /// Merges metrics into the record; later keys overwrite earlier ones.
    pub fn add_metrics<I>(&mut self, metrics: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        self.record.metrics.extend(metrics);
        self
    }

    /// The record's step name.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.record.step
    }
}

/// Ordered step records of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSchema {
    #[serde(rename = "PIPELINE_STEPS")]
    steps: Vec<StepRecord>,
}

impl PipelineSchema {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record for `name` and returns a handle to fill it.
    pub fn add_step(&mut self, name: &str) -> StepHandle<'_> {
        debug!(step = %name, "Adding pipeline step to schema");
        self.steps.push(StepRecord::new(name));
        let index = self.steps.len() - 1;
        StepHandle {
            record: &mut self.steps[index],
        }
    }

    /// Handle to the last record named `name`, if any.
    pub fn step_mut(&mut self, name: &str) -> Option<StepHandle<'_>> {
        let key = name.to_uppercase();
        self.steps
            .iter_mut()
            .rev()
            .find(|record| record.step == key)
            .map(|record| StepHandle { record })
    }

    /// The record named `name`, if any.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        let key = name.to_uppercase();
        self.steps.iter().rev().find(|record| record.step == key)
    }

    /// All records in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Removes every record named `name`. Returns true if any was removed.
    pub fn remove_step(&mut self, name: &str) -> bool {
        let key = name.to_uppercase();
        let before = self.steps.len();
        self.steps.retain(|record| record.step != key);
        before != self.steps.len()
    }

    /// Renames a record in place, keeping its data and position.
    ///
    /// Returns false if no record is named `old`.
    pub fn rename_step(&mut self, old: &str, new: &str) -> bool {
        let key = old.to_uppercase();
        match self.steps.iter_mut().find(|record| record.step == key) {
            Some(record) => {
                record.step = new.to_uppercase();
                true
            }
            None => false,
        }
    }

    /// Moves `keys` of `section` from one record to another.
    ///
    /// Nothing moves unless both records exist; keys absent from the source
    /// are skipped. Returns the number of keys moved.
    pub fn transfer_keys(&mut self, section: Section, from: &str, to: &str, keys: &[&str]) -> usize {
        let (from_key, to_key) = (from.to_uppercase(), to.to_uppercase());
        let from_index = self.steps.iter().position(|r| r.step == from_key);
        let to_index = self.steps.iter().position(|r| r.step == to_key);
        let (Some(from_index), Some(to_index)) = (from_index, to_index) else {
            warn!(from = %from, to = %to, "Can't transfer keys, step missing");
            return 0;
        };
        if from_index == to_index {
            return 0;
        }

        let moved: Vec<(String, serde_json::Value)> = {
            let source = self.steps[from_index].section_mut(section);
            keys.iter()
                .filter_map(|key| source.remove_entry(*key))
                .collect()
        };
        let count = moved.len();
        self.steps[to_index].section_mut(section).extend(moved);
        count
    }

    /// Serializes with sorted keys and 4-space indentation.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a value cannot be written.
    pub fn to_json_string(&self) -> Result<String, RotseflowError> {
        super::to_sorted_json(self)
    }

    /// Writes [`Self::to_json_string`] to `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<(), RotseflowError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)?;
        debug!(path = %path.display(), "Wrote merged QA file");
        Ok(())
    }

    /// Rebuilds a document from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed input.
    pub fn from_json_str(json: &str) -> Result<Self, RotseflowError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn metrics(pairs: &[(&str, serde_json::Value)]) -> Vec<(String, serde_json::Value)> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_add_step_merges_destructively() {
        let mut schema = PipelineSchema::new();
        schema
            .add_step("Coaddition")
            .add_metrics(metrics(&[("COUNT", serde_json::json!(1100.0))]))
            .add_metrics(metrics(&[("COUNT", serde_json::json!(1200.0))]))
            .add_params(metrics(&[("COUNT_REF", serde_json::json!([1100.0]))]));

        let record = schema.step("coaddition").unwrap();
        assert_eq!(record.step, "COADDITION");
        assert_eq!(record.metrics["COUNT"], serde_json::json!(1200.0));
        assert_eq!(record.params.len(), 1);
    }

    #[test]
    fn test_rename_and_remove() {
        let mut schema = PipelineSchema::new();
        schema.add_step("Find_Data").add_metrics(metrics(&[("NIMAGES", serde_json::json!(12))]));
        schema.add_step("Coaddition");

        assert!(schema.rename_step("Find_Data", "Preproc"));
        assert_eq!(schema.steps()[0].step, "PREPROC");
        assert_eq!(schema.steps()[0].metrics["NIMAGES"], serde_json::json!(12));

        assert!(schema.remove_step("Coaddition"));
        assert!(!schema.remove_step("Coaddition"));
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn test_transfer_keys_requires_both_steps() {
        let mut schema = PipelineSchema::new();
        schema
            .add_step("Find_Data")
            .add_metrics(metrics(&[("EXPNUM", serde_json::json!([1, 2])), ("NIMAGES", serde_json::json!(2))]));
        schema.add_step("Coaddition");

        assert_eq!(schema.transfer_keys(Section::Metrics, "Find_Data", "Photometry", &["EXPNUM"]), 0);
        assert_eq!(
            schema.transfer_keys(Section::Metrics, "Find_Data", "Coaddition", &["EXPNUM", "MISSING"]),
            1
        );

        assert!(!schema.steps()[0].metrics.contains_key("EXPNUM"));
        assert_eq!(schema.steps()[1].metrics["EXPNUM"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_json_layout_sorted_and_indented() {
        let mut schema = PipelineSchema::new();
        schema.add_step("Coaddition").add_metrics(metrics(&[
            ("NCOADD", serde_json::json!(2)),
            ("COUNT", serde_json::json!(1.5)),
        ]));

        let json = schema.to_json_string().unwrap();
        let expected = r#"{
    "PIPELINE_STEPS": [
        {
            "METRICS": {
                "COUNT": 1.5,
                "NCOADD": 2
            },
            "PARAMS": {},
            "PIPELINE_STEP": "COADDITION"
        }
    ]
}"#;
        assert_eq!(json, expected);
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let mut schema = PipelineSchema::new();
        for step in ["Find_Data", "Coaddition", "Source_Extraction"] {
            schema
                .add_step(step)
                .add_params(metrics(&[("night", serde_json::json!("070810"))]));
        }

        let path = tempfile::NamedTempFile::new().unwrap();
        schema.write_json_file(path.path()).unwrap();
        let text = std::fs::read_to_string(path.path()).unwrap();

        assert_eq!(PipelineSchema::from_json_str(&text).unwrap(), schema);
    }
}
