//! Per-run context.

use crate::config::PipelineConfig;
use crate::core::StageData;

/// Values stages reference, the run's raw input, and the map checks share.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineContext {
    /// Values `%%key` references resolve against.
    pub values: serde_json::Map<String, serde_json::Value>,
    /// Input handed to the first processing stage.
    pub input: StageData,
    /// Map handed to every check for the whole run.
    pub shared: serde_json::Map<String, serde_json::Value>,
}

impl PipelineContext {
    /// Creates a context with no values.
    #[must_use]
    pub fn new(input: StageData) -> Self {
        Self {
            values: serde_json::Map::new(),
            input,
            shared: serde_json::Map::new(),
        }
    }

    /// Seeds the values from a configuration's run identity.
    ///
    /// The raw input is a [`StageData::request`] carrying the same values as
    /// attributes.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        let values = config.context_values();
        let input = values
            .iter()
            .fold(StageData::request(), |data, (key, value)| data.with_attribute(key, value.clone()));
        Self {
            values,
            input,
            shared: serde_json::Map::new(),
        }
    }

    /// Adds or replaces a value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Replaces the raw input.
    #[must_use]
    pub fn with_input(mut self, input: StageData) -> Self {
        self.input = input;
        self
    }
}
