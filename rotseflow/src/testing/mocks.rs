//! Mock stages and heartbeats for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::StageArgs;
use crate::core::{Capability, StageData};
use crate::errors::{ExecutionError, RotseflowError};
use crate::pipeline::Heartbeat;
use crate::qa::QaResult;
use crate::stages::{MonitorInput, MonitoringStage, ProcessingStage};

/// A processing stage that records calls and passes its input through.
///
/// The output is the input converted to the declared output capability,
/// with any configured metrics attached.
#[derive(Debug)]
pub struct MockProcessingStage {
    name: String,
    input: Capability,
    output: Capability,
    metrics: Mutex<serde_json::Map<String, serde_json::Value>>,
    failure: Mutex<Option<String>>,
    calls: Mutex<Vec<StageArgs>>,
}

impl MockProcessingStage {
    /// Creates a mock consuming `input` and producing `output`.
    #[must_use]
    pub fn new(name: impl Into<String>, input: Capability, output: Capability) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            metrics: Mutex::new(serde_json::Map::new()),
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Attaches a metric to every output.
    #[must_use]
    pub fn with_metric(self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.lock().insert(key.into(), value.into());
        self
    }

    /// Makes every run fail with `message`.
    #[must_use]
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.failure.lock() = Some(message.into());
        self
    }

    /// Number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Arguments of each run, in order.
    #[must_use]
    pub fn recorded_args(&self) -> Vec<StageArgs> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProcessingStage for MockProcessingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        self.input
    }

    fn output_capability(&self) -> Capability {
        self.output
    }

    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        self.calls.lock().push(args.clone());
        if let Some(message) = self.failure.lock().clone() {
            return Err(ExecutionError::new(&self.name, message).into());
        }
        let metrics = self.metrics.lock().clone();
        Ok(metrics
            .into_iter()
            .fold(input.clone().into_capability(self.output), |data, (key, value)| {
                data.with_metric(key, value)
            }))
    }
}

/// A check that returns configured metrics and records what it saw.
#[derive(Debug)]
pub struct MockMonitoringStage {
    name: String,
    input: Capability,
    metrics: Mutex<serde_json::Map<String, serde_json::Value>>,
    failure: Mutex<Option<String>>,
    seen: Mutex<Vec<Capability>>,
}

impl MockMonitoringStage {
    /// Creates a mock check inspecting `input`.
    #[must_use]
    pub fn new(name: impl Into<String>, input: Capability) -> Self {
        Self {
            name: name.into(),
            input,
            metrics: Mutex::new(serde_json::Map::new()),
            failure: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Adds a metric to every result.
    #[must_use]
    pub fn with_metric(self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.lock().insert(key.into(), value.into());
        self
    }

    /// Makes every run fail with `message`.
    #[must_use]
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.failure.lock() = Some(message.into());
        self
    }

    /// Capabilities of the data each run inspected.
    #[must_use]
    pub fn seen(&self) -> Vec<Capability> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl MonitoringStage for MockMonitoringStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        self.input
    }

    async fn run(&self, input: MonitorInput<'_>, args: &StageArgs) -> Result<QaResult, RotseflowError> {
        self.seen.lock().push(input.current.capability);
        input
            .shared
            .insert(format!("seen_by_{}", self.name), serde_json::Value::Bool(true));
        if let Some(message) = self.failure.lock().clone() {
            return Err(ExecutionError::new(&self.name, message).into());
        }

        let mut result = QaResult::new(&self.name);
        result.metrics.extend(self.metrics.lock().clone());
        result.params.extend(args.as_map().clone());
        Ok(result)
    }
}

/// A heartbeat that records every label it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordingHeartbeat {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingHeartbeat {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events as `start:<label>` or `stop:<label>`.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl Heartbeat for RecordingHeartbeat {
    fn start(&self, label: &str) {
        self.events.lock().push(format!("start:{label}"));
    }

    fn stop(&self, label: &str) {
        self.events.lock().push(format!("stop:{label}"));
    }
}
