//! The full pipeline configuration document.

use super::kwargs::KwArgs;
use crate::errors::{ConfigurationError, RotseflowError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Heartbeat timeouts above this many seconds are suspicious.
pub const LONG_TIMEOUT_SECS: f64 = 200.0;

/// The night or range of nights a run covers.
///
/// Written in YAML as a single night (`20130119` or `"070810"`) or a
/// `[first, last]` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nights {
    /// First night.
    pub first: String,
    /// Last night; equal to `first` for a single night.
    pub last: String,
}

impl Nights {
    /// A single night.
    #[must_use]
    pub fn single(night: impl Into<String>) -> Self {
        let night = night.into();
        Self {
            first: night.clone(),
            last: night,
        }
    }

    /// A range of nights.
    #[must_use]
    pub fn range(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            last: last.into(),
        }
    }

    /// Returns true for a single night.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.first == self.last
    }

    /// The JSON form handed to stages through the context mapping.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        if self.is_single() {
            serde_json::Value::String(self.first.clone())
        } else {
            serde_json::json!([self.first, self.last])
        }
    }

    /// Reads a night or `[first, last]` pair from JSON.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Array(items) => match items.as_slice() {
                [night] => scalar_to_string(night).map(Self::single),
                [first, last] => Some(Self::range(scalar_to_string(first)?, scalar_to_string(last)?)),
                _ => None,
            },
            other => scalar_to_string(other).map(Self::single),
        }
    }
}

impl Serialize for Nights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Nights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_value(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("Night must be a night or a [first, last] pair, got {value}"))
        })
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn de_opt_scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected a string or number, got {value}"))),
    }
}

/// Reference to a stage implementation plus its keyword arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Implementation name within the module namespace.
    #[serde(rename = "ClassName")]
    pub class_name: String,
    /// Module namespace, e.g. `rotseflow.pa`.
    #[serde(rename = "ModuleName")]
    pub module_name: String,
    /// Instance name; defaults to the class name.
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: KwArgs,
}

impl StageConfig {
    /// Creates a stage config with no keyword arguments.
    #[must_use]
    pub fn new(module_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            module_name: module_name.into(),
            name: None,
            kwargs: KwArgs::new(),
        }
    }

    /// Sets the keyword arguments.
    #[must_use]
    pub fn with_kwargs(mut self, kwargs: KwArgs) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Sets the instance name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The instance name, falling back to the class name when unset or blank.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.class_name)
    }
}

/// One step: a processing stage and the checks run on its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// The processing stage.
    #[serde(rename = "PA")]
    pub pa: StageConfig,
    /// Monitoring stages run after it.
    #[serde(rename = "QAs", default)]
    pub qas: Vec<StageConfig>,
    /// Step name used in the output schema.
    #[serde(rename = "StepName")]
    pub step_name: String,
    /// Where to dump the step's QA results when intermediates are dumped.
    #[serde(rename = "OutputFile", default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
}

/// Liveness monitoring settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    /// Seconds between checks.
    pub period_secs: f64,
    /// Seconds an activity may run before a warning.
    pub timeout_secs: f64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            period_secs: default_period(),
            timeout_secs: default_timeout(),
        }
    }
}

impl HeartbeatSettings {
    /// Creates settings from seconds.
    #[must_use]
    pub fn new(period_secs: f64, timeout_secs: f64) -> Self {
        Self {
            period_secs,
            timeout_secs,
        }
    }

    /// Checks that both values are positive, warning about long timeouts.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the period or timeout is not a
    /// positive number of seconds.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (key, value) in [("Period", self.period_secs), ("Timeout", self.timeout_secs)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::new(format!(
                    "{key} must be a positive number of seconds, got {value}"
                )));
            }
        }
        if self.timeout_secs > LONG_TIMEOUT_SECS {
            warn!(timeout = self.timeout_secs, "Heartbeat timeout exceeding {LONG_TIMEOUT_SECS} seconds");
        }
        Ok(())
    }

    /// The period as a duration; zero when the value is not a valid duration.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(self.period_secs).unwrap_or(Duration::ZERO)
    }

    /// The timeout as a duration; zero when the value is not a valid duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::ZERO)
    }
}

fn default_period() -> f64 {
    5.0
}

fn default_timeout() -> f64 {
    120.0
}

/// A complete, runnable pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Night(s) to process.
    #[serde(rename = "Night", default, skip_serializing_if = "Option::is_none")]
    pub night: Option<Nights>,
    /// Telescope id, e.g. `3b`.
    #[serde(
        rename = "Telescope",
        default,
        deserialize_with = "de_opt_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub telescope: Option<String>,
    /// Sky field.
    #[serde(rename = "Field", default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Observing program, e.g. `supernova`.
    #[serde(rename = "Program", default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Configuration flavor, e.g. `science`.
    #[serde(rename = "Flavor", default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    /// Target right ascension in degrees.
    #[serde(rename = "RA", default, skip_serializing_if = "Option::is_none")]
    pub ra: Option<f64>,
    /// Target declination in degrees.
    #[serde(rename = "DEC", default, skip_serializing_if = "Option::is_none")]
    pub dec: Option<f64>,
    /// Directory holding preprocessed data.
    #[serde(rename = "DataDir", default, skip_serializing_if = "Option::is_none")]
    pub datadir: Option<PathBuf>,
    /// Output directory.
    #[serde(rename = "OutDir", default, skip_serializing_if = "Option::is_none")]
    pub outdir: Option<PathBuf>,
    /// Template directory.
    #[serde(rename = "TempDir", default, skip_serializing_if = "Option::is_none")]
    pub tempdir: Option<PathBuf>,
    /// Heartbeat period in seconds.
    #[serde(rename = "Period", default = "default_period")]
    pub period: f64,
    /// Heartbeat timeout in seconds.
    #[serde(rename = "Timeout", default = "default_timeout")]
    pub timeout: f64,
    /// Dump each step's QA results to its `OutputFile`.
    #[serde(rename = "DumpIntermediates", default)]
    pub dump_intermediates: bool,
    /// Run only this check.
    #[serde(rename = "SingleQA", default, skip_serializing_if = "Option::is_none")]
    pub single_qa: Option<String>,
    /// The steps, in order.
    #[serde(rename = "Pipeline", default)]
    pub pipeline: Vec<StepConfig>,
}

impl PipelineConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `RotseflowError::Yaml` if the document does not parse.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RotseflowError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read and a YAML error if
    /// it does not parse.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RotseflowError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Serializes to YAML.
    ///
    /// # Errors
    ///
    /// Returns `RotseflowError::Yaml` on serialization failure.
    pub fn to_yaml_string(&self) -> Result<String, RotseflowError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks the keys every run needs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `Night` or `Telescope` is missing, the
    /// pipeline is empty, or the heartbeat settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.night.is_none() {
            return Err(ConfigurationError::missing_key("Night"));
        }
        if self.telescope.is_none() {
            return Err(ConfigurationError::missing_key("Telescope"));
        }
        if self.pipeline.is_empty() {
            return Err(ConfigurationError::empty_pipeline());
        }
        self.heartbeat_settings().validate()
    }

    /// Heartbeat settings from `Period` and `Timeout`.
    #[must_use]
    pub fn heartbeat_settings(&self) -> HeartbeatSettings {
        HeartbeatSettings::new(self.period, self.timeout)
    }

    /// Values stages can reference as `%%<key>`.
    #[must_use]
    pub fn context_values(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut values = serde_json::Map::new();
        let mut put = |key: &str, value: Option<serde_json::Value>| {
            if let Some(value) = value {
                values.insert(key.to_string(), value);
            }
        };

        put("night", self.night.as_ref().map(Nights::to_value));
        put("telescope", self.telescope.clone().map(Into::into));
        put("field", self.field.clone().map(Into::into));
        put("program", self.program.clone().map(Into::into));
        put("flavor", self.flavor.clone().map(Into::into));
        put("ra", self.ra.map(Into::into));
        put("dec", self.dec.map(Into::into));
        put("datadir", path_value(self.datadir.as_deref()));
        put("outdir", path_value(self.outdir.as_deref()));
        put("tempdir", path_value(self.tempdir.as_deref()));
        put("DumpIntermediates", Some(self.dump_intermediates.into()));

        values
    }

    /// All configured check names, grouped by step.
    #[must_use]
    pub fn check_names(&self) -> Vec<(&str, Vec<&str>)> {
        self.pipeline
            .iter()
            .map(|step| {
                (
                    step.step_name.as_str(),
                    step.qas.iter().map(StageConfig::instance_name).collect(),
                )
            })
            .collect()
    }
}

fn path_value(path: Option<&Path>) -> Option<serde_json::Value> {
    path.map(|p| serde_json::Value::String(p.display().to_string()))
}
