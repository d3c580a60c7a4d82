//! The compact "algorithms" configuration and its expansion.
//!
//! The compact form lists PA names and per-PA settings:
//!
//! ```yaml
//! Flavor: science
//! Program: supernova
//! Period: 5.0
//! Timeout: 120.0
//! Pipeline: [Find_Data, Coaddition]
//! Algorithms:
//!   Coaddition:
//!     program: coadd_all
//!     QA:
//!       Count_Pixels:
//!         PARAMS:
//!           COUNT_NORMAL_RANGE: [-0.2, 0.2]
//!           COUNT_WARN_RANGE: [-0.4, 0.4]
//! ```
//!
//! Expanding it against a [`RunTarget`] yields a full [`PipelineConfig`]
//! whose PA arguments reference the run's context values.

use super::kwargs::{KwArg, KwArgs};
use super::pipeline::{Nights, PipelineConfig, StageConfig, StepConfig};
use super::{PA_MODULE, QA_MODULE};
use crate::errors::{ConfigurationError, RotseflowError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// The telescope processed when none is named.
pub const DEFAULT_TELESCOPE: &str = "3b";

/// Settings of one PA in the compact form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Checks run after the PA, in document order.
    #[serde(rename = "QA", default)]
    pub qa: serde_yaml::Mapping,
    /// Extra PA keyword arguments; these override the defaults.
    #[serde(flatten)]
    pub kwargs: KwArgs,
}

/// Settings of one check in the compact form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaAlgorithmConfig {
    /// Thresholds and references.
    #[serde(rename = "PARAMS", default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Extra check keyword arguments.
    #[serde(flatten)]
    pub kwargs: KwArgs,
}

/// The compact configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactConfig {
    /// Configuration flavor.
    #[serde(rename = "Flavor", default)]
    pub flavor: Option<String>,
    /// Observing program.
    #[serde(rename = "Program", default)]
    pub program: Option<String>,
    /// Heartbeat period in seconds.
    #[serde(rename = "Period")]
    pub period: f64,
    /// Heartbeat timeout in seconds.
    #[serde(rename = "Timeout")]
    pub timeout: f64,
    /// Dump per-step QA results.
    #[serde(rename = "DumpIntermediates", default)]
    pub dump_intermediates: bool,
    /// PA names, in order.
    #[serde(rename = "Pipeline")]
    pub pipeline: Vec<String>,
    /// Per-PA settings.
    #[serde(rename = "Algorithms", default)]
    pub algorithms: BTreeMap<String, AlgorithmConfig>,
}

/// What a run processes and where.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTarget {
    /// Night(s) to process.
    pub nights: Nights,
    /// Telescope id.
    pub telescope: String,
    /// Sky field.
    pub field: Option<String>,
    /// Target right ascension.
    pub ra: Option<f64>,
    /// Target declination.
    pub dec: Option<f64>,
    /// Data directory.
    pub datadir: Option<PathBuf>,
    /// Output directory.
    pub outdir: Option<PathBuf>,
    /// Template directory.
    pub tempdir: Option<PathBuf>,
}

impl RunTarget {
    /// A target on the default telescope.
    #[must_use]
    pub fn new(nights: Nights) -> Self {
        Self {
            nights,
            telescope: DEFAULT_TELESCOPE.to_string(),
            field: None,
            ra: None,
            dec: None,
            datadir: None,
            outdir: None,
            tempdir: None,
        }
    }

    /// Sets the telescope.
    #[must_use]
    pub fn with_telescope(mut self, telescope: impl Into<String>) -> Self {
        self.telescope = telescope.into();
        self
    }

    /// Sets the field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the target coordinates.
    #[must_use]
    pub fn with_coordinates(mut self, ra: f64, dec: f64) -> Self {
        self.ra = Some(ra);
        self.dec = Some(dec);
        self
    }

    /// Sets the data, output and template directories.
    #[must_use]
    pub fn with_dirs(
        mut self,
        datadir: Option<PathBuf>,
        outdir: Option<PathBuf>,
        tempdir: Option<PathBuf>,
    ) -> Self {
        self.datadir = datadir;
        self.outdir = outdir;
        self.tempdir = tempdir;
        self
    }
}

impl CompactConfig {
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
    /// Returns an IO or YAML error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RotseflowError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Builds the full configuration for `target`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pipeline is empty or a listed PA
    /// has no `Algorithms` entry, and a YAML error if a check's settings do
    /// not parse.
    pub fn expand(&self, target: &RunTarget) -> Result<PipelineConfig, RotseflowError> {
        debug!(flavor = ?self.flavor, "Building full configuration");
        if self.pipeline.is_empty() {
            return Err(ConfigurationError::empty_pipeline().into());
        }

        let mut steps = Vec::with_capacity(self.pipeline.len());
        for pa in &self.pipeline {
            let algorithm = self.algorithms.get(pa).ok_or_else(|| {
                ConfigurationError::missing_key(&format!("Algorithms.{pa}")).with_stage(pa.clone())
            })?;

            let pa_kwargs = default_pa_kwargs(pa).overlaid_with(algorithm.kwargs.clone());

            let mut qas = Vec::with_capacity(algorithm.qa.len());
            for (name, settings) in &algorithm.qa {
                let name = name.as_str().ok_or_else(|| {
                    ConfigurationError::new(format!("QA names under Algorithms.{pa} must be strings"))
                        .with_stage(pa.clone())
                })?;
                let settings: QaAlgorithmConfig = serde_yaml::from_value(settings.clone())?;
                qas.push(StageConfig::new(QA_MODULE, name).with_kwargs(qa_kwargs(settings)));
            }

            steps.push(StepConfig {
                pa: StageConfig::new(PA_MODULE, pa.clone()).with_kwargs(pa_kwargs),
                qas,
                step_name: pa.clone(),
                output_file: None,
            });
        }

        Ok(PipelineConfig {
            night: Some(target.nights.clone()),
            telescope: Some(target.telescope.clone()),
            field: target.field.clone(),
            program: self.program.clone(),
            flavor: self.flavor.clone(),
            ra: target.ra,
            dec: target.dec,
            datadir: target.datadir.clone(),
            outdir: target.outdir.clone(),
            tempdir: target.tempdir.clone(),
            period: self.period,
            timeout: self.timeout,
            dump_intermediates: self.dump_intermediates,
            single_qa: None,
            pipeline: steps,
        })
    }
}

/// Context references each built-in PA receives by default.
#[must_use]
pub fn default_pa_kwargs(pa: &str) -> KwArgs {
    let refs: &[(&str, &str)] = match pa {
        "Find_Data" => &[
            ("Night", "night"),
            ("Telescope", "telescope"),
            ("Field", "field"),
            ("Program", "program"),
            ("RA", "ra"),
            ("DEC", "dec"),
            ("datadir", "datadir"),
            ("outdir", "outdir"),
        ],
        "Coaddition" => &[("Night", "night"), ("outdir", "outdir")],
        "Make_Subimages" => &[
            ("Program", "program"),
            ("Telescope", "telescope"),
            ("Field", "field"),
            ("RA", "ra"),
            ("DEC", "dec"),
            ("outdir", "outdir"),
            ("tempdir", "tempdir"),
        ],
        "Choose_Refstars" => &[("RA", "ra"), ("DEC", "dec"), ("outdir", "outdir")],
        "Source_Extraction" | "Image_Differencing" | "Photometry" => &[("outdir", "outdir")],
        _ => &[],
    };

    refs.iter()
        .map(|(name, key)| ((*name).to_string(), KwArg::reference(*key)))
        .collect()
}

fn qa_kwargs(settings: QaAlgorithmConfig) -> KwArgs {
    let mut kwargs = KwArgs::new()
        .with("night", KwArg::reference("night"))
        .with("telescope", KwArg::reference("telescope"));
    if let Some(key) = derive_ref_key(&settings.params) {
        kwargs.insert("refKey", KwArg::literal(key));
    }
    kwargs
        .with("param", KwArg::literal(serde_json::Value::Object(settings.params)))
        .overlaid_with(settings.kwargs)
}

/// The metric key named by a `<KEY>_NORMAL_RANGE` parameter.
#[must_use]
pub fn derive_ref_key(params: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^(?P<key>.+)_NORMAL_RANGE$").ok())
        .as_ref()?;

    params.keys().find_map(|name| {
        pattern
            .captures(name)
            .and_then(|caps| caps.name("key"))
            .map(|key| key.as_str().to_string())
    })
}
