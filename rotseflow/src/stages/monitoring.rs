//! Built-in QA checks.
//!
//! A [`QaCheck`] pairs a [`QaAlgorithm`], which only measures, with the
//! check's [`QaSettings`], which turn the measurement into a status.

use super::{MonitorInput, MonitoringStage, StageInit};
use crate::config::StageArgs;
use crate::core::{Capability, QaStatus};
use crate::errors::{ConfigurationError, ExecutionError, RotseflowError};
use crate::external::ImageInspector;
use crate::qa::{QaResult, QaSettings};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metrics produced by a measurement.
pub type Metrics = BTreeMap<String, serde_json::Value>;

/// The measuring half of a QA check.
#[async_trait]
pub trait QaAlgorithm: Send + Sync + fmt::Debug {
    /// The capability the algorithm inspects.
    fn input_capability(&self) -> Capability;

    /// Metric the status is computed from unless `refKey` says otherwise.
    fn default_key(&self) -> &'static str;

    /// Measures the input.
    async fn measure(&self, input: &mut MonitorInput<'_>, args: &StageArgs) -> Result<Metrics, RotseflowError>;
}

/// A monitoring stage built from an algorithm and its settings.
#[derive(Debug)]
pub struct QaCheck {
    name: String,
    algorithm: Box<dyn QaAlgorithm>,
}

impl QaCheck {
    /// Creates a check, validating the literal part of its configuration.
    ///
    /// # Errors
    ///
    /// Returns a parameter error for malformed ranges, references or rules.
    pub fn new(init: &StageInit<'_>, algorithm: impl QaAlgorithm + 'static) -> Result<Self, RotseflowError> {
        QaSettings::from_args(init.name, &init.literal_args(), algorithm.default_key())?;
        Ok(Self {
            name: init.name.to_string(),
            algorithm: Box::new(algorithm),
        })
    }
}

#[async_trait]
impl MonitoringStage for QaCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        self.algorithm.input_capability()
    }

    async fn run(&self, mut input: MonitorInput<'_>, args: &StageArgs) -> Result<QaResult, RotseflowError> {
        let settings = QaSettings::from_args(&self.name, args, self.algorithm.default_key())?;
        let metrics = self.algorithm.measure(&mut input, args).await?;
        debug!(check = %self.name, metrics = ?metrics.keys().collect::<Vec<_>>(), "Measured");

        let mut result = QaResult::new(&self.name);
        result.metrics = metrics;
        result.params.extend(settings.params.clone());
        settings.apply(&mut result);
        Ok(result)
    }
}

fn require_inspector(init: &StageInit<'_>) -> Result<Arc<dyn ImageInspector>, ConfigurationError> {
    init.services.image_inspector.clone().ok_or_else(|| {
        ConfigurationError::new(format!("{} needs an image inspector", init.name)).with_stage(init.name)
    })
}

/// Median of finite values; `None` when there are none.
fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Median pixel value of the coadded images.
pub struct CountPixels {
    inspector: Arc<dyn ImageInspector>,
}

impl CountPixels {
    /// Builds the `Count_Pixels` check.
    ///
    /// # Errors
    ///
    /// Fails without an image inspector or with malformed QA parameters.
    pub fn check(init: &StageInit<'_>) -> Result<QaCheck, RotseflowError> {
        let algorithm = Self {
            inspector: require_inspector(init)?,
        };
        QaCheck::new(init, algorithm)
    }
}

impl fmt::Debug for CountPixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountPixels").finish_non_exhaustive()
    }
}

#[async_trait]
impl QaAlgorithm for CountPixels {
    fn input_capability(&self) -> Capability {
        Capability::Coadds
    }

    fn default_key(&self) -> &'static str {
        "COUNT"
    }

    async fn measure(&self, input: &mut MonitorInput<'_>, _args: &StageArgs) -> Result<Metrics, RotseflowError> {
        let per_image = input
            .current
            .images
            .iter()
            .map(|image| self.inspector.median_pixel(image))
            .collect::<anyhow::Result<Vec<f64>>>()?;
        let count = median(&per_image)
            .ok_or_else(|| ExecutionError::new("Count_Pixels", "no pixel values to count"))?;

        Ok(Metrics::from([
            ("COUNT".to_string(), serde_json::json!(count)),
            ("COUNT_PER_IMAGE".to_string(), serde_json::json!(per_image)),
        ]))
    }
}

/// Header keys every preprocessed image must carry.
pub const REQUIRED_HEADER_KEYS: [&str; 3] = ["EXPTIME", "EXPNUM", "DATE-OBS"];

/// Checks image headers for required keys and unique exposure numbers.
pub struct CheckHdus {
    inspector: Arc<dyn ImageInspector>,
}

impl CheckHdus {
    /// Builds the `Check_HDUs` check.
    ///
    /// # Errors
    ///
    /// Fails without an image inspector or with malformed QA parameters.
    pub fn check(init: &StageInit<'_>) -> Result<QaCheck, RotseflowError> {
        let algorithm = Self {
            inspector: require_inspector(init)?,
        };
        QaCheck::new(init, algorithm)
    }
}

impl fmt::Debug for CheckHdus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckHdus").finish_non_exhaustive()
    }
}

#[async_trait]
impl QaAlgorithm for CheckHdus {
    fn input_capability(&self) -> Capability {
        Capability::Images
    }

    fn default_key(&self) -> &'static str {
        "CHECKHDUS"
    }

    async fn measure(&self, input: &mut MonitorInput<'_>, args: &StageArgs) -> Result<Metrics, RotseflowError> {
        let required = args
            .get_string_list("keys")
            .unwrap_or_else(|| REQUIRED_HEADER_KEYS.iter().map(|k| (*k).to_string()).collect());

        let mut missing = Vec::new();
        let mut complete = 0_usize;
        let mut expnums = Vec::with_capacity(input.current.images.len());
        for image in &input.current.images {
            let header = self.inspector.header(image)?;
            let before = missing.len();
            for key in required.iter().filter(|key| !header.contains_key(*key)) {
                warn!(image = %image.display(), key = %key, "Header key missing");
                missing.push(format!("{}:{key}", image.display()));
            }
            if missing.len() == before {
                complete += 1;
            }
            if let Some(expnum) = header.get("EXPNUM") {
                expnums.push(expnum.clone());
            }
        }

        let distinct: HashSet<String> = expnums.iter().map(ToString::to_string).collect();
        let headers_status = if missing.is_empty() { QaStatus::Normal } else { QaStatus::Alarm };
        let expnum_status = if distinct.len() == expnums.len() { QaStatus::Normal } else { QaStatus::Alarm };

        input
            .shared
            .insert("EXPNUM".to_string(), serde_json::Value::Array(expnums.clone()));

        Ok(Metrics::from([
            ("CHECKHDUS".to_string(), serde_json::json!(complete)),
            ("MISSING_KEYS".to_string(), serde_json::json!(missing)),
            ("EXPNUM".to_string(), serde_json::Value::Array(expnums)),
            ("CHECKHDUS_STATUS".to_string(), serde_json::json!(headers_status.to_string())),
            ("EXPNUM_STATUS".to_string(), serde_json::json!(expnum_status.to_string())),
        ]))
    }
}

/// Signal-to-noise of the target fits on the light curve.
#[derive(Debug, Default)]
pub struct TargetSnr;

impl TargetSnr {
    /// Builds the `Target_SNR` check.
    ///
    /// # Errors
    ///
    /// Fails with malformed QA parameters.
    pub fn check(init: &StageInit<'_>) -> Result<QaCheck, RotseflowError> {
        QaCheck::new(init, Self)
    }
}

#[async_trait]
impl QaAlgorithm for TargetSnr {
    fn input_capability(&self) -> Capability {
        Capability::LightCurve
    }

    fn default_key(&self) -> &'static str {
        "FIDSNR_TGT"
    }

    async fn measure(&self, input: &mut MonitorInput<'_>, _args: &StageArgs) -> Result<Metrics, RotseflowError> {
        let snr = input
            .current
            .attribute("fit_snr")
            .filter(|value| value.is_array())
            .cloned()
            .ok_or_else(|| ExecutionError::new("Target_SNR", "light curve carries no fit SNR"))?;
        let epochs = input
            .current
            .attribute("mjd")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len);

        Ok(Metrics::from([
            ("FIDSNR_TGT".to_string(), snr),
            ("NEPOCHS".to_string(), serde_json::json!(epochs)),
        ]))
    }
}
