//! Per-check QA configuration.
//!
//! A check is configured through its keyword arguments:
//!
//! - `refKey`: the metric the check is judged on (defaults per algorithm)
//! - `statKey`: where the status is written (defaults to `<refKey>_STATUS`)
//! - `rule`: `standard`, `composite` or `fit_tolerance`
//! - `components`: sub-status keys for the composite rule
//! - `param`: the PARAMS block, holding `<KEY>_NORMAL_RANGE`,
//!   `<KEY>_WARN_RANGE`, `<KEY>_REF` and optionally `<KEY>_DEVIATION`

use super::classify::{Range, Thresholds};
use super::evaluator::{composite, evaluate, fit_tolerance, DeviationMode, Evaluation, Rule};
use super::result::QaResult;
use crate::config::StageArgs;
use crate::core::MetricValue;
use crate::errors::ParameterError;
use tracing::{info, warn};

/// Sub-statuses combined by the header check.
pub const CHECKHDUS_COMPONENTS: [&str; 2] = ["CHECKHDUS_STATUS", "EXPNUM_STATUS"];

/// Resolved configuration of one QA check.
#[derive(Debug, Clone, PartialEq)]
pub struct QaSettings {
    /// Metric the status is computed from.
    pub result_key: String,
    /// Metric key the status is written under.
    pub status_key: String,
    /// Status rule.
    pub rule: Rule,
    /// Sub-status keys for [`Rule::Composite`].
    pub components: Vec<String>,
    /// Normal/warning ranges, when configured.
    pub thresholds: Option<Thresholds>,
    /// Reference value, when configured.
    pub reference: Option<MetricValue>,
    /// Explicit deviation mode, when configured.
    pub mode: Option<DeviationMode>,
    /// The raw PARAMS block.
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl QaSettings {
    /// Reads the settings from resolved keyword arguments.
    ///
    /// # Errors
    ///
    /// Returns `ParameterError` for malformed ranges (including `lo > hi`),
    /// a reference without ranges, an unparseable reference, or an unknown
    /// rule or deviation mode.
    pub fn from_args(stage: &str, args: &StageArgs, default_key: &str) -> Result<Self, ParameterError> {
        let result_key = args.get_str("refKey").unwrap_or(default_key).to_string();
        let status_key = args
            .get_str("statKey")
            .map_or_else(|| format!("{result_key}_STATUS"), str::to_string);

        let rule = match args.get_str("rule") {
            Some(name) => Rule::parse(name)
                .ok_or_else(|| ParameterError::new(format!("{stage}: unknown rule '{name}'")))?,
            None => Rule::for_result_key(&result_key),
        };

        let components = match args.get_string_list("components") {
            Some(keys) => keys,
            None if result_key == "CHECKHDUS" => {
                CHECKHDUS_COMPONENTS.iter().map(|k| (*k).to_string()).collect()
            }
            None => Vec::new(),
        };

        let params = match args.get("param") {
            None | Some(serde_json::Value::Null) => serde_json::Map::new(),
            Some(_) => args.require_object(stage, "param")?.clone(),
        };

        let normal_name = format!("{result_key}_NORMAL_RANGE");
        let warn_name = format!("{result_key}_WARN_RANGE");
        let ref_name = format!("{result_key}_REF");
        let mode_name = format!("{result_key}_DEVIATION");

        let thresholds = match (params.get(&normal_name), params.get(&warn_name)) {
            (Some(normal), Some(warning)) => Some(Thresholds::new(
                Range::from_json(&normal_name, normal)?,
                Range::from_json(&warn_name, warning)?,
            )),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ParameterError::new(format!("{stage}: {normal_name} given without {warn_name}")))
            }
            (None, Some(_)) => {
                return Err(ParameterError::new(format!("{stage}: {warn_name} given without {normal_name}")))
            }
        };

        let reference = params
            .get(&ref_name)
            .map(|value| {
                MetricValue::from_json(value).ok_or_else(|| {
                    ParameterError::new(format!("{stage}: {ref_name} must be a number or a list of numbers"))
                })
            })
            .transpose()?;
        if reference.is_some() && thresholds.is_none() {
            return Err(ParameterError::new(format!(
                "{stage}: {ref_name} given without {normal_name} and {warn_name}"
            )));
        }

        let mode = params
            .get(&mode_name)
            .map(|value| {
                value.as_str().and_then(DeviationMode::parse).ok_or_else(|| {
                    ParameterError::new(format!("{stage}: {mode_name} must be 'absolute' or 'relative'"))
                })
            })
            .transpose()?;

        Ok(Self {
            result_key,
            status_key,
            rule,
            components,
            thresholds,
            reference,
            mode,
            params,
        })
    }

    /// Computes the check's status and writes it into `result`.
    pub fn apply(&self, result: &mut QaResult) -> Evaluation {
        let evaluation = match self.rule {
            Rule::Composite => Evaluation {
                deviation: None,
                status: composite(self.components.iter().map(|key| result.status_of(key))),
            },
            Rule::Standard | Rule::FitTolerance => self.evaluate_metric(result),
        };

        result.set_status(&self.status_key, evaluation.status);
        info!(check = %result.name, status_key = %self.status_key, status = %evaluation.status, "QA status");
        evaluation
    }

    fn evaluate_metric(&self, result: &QaResult) -> Evaluation {
        let Some(raw) = result.metric(&self.result_key) else {
            warn!(check = %result.name, key = %self.result_key, "Result metric missing, status is UNKNOWN");
            return Evaluation::unknown();
        };
        let Some(current) = MetricValue::from_json(raw) else {
            warn!(check = %result.name, key = %self.result_key, "Result metric is not numeric, status is UNKNOWN");
            return Evaluation::unknown();
        };
        let Some(thresholds) = self.thresholds.as_ref() else {
            warn!(
                check = %result.name,
                "No reference given. Update the configuration file to include reference values"
            );
            return Evaluation::unknown();
        };

        match self.rule {
            Rule::FitTolerance => fit_tolerance(&current, self.reference.as_ref(), thresholds),
            _ => evaluate(&current, self.reference.as_ref(), thresholds, self.mode),
        }
    }

    /// Returns true if the check has a usable status configuration.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self.rule {
            Rule::Composite => !self.components.is_empty(),
            Rule::Standard | Rule::FitTolerance => self.thresholds.is_some(),
        }
    }
}
