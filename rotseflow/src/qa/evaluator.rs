//! Deviation computation and status rules for QA metrics.
//!
//! Problems with a single metric (missing reference, mismatched shapes,
//! NaN scalars) never fail the check. They are logged and the metric's
//! status becomes UNKNOWN.

use super::classify::{aggregate, classify, Thresholds};
use crate::core::{MetricValue, QaStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

/// How a deviation is computed from current and reference values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationMode {
    /// `current - reference`.
    Absolute,
    /// `(current - reference) / current`.
    Relative,
}

impl DeviationMode {
    /// The mode used when none is configured: relative for scalars,
    /// absolute for series.
    #[must_use]
    pub fn default_for(value: &MetricValue) -> Self {
        if value.is_series() {
            Self::Absolute
        } else {
            Self::Relative
        }
    }

    /// Parses `absolute` / `relative`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "absolute" => Some(Self::Absolute),
            "relative" => Some(Self::Relative),
            _ => None,
        }
    }

    fn apply(self, current: f64, reference: f64) -> Option<f64> {
        match self {
            Self::Absolute => Some(current - reference),
            Self::Relative if current == 0.0 => None,
            Self::Relative => Some((current - reference) / current),
        }
    }
}

impl fmt::Display for DeviationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Relative => write!(f, "relative"),
        }
    }
}

/// Which status rule a QA check applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Deviation against a reference, classified and aggregated.
    Standard,
    /// Combination of sub-statuses already present in the metrics.
    Composite,
    /// Per-target fit values where zero means the fit was not attempted.
    FitTolerance,
}

impl Rule {
    /// Default rule for a result key.
    #[must_use]
    pub fn for_result_key(key: &str) -> Self {
        match key {
            "CHECKHDUS" => Self::Composite,
            "FIDSNR_TGT" => Self::FitTolerance,
            _ => Self::Standard,
        }
    }

    /// Parses `standard` / `composite` / `fit_tolerance`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "composite" => Some(Self::Composite),
            "fit_tolerance" => Some(Self::FitTolerance),
            _ => None,
        }
    }
}

/// Result of evaluating one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The deviation, when one could be computed.
    pub deviation: Option<MetricValue>,
    /// The resulting status.
    pub status: QaStatus,
}

impl Evaluation {
    /// An evaluation that produced no deviation.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            deviation: None,
            status: QaStatus::Unknown,
        }
    }

    fn with_status(status: QaStatus) -> Self {
        Self {
            deviation: None,
            status,
        }
    }
}

/// Evaluates a metric against its reference.
///
/// `mode` falls back to [`DeviationMode::default_for`] the current value.
#[must_use]
pub fn evaluate(
    current: &MetricValue,
    reference: Option<&MetricValue>,
    thresholds: &Thresholds,
    mode: Option<DeviationMode>,
) -> Evaluation {
    let Some(reference) = reference else {
        warn!("No reference given, status is UNKNOWN");
        return Evaluation::unknown();
    };
    let mode = mode.unwrap_or_else(|| DeviationMode::default_for(current));

    match (current, unwrap_single(current, reference)) {
        (MetricValue::Scalar(c), MetricValue::Scalar(r)) => evaluate_scalar(*c, r, thresholds, mode),
        (MetricValue::Series(c), MetricValue::Series(r)) => evaluate_series(c, &r, thresholds, mode),
        (_, reference) => {
            error!(
                current_is_series = current.is_series(),
                reference_is_series = reference.is_series(),
                "Reference and result are of different types"
            );
            Evaluation::unknown()
        }
    }
}

fn unwrap_single(current: &MetricValue, reference: &MetricValue) -> MetricValue {
    match (current, reference) {
        (MetricValue::Scalar(_), MetricValue::Series(values)) if values.len() == 1 => {
            MetricValue::Scalar(values[0])
        }
        _ => reference.clone(),
    }
}

fn evaluate_scalar(current: f64, reference: f64, thresholds: &Thresholds, mode: DeviationMode) -> Evaluation {
    if current.is_nan() {
        warn!("Result is NaN, status is UNKNOWN");
        return Evaluation::unknown();
    }
    let Some(deviation) = mode.apply(current, reference) else {
        warn!(%mode, "Result is zero, relative deviation is undefined");
        return Evaluation::unknown();
    };

    Evaluation {
        deviation: Some(MetricValue::Scalar(deviation)),
        status: classify(deviation, thresholds),
    }
}

fn evaluate_series(current: &[f64], reference: &[f64], thresholds: &Thresholds, mode: DeviationMode) -> Evaluation {
    if current.is_empty() || reference.is_empty() {
        warn!("No measurement or no reference available, status is UNKNOWN");
        return Evaluation::unknown();
    }

    let (mut current, mut reference) = drop_nan_pairs(current, reference);
    if current.len() != reference.len() {
        error!(
            reference_len = reference.len(),
            current_len = current.len(),
            "Reference and result are of different length"
        );
        return Evaluation::unknown();
    }
    if current.is_empty() {
        warn!("Every element of the result is NaN, status is UNKNOWN");
        return Evaluation::unknown();
    }

    current.sort_by(f64::total_cmp);
    reference.sort_by(f64::total_cmp);

    let Some(deviations) = current
        .iter()
        .zip(&reference)
        .map(|(c, r)| mode.apply(*c, *r))
        .collect::<Option<Vec<_>>>()
    else {
        warn!(%mode, "Result contains zero, relative deviation is undefined");
        return Evaluation::unknown();
    };

    let status = aggregate(deviations.iter().map(|d| classify(*d, thresholds)));
    Evaluation {
        deviation: Some(MetricValue::Series(deviations)),
        status,
    }
}

/// Removes NaN positions of `current` from both series.
///
/// Only applies when the lengths match; otherwise the inputs are returned
/// unchanged and the caller reports the mismatch.
fn drop_nan_pairs(current: &[f64], reference: &[f64]) -> (Vec<f64>, Vec<f64>) {
    if current.len() != reference.len() {
        return (current.to_vec(), reference.to_vec());
    }

    let nan_positions: Vec<usize> = current
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_nan())
        .map(|(i, _)| i)
        .collect();
    if nan_positions.is_empty() {
        return (current.to_vec(), reference.to_vec());
    }

    warn!(
        positions = ?nan_positions,
        "Elements of the result are NaN, status is determined from the real values"
    );
    current
        .iter()
        .zip(reference)
        .filter(|(c, _)| !c.is_nan())
        .map(|(c, r)| (*c, *r))
        .unzip()
}

/// Combines named sub-statuses.
///
/// `None` entries are missing or unparseable sub-statuses.
pub fn composite<I>(statuses: I) -> QaStatus
where
    I: IntoIterator<Item = Option<QaStatus>>,
{
    let statuses: Vec<Option<QaStatus>> = statuses.into_iter().collect();
    if statuses.is_empty() {
        return QaStatus::Unknown;
    }

    if statuses.iter().all(|s| *s == Some(QaStatus::Normal)) {
        QaStatus::Normal
    } else if statuses.contains(&Some(QaStatus::Alarm)) {
        QaStatus::Alarm
    } else if statuses.contains(&Some(QaStatus::Warning)) {
        QaStatus::Warning
    } else {
        QaStatus::Unknown
    }
}

/// Evaluates per-target fit values, zero meaning "not attempted".
///
/// Two or more unattempted fits raise ALARM outright. A single one is
/// tolerated as NORMAL and the remaining entries are classified on the
/// positional difference `reference[i] - current[i]`.
#[must_use]
pub fn fit_tolerance(
    current: &MetricValue,
    reference: Option<&MetricValue>,
    thresholds: &Thresholds,
) -> Evaluation {
    let Some(reference) = reference else {
        warn!("No reference given for fit tolerance, status is UNKNOWN");
        return Evaluation::unknown();
    };

    let current = current.values();
    let reference = reference.values();

    let not_attempted: Vec<usize> = current
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == 0.0)
        .map(|(i, _)| i)
        .collect();
    if not_attempted.len() >= 2 {
        warn!(targets = ?not_attempted, "Multiple fits were not attempted");
        return Evaluation::with_status(QaStatus::Alarm);
    }

    if current.len() != reference.len() {
        error!(
            reference_len = reference.len(),
            current_len = current.len(),
            "Reference and result are of different length"
        );
        return Evaluation::unknown();
    }

    let deviations: Vec<f64> = current.iter().zip(&reference).map(|(c, r)| r - c).collect();
    let status = aggregate(deviations.iter().enumerate().map(|(i, d)| {
        if not_attempted.first() == Some(&i) {
            QaStatus::Normal
        } else {
            classify(*d, thresholds)
        }
    }));

    Evaluation {
        deviation: Some(MetricValue::Series(deviations)),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::Range;

    fn thresholds(normal: (f64, f64), warning: (f64, f64)) -> Thresholds {
        Thresholds::new(
            Range::new(normal.0, normal.1).unwrap(),
            Range::new(warning.0, warning.1).unwrap(),
        )
    }

    #[test]
    fn test_missing_reference_is_unknown() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let eval = evaluate(&MetricValue::Scalar(3.0), None, &t, None);
        assert_eq!(eval, Evaluation::unknown());
    }

    #[test]
    fn test_series_sorted_before_difference() {
        let t = thresholds((-0.5, 0.5), (-1.0, 1.0));
        let eval = evaluate(
            &MetricValue::Series(vec![3.0, 1.0, 2.0]),
            Some(&MetricValue::Series(vec![1.0, 2.0, 3.0])),
            &t,
            None,
        );
        assert_eq!(eval.deviation, Some(MetricValue::Series(vec![0.0, 0.0, 0.0])));
        assert_eq!(eval.status, QaStatus::Normal);
    }

    #[test]
    fn test_nan_positions_removed_pairwise() {
        let (current, reference) = drop_nan_pairs(&[1.0, f64::NAN, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(current, vec![1.0, 3.0]);
        assert_eq!(reference, vec![1.0, 3.0]);

        let t = thresholds((-0.5, 0.5), (-1.0, 1.0));
        let eval = evaluate(
            &MetricValue::Series(vec![1.0, f64::NAN, 3.0]),
            Some(&MetricValue::Series(vec![1.0, 2.0, 3.0])),
            &t,
            None,
        );
        assert_eq!(eval.deviation.map(|d| d.len()), Some(2));
        assert_eq!(eval.status, QaStatus::Normal);
    }

    #[test]
    fn test_length_mismatch_is_unknown() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let eval = evaluate(
            &MetricValue::Series(vec![1.0, 2.0]),
            Some(&MetricValue::Series(vec![1.0, 2.0, 3.0])),
            &t,
            None,
        );
        assert_eq!(eval.status, QaStatus::Unknown);
    }

    #[test]
    fn test_shape_mismatch_is_unknown() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let eval = evaluate(
            &MetricValue::Series(vec![1.0, 2.0]),
            Some(&MetricValue::Scalar(1.0)),
            &t,
            None,
        );
        assert_eq!(eval.status, QaStatus::Unknown);
    }

    #[test]
    fn test_empty_series_is_unknown() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let eval = evaluate(
            &MetricValue::Series(vec![]),
            Some(&MetricValue::Series(vec![1.0])),
            &t,
            None,
        );
        assert_eq!(eval.status, QaStatus::Unknown);
    }

    #[test]
    fn test_scalar_relative_by_default() {
        let t = thresholds((-0.1, 0.1), (-0.3, 0.3));
        let eval = evaluate(&MetricValue::Scalar(100.0), Some(&MetricValue::Scalar(80.0)), &t, None);
        assert_eq!(eval.deviation, Some(MetricValue::Scalar(0.2)));
        assert_eq!(eval.status, QaStatus::Warning);
    }

    #[test]
    fn test_scalar_absolute_when_configured() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let eval = evaluate(
            &MetricValue::Scalar(100.0),
            Some(&MetricValue::Scalar(80.0)),
            &t,
            Some(DeviationMode::Absolute),
        );
        assert_eq!(eval.deviation, Some(MetricValue::Scalar(20.0)));
        assert_eq!(eval.status, QaStatus::Alarm);
    }

    #[test]
    fn test_single_element_reference_unwrapped_for_scalar() {
        let t = thresholds((-0.5, 0.5), (-1.0, 1.0));
        let eval = evaluate(
            &MetricValue::Scalar(10.0),
            Some(&MetricValue::Series(vec![10.0])),
            &t,
            None,
        );
        assert_eq!(eval.status, QaStatus::Normal);
    }

    #[test]
    fn test_single_element_series_is_absolute() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let eval = evaluate(
            &MetricValue::Series(vec![11.5]),
            Some(&MetricValue::Series(vec![10.0])),
            &t,
            None,
        );
        assert_eq!(eval.deviation, Some(MetricValue::Series(vec![1.5])));
        assert_eq!(eval.status, QaStatus::Warning);
    }

    #[test]
    fn test_zero_or_nan_scalar_is_unknown() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let zero = evaluate(&MetricValue::Scalar(0.0), Some(&MetricValue::Scalar(1.0)), &t, None);
        let nan = evaluate(&MetricValue::Scalar(f64::NAN), Some(&MetricValue::Scalar(1.0)), &t, None);
        assert_eq!(zero.status, QaStatus::Unknown);
        assert_eq!(nan.status, QaStatus::Unknown);
    }

    #[test]
    fn test_composite() {
        use QaStatus::{Alarm, Normal, Unknown, Warning};

        assert_eq!(composite([Some(Normal), Some(Normal)]), Normal);
        assert_eq!(composite([Some(Normal), Some(Alarm)]), Alarm);
        assert_eq!(composite([None, Some(Alarm)]), Alarm);
        assert_eq!(composite([Some(Warning), Some(Normal)]), Warning);
        assert_eq!(composite([Some(Normal), None]), Unknown);
        assert_eq!(composite([Some(Unknown), Some(Normal)]), Unknown);
        assert_eq!(composite(Vec::new()), Unknown);
    }

    #[test]
    fn test_fit_tolerance_two_zeros_alarm() {
        let t = thresholds((-5.0, 5.0), (-10.0, 10.0));
        let eval = fit_tolerance(
            &MetricValue::Series(vec![0.0, 20.0, 0.0]),
            Some(&MetricValue::Series(vec![20.0, 20.0, 20.0])),
            &t,
        );
        assert_eq!(eval.status, QaStatus::Alarm);
    }

    #[test]
    fn test_fit_tolerance_single_zero_tolerated() {
        let t = thresholds((-5.0, 5.0), (-10.0, 10.0));
        let eval = fit_tolerance(
            &MetricValue::Series(vec![0.0, 21.0, 28.0]),
            Some(&MetricValue::Series(vec![20.0, 20.0, 20.0])),
            &t,
        );
        assert_eq!(eval.status, QaStatus::Warning);
    }

    #[test]
    fn test_fit_tolerance_positional() {
        let t = thresholds((-1.0, 1.0), (-2.0, 2.0));
        let eval = fit_tolerance(
            &MetricValue::Series(vec![30.0, 10.0]),
            Some(&MetricValue::Series(vec![30.0, 10.0])),
            &t,
        );
        assert_eq!(eval.status, QaStatus::Normal);
    }

    #[test]
    fn test_fit_tolerance_measures_reference_minus_current() {
        let t = thresholds((0.0, 5.0), (-1.0, 10.0));
        let eval = fit_tolerance(
            &MetricValue::Series(vec![15.0, 12.0]),
            Some(&MetricValue::Series(vec![10.0, 10.0])),
            &t,
        );
        assert_eq!(eval.status, QaStatus::Alarm);
        assert_eq!(eval.deviation, Some(MetricValue::Series(vec![-5.0, -2.0])));

        let eval = fit_tolerance(
            &MetricValue::Series(vec![7.0, 9.0]),
            Some(&MetricValue::Series(vec![10.0, 10.0])),
            &t,
        );
        assert_eq!(eval.status, QaStatus::Normal);
    }

    #[test]
    fn test_rule_defaults() {
        assert_eq!(Rule::for_result_key("CHECKHDUS"), Rule::Composite);
        assert_eq!(Rule::for_result_key("FIDSNR_TGT"), Rule::FitTolerance);
        assert_eq!(Rule::for_result_key("COUNT"), Rule::Standard);
        assert_eq!(Rule::parse("fit_tolerance"), Some(Rule::FitTolerance));
        assert_eq!(DeviationMode::parse("Absolute"), Some(DeviationMode::Absolute));
    }
}
