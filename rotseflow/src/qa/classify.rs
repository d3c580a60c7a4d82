//! Threshold classification and status aggregation.

use crate::core::QaStatus;
use crate::errors::ParameterError;
use serde::{Deserialize, Serialize};

/// An inclusive `[lo, hi]` bound on a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    lo: f64,
    hi: f64,
}

impl Range {
    /// Creates a range, rejecting `lo > hi` and NaN bounds.
    pub fn new(lo: f64, hi: f64) -> Result<Self, ParameterError> {
        if lo.is_nan() || hi.is_nan() {
            return Err(ParameterError::new("range bounds must be numbers"));
        }
        if lo > hi {
            return Err(ParameterError::new(format!(
                "range [{lo}, {hi}] has lower bound above upper bound"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Parses a `[lo, hi]` JSON array.
    pub fn from_json(name: &str, value: &serde_json::Value) -> Result<Self, ParameterError> {
        let bounds = value
            .as_array()
            .filter(|items| items.len() == 2)
            .and_then(|items| Some((items[0].as_f64()?, items[1].as_f64()?)))
            .ok_or_else(|| {
                ParameterError::new(format!("{name} must be a [lo, hi] pair, got {value}"))
            })?;
        Self::new(bounds.0, bounds.1)
            .map_err(|e| ParameterError::new(format!("{name}: {}", e.value)))
    }

    /// Lower bound.
    #[must_use]
    pub fn lo(&self) -> f64 {
        self.lo
    }

    /// Upper bound.
    #[must_use]
    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// Returns true if `lo <= value <= hi`.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lo <= value && value <= self.hi
    }
}

impl TryFrom<[f64; 2]> for Range {
    type Error = ParameterError;

    fn try_from(value: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(value[0], value[1])
    }
}

impl From<Range> for [f64; 2] {
    fn from(range: Range) -> Self {
        [range.lo, range.hi]
    }
}

/// Normal and warning ranges for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Deviations inside this range are NORMAL.
    pub normal: Range,
    /// Deviations inside this range (and outside `normal`) are WARNING.
    pub warning: Range,
}

impl Thresholds {
    /// Creates thresholds from two ranges.
    #[must_use]
    pub fn new(normal: Range, warning: Range) -> Self {
        Self { normal, warning }
    }
}

/// Classifies one deviation.
///
/// A NaN deviation cannot be placed in either range and is `Unknown`.
#[must_use]
pub fn classify(deviation: f64, thresholds: &Thresholds) -> QaStatus {
    if deviation.is_nan() {
        QaStatus::Unknown
    } else if thresholds.normal.contains(deviation) {
        QaStatus::Normal
    } else if thresholds.warning.contains(deviation) {
        QaStatus::Warning
    } else {
        QaStatus::Alarm
    }
}

/// Folds per-element statuses into one.
///
/// Any ALARM wins, then any WARNING, then any UNKNOWN. An empty input has
/// nothing to vouch for it and is UNKNOWN.
pub fn aggregate<I>(statuses: I) -> QaStatus
where
    I: IntoIterator<Item = QaStatus>,
{
    let mut seen_any = false;
    let mut worst = QaStatus::Normal;

    for status in statuses {
        seen_any = true;
        worst = match (worst, status) {
            (QaStatus::Alarm, _) | (_, QaStatus::Alarm) => QaStatus::Alarm,
            (QaStatus::Warning, _) | (_, QaStatus::Warning) => QaStatus::Warning,
            (QaStatus::Unknown, _) | (_, QaStatus::Unknown) => QaStatus::Unknown,
            _ => QaStatus::Normal,
        };
    }

    if seen_any {
        worst
    } else {
        QaStatus::Unknown
    }
}
