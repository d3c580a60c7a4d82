//! QA status and stage execution state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of classifying a QA metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QaStatus {
    /// Deviation inside the normal range.
    Normal,
    /// Deviation outside the normal range but inside the warning range.
    Warning,
    /// Deviation outside both ranges.
    Alarm,
    /// Status could not be computed (no reference, bad shape, ...).
    Unknown,
}

impl Default for QaStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for QaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Warning => write!(f, "WARNING"),
            Self::Alarm => write!(f, "ALARM"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl QaStatus {
    /// Numeric severity; `None` for `Unknown`, which is not ranked.
    #[must_use]
    pub fn severity(&self) -> Option<u8> {
        match self {
            Self::Normal => Some(0),
            Self::Warning => Some(20),
            Self::Alarm => Some(30),
            Self::Unknown => None,
        }
    }

    /// Parses a status as written in a metrics block.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Some(Self::Normal),
            "WARNING" => Some(Self::Warning),
            "ALARM" => Some(Self::Alarm),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// The execution state of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Stage is waiting to run.
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Succeeded,
    /// Stage failed.
    Failed,
}

impl Default for StageState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
