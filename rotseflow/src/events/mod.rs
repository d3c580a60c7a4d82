//! Run events.
//!
//! The engine reports progress through an [`EventSink`] handle it is given
//! explicitly; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of events the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A run began.
    #[serde(rename = "pipeline.started")]
    PipelineStarted,
    /// A processing stage began.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A processing stage returned its output.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A processing stage failed; the run stops.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// A QA check produced a result.
    #[serde(rename = "qa.completed")]
    QaCompleted,
    /// A QA check failed; the run continues.
    #[serde(rename = "qa.failed")]
    QaFailed,
    /// A run finished.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
}

impl EventKind {
    /// Dotted event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::QaCompleted => "qa.completed",
            Self::QaFailed => "qa.failed",
            Self::PipelineCompleted => "pipeline.completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
