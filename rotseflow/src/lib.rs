//! # Rotseflow
//!
//! Pipeline assembly, execution and QA evaluation for ROTSE-III supernova
//! image reduction.
//!
//! Rotseflow chains processing stages (PAs) that turn a night's images into
//! a light curve, runs quality checks (QAs) after each of them, and merges
//! every check's parameters and metrics into one JSON document per run:
//!
//! - **Capability-checked assembly**: stages declare what they consume and
//!   produce, and a mismatched chain is rejected before anything runs
//! - **Threshold evaluation**: metrics are compared to references and
//!   classified as NORMAL, WARNING, ALARM or UNKNOWN
//! - **Explicit collaborators**: external programs, file discovery and image
//!   inspection sit behind traits
//! - **Event-driven observability**: events and a liveness heartbeat are
//!   handed to the engine, never global
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rotseflow::prelude::*;
//!
//! let config = PipelineConfig::from_path("supernova.yaml")?;
//! let services = StageServices::new().with_tool_runner(Arc::new(CommandToolRunner::new()));
//!
//! let outcome = Engine::new()
//!     .with_event_sink(Arc::new(LoggingEventSink::default()))
//!     .run_config(&config, &StageRegistry::with_builtins(), &services)
//!     .await?;
//!
//! outcome.schema.write_json_file("qa.json")?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod external;
pub mod observability;
pub mod pipeline;
pub mod qa;
pub mod schema;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{CompactConfig, KwArg, KwArgs, PipelineConfig, RunTarget, StageArgs};
    pub use crate::core::{Capability, MetricValue, QaStatus, StageData, StageState};
    pub use crate::errors::{
        ConfigurationError, ExecutionError, ParameterError, ReferenceError, RotseflowError,
        TypeIncompatibilityError,
    };
    pub use crate::events::{EventKind, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::external::{CommandToolRunner, StageServices};
    pub use crate::observability::{init_logging, LogSettings};
    pub use crate::pipeline::{
        assemble, Engine, ExecutionPlan, Heartbeat, PipelineContext, RunOutcome, StageRegistry, TimerHeartbeat,
    };
    pub use crate::qa::{QaResult, QaSettings};
    pub use crate::schema::PipelineSchema;
    pub use crate::stages::{MonitorInput, MonitoringStage, ProcessingStage};
}
