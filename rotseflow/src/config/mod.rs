//! Pipeline configuration.
//!
//! Two YAML forms are supported: the full form ([`PipelineConfig`]), which
//! names every stage and its keyword arguments, and the compact form
//! ([`CompactConfig`]), which expands into the full form for a given run.

mod expand;
mod kwargs;
mod pipeline;

pub use expand::{
    default_pa_kwargs, derive_ref_key, AlgorithmConfig, CompactConfig, QaAlgorithmConfig, RunTarget,
    DEFAULT_TELESCOPE,
};
pub use kwargs::{KwArg, KwArgs, StageArgs, REFERENCE_PREFIX};
pub use pipeline::{HeartbeatSettings, Nights, PipelineConfig, StageConfig, StepConfig, LONG_TIMEOUT_SECS};

/// Module namespace of the built-in processing stages.
pub const PA_MODULE: &str = "rotseflow.pa";

/// Module namespace of the built-in monitoring stages.
pub const QA_MODULE: &str = "rotseflow.qa";
