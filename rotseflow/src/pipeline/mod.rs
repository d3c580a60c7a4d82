//! Pipeline assembly and execution.
//!
//! This module provides:
//! - A registry mapping configured stage names to factories
//! - Assembly of a configuration into a capability-checked plan
//! - The sequential engine that runs a plan and merges its QA output
//! - The liveness heartbeat

mod assembler;
mod context;
mod engine;
mod heartbeat;
mod plan;
mod registry;

#[cfg(test)]
mod integration_tests;

pub use assembler::assemble;
pub use context::PipelineContext;
pub use engine::{Engine, RunOutcome, StepOutcome};
pub use heartbeat::{Heartbeat, NoOpHeartbeat, TimerHeartbeat};
pub use plan::{ExecutionPlan, PlannedMonitor, PlannedStage, PlannedStep};
pub use registry::{MonitoringFactory, ProcessingFactory, StageRegistry};
