//! The assembled, ready-to-run form of a pipeline configuration.

use crate::config::KwArgs;
use crate::core::Capability;
use crate::stages::{MonitoringStage, ProcessingStage};
use std::path::PathBuf;
use std::sync::Arc;

/// A processing stage together with its configured arguments.
#[derive(Debug, Clone)]
pub struct PlannedStage {
    /// Instance name.
    pub name: String,
    /// Configured keyword arguments, references unresolved.
    pub kwargs: KwArgs,
    /// The stage.
    pub stage: Arc<dyn ProcessingStage>,
}

/// A monitoring stage together with its configured arguments.
#[derive(Debug, Clone)]
pub struct PlannedMonitor {
    /// Instance name.
    pub name: String,
    /// Configured keyword arguments, references unresolved.
    pub kwargs: KwArgs,
    /// The check.
    pub stage: Arc<dyn MonitoringStage>,
}

/// One step of the plan.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// Step name used in the output schema.
    pub step_name: String,
    /// The processing stage.
    pub processing: PlannedStage,
    /// Checks run on the processing stage's output, in order.
    pub monitors: Vec<PlannedMonitor>,
    /// Where the step's QA results go when intermediates are dumped.
    pub output_file: Option<PathBuf>,
}

impl PlannedStep {
    /// Finds a check of this step by instance name.
    #[must_use]
    pub fn monitor(&self, name: &str) -> Option<&PlannedMonitor> {
        self.monitors.iter().find(|monitor| monitor.name == name)
    }
}

/// Ordered steps whose capabilities chain from the plan's input.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Capability the first stage consumes.
    pub input_capability: Capability,
    /// The steps, in execution order.
    pub steps: Vec<PlannedStep>,
    /// Whether step QA results are dumped to each step's output file.
    pub dump_intermediates: bool,
}

impl ExecutionPlan {
    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Capability produced by the last step.
    #[must_use]
    pub fn output_capability(&self) -> Capability {
        self.steps
            .last()
            .map_or(self.input_capability, |step| step.processing.stage.output_capability())
    }

    /// Every check name, in plan order.
    #[must_use]
    pub fn check_names(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|step| step.monitors.iter().map(|monitor| monitor.name.clone()))
            .collect()
    }

    /// The step running the named check, if any.
    #[must_use]
    pub fn step_for_check(&self, check: &str) -> Option<&PlannedStep> {
        self.steps.iter().find(|step| step.monitor(check).is_some())
    }
}
