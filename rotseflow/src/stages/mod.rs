//! Stage traits and the built-in stages.
//!
//! Processing stages (PAs) transform [`StageData`] from one capability to
//! another. Monitoring stages (QAs) inspect a processing stage's output and
//! produce a [`QaResult`].

pub mod monitoring;
pub mod processing;

use crate::config::{KwArgs, StageArgs};
use crate::core::{Capability, StageData};
use crate::errors::RotseflowError;
use crate::external::StageServices;
use crate::qa::QaResult;
use async_trait::async_trait;
use std::fmt::Debug;

/// A pipeline step transforming data.
#[async_trait]
pub trait ProcessingStage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// The capability the stage consumes.
    fn input_capability(&self) -> Capability;

    /// The capability the stage produces.
    fn output_capability(&self) -> Capability;

    /// Runs the stage.
    ///
    /// # Arguments
    ///
    /// * `input` - The previous stage's output (or the run's raw input)
    /// * `args` - Keyword arguments with context references resolved
    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError>;
}

/// What a monitoring stage gets to look at.
#[derive(Debug)]
pub struct MonitorInput<'a> {
    /// Output of the owning processing stage.
    pub current: &'a StageData,
    /// Input the owning processing stage consumed.
    pub previous: Option<&'a StageData>,
    /// Map passed from check to check for the whole run.
    pub shared: &'a mut serde_json::Map<String, serde_json::Value>,
}

/// A check run on a processing stage's output.
#[async_trait]
pub trait MonitoringStage: Send + Sync + Debug {
    /// Returns the name of the check.
    fn name(&self) -> &str;

    /// The capability the check inspects.
    fn input_capability(&self) -> Capability;

    /// Runs the check.
    async fn run(&self, input: MonitorInput<'_>, args: &StageArgs) -> Result<QaResult, RotseflowError>;
}

/// Everything a stage factory gets at assembly time.
#[derive(Debug, Clone, Copy)]
pub struct StageInit<'a> {
    /// Instance name.
    pub name: &'a str,
    /// Configured keyword arguments, references unresolved.
    pub kwargs: &'a KwArgs,
    /// Available collaborators.
    pub services: &'a StageServices,
}

impl<'a> StageInit<'a> {
    /// Creates init data.
    #[must_use]
    pub fn new(name: &'a str, kwargs: &'a KwArgs, services: &'a StageServices) -> Self {
        Self {
            name,
            kwargs,
            services,
        }
    }

    /// The literal keyword arguments, for validation before any context
    /// exists.
    #[must_use]
    pub fn literal_args(&self) -> StageArgs {
        self.kwargs.literals()
    }
}
