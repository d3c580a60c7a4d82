//! Sequential execution of an assembled plan.

use super::assembler::assemble;
use super::context::PipelineContext;
use super::heartbeat::{Heartbeat, NoOpHeartbeat, TimerHeartbeat};
use super::plan::{ExecutionPlan, PlannedMonitor, PlannedStep};
use super::registry::StageRegistry;
use crate::config::PipelineConfig;
use crate::core::{Capability, StageData, StageState};
use crate::errors::{ConfigurationError, ExecutionError, RotseflowError, TypeIncompatibilityError};
use crate::events::{EventKind, EventSink, NoOpEventSink};
use crate::external::StageServices;
use crate::observability::SpanTimer;
use crate::qa::QaResult;
use crate::schema::{to_sorted_json, PipelineSchema};
use crate::stages::MonitorInput;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened in one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    /// Step name from the configuration.
    pub step_name: String,
    /// Processing stage instance name.
    pub stage: String,
    /// Final state of the processing stage.
    pub state: StageState,
    /// Results of the checks that ran.
    pub qa_results: Vec<QaResult>,
    /// Names of the checks that failed to run.
    pub failed_checks: Vec<String>,
    /// Wall-clock time of the whole step.
    pub duration_ms: u64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Merged parameters and metrics, one record per executed step.
    pub schema: PipelineSchema,
    /// Per-step outcomes, in execution order.
    pub steps: Vec<StepOutcome>,
    /// Output of the last processing stage.
    pub output: StageData,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    /// All QA results of the run, in execution order.
    pub fn qa_results(&self) -> impl Iterator<Item = &QaResult> {
        self.steps.iter().flat_map(|step| step.qa_results.iter())
    }

    /// The result of the named check, if it ran.
    #[must_use]
    pub fn qa_result(&self, check: &str) -> Option<&QaResult> {
        self.qa_results().find(|result| result.name == check)
    }
}

/// Runs plans one stage at a time.
///
/// Without an explicit heartbeat, [`Engine::run_config`] spawns a
/// [`TimerHeartbeat`] from the configured period and timeout, and the other
/// entry points stay silent.
#[derive(Clone)]
pub struct Engine {
    sink: Arc<dyn EventSink>,
    heartbeat: Option<Arc<dyn Heartbeat>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            sink: Arc::new(NoOpEventSink),
            heartbeat: None,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

struct StepRun<'a> {
    step: &'a PlannedStep,
    only_check: Option<&'a str>,
    dump_intermediates: bool,
}

impl Engine {
    /// An engine that reports nowhere.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the heartbeat.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Arc<dyn Heartbeat>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// An engine whose heartbeat runs with the configured `Period` and
    /// `Timeout`. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the heartbeat settings are invalid.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, RotseflowError> {
        let settings = config.heartbeat_settings();
        settings.validate()?;
        Ok(Self::new().with_heartbeat(Arc::new(TimerHeartbeat::spawn(settings))))
    }

    /// Validates, assembles and runs a configuration.
    ///
    /// A [`TimerHeartbeat`] built from the configuration watches the run
    /// unless a heartbeat was set explicitly.
    ///
    /// When `SingleQA` is set only that check runs, on the run request. This
    /// only works for checks of a step consuming [`Capability::Request`];
    /// any other check needs [`Engine::run_single_check`] with a context
    /// holding its step's input.
    ///
    /// # Errors
    ///
    /// Returns any configuration, assembly or execution error. A `SingleQA`
    /// check whose step does not consume the request is a `ConfigurationError`.
    pub async fn run_config(
        &self,
        config: &PipelineConfig,
        registry: &StageRegistry,
        services: &StageServices,
    ) -> Result<RunOutcome, RotseflowError> {
        config.validate()?;
        let plan = assemble(config, registry, services, Capability::Request)?;
        let context = PipelineContext::from_config(config);
        let engine = match self.config_heartbeat(config) {
            Some(heartbeat) => self.clone().with_heartbeat(heartbeat),
            None => self.clone(),
        };
        match config.single_qa.as_deref() {
            Some(check) => {
                if let Some(step) = plan.step_for_check(check) {
                    let accepted = step.processing.stage.input_capability();
                    if !accepted.accepts(context.input.capability) {
                        return Err(ConfigurationError::single_check_input(check, &step.step_name, accepted).into());
                    }
                }
                engine.run_single_check(&plan, check, context).await
            }
            None => engine.run(&plan, context).await,
        }
    }

    fn config_heartbeat(&self, config: &PipelineConfig) -> Option<Arc<TimerHeartbeat>> {
        if self.heartbeat.is_some() {
            return None;
        }
        Some(Arc::new(TimerHeartbeat::spawn(config.heartbeat_settings())))
    }

    fn heartbeat(&self) -> &dyn Heartbeat {
        match &self.heartbeat {
            Some(heartbeat) => heartbeat.as_ref(),
            None => &NoOpHeartbeat,
        }
    }

    /// Runs every step of `plan`.
    ///
    /// A failing processing stage ends the run with an error; a failing check
    /// is logged and left out of its step's record.
    ///
    /// # Errors
    ///
    /// - `TypeIncompatibilityError` if the context input does not match the plan
    /// - `ExecutionError` if a processing stage fails
    pub async fn run(&self, plan: &ExecutionPlan, context: PipelineContext) -> Result<RunOutcome, RotseflowError> {
        let Some(first) = plan.steps.first() else {
            return Err(ConfigurationError::empty_pipeline().into());
        };
        check_input(&first.processing.name, plan.input_capability, context.input.capability)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, steps = plan.len(), "Starting pipeline run");
        self.sink
            .emit(EventKind::PipelineStarted, serde_json::json!({"run_id": run_id, "steps": plan.len()}))
            .await;

        let PipelineContext {
            values,
            input,
            mut shared,
        } = context;
        let mut schema = PipelineSchema::new();
        let mut steps = Vec::with_capacity(plan.len());
        let mut current = input;

        for step in &plan.steps {
            let run = StepRun {
                step,
                only_check: None,
                dump_intermediates: plan.dump_intermediates,
            };
            let (output, outcome) = self.run_step(run, &values, &current, &mut shared, &mut schema).await?;
            current = output;
            steps.push(outcome);
        }

        self.finish(run_id, started_at, schema, steps, current).await
    }

    /// Runs one check: its step's processing stage on `context.input`, then
    /// that check alone. The schema holds exactly one record.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError` listing the valid names if no step runs `check`
    /// - `TypeIncompatibilityError` if the input does not match the stage
    /// - `ExecutionError` if the processing stage fails
    pub async fn run_single_check(
        &self,
        plan: &ExecutionPlan,
        check: &str,
        context: PipelineContext,
    ) -> Result<RunOutcome, RotseflowError> {
        let step = plan
            .step_for_check(check)
            .ok_or_else(|| ConfigurationError::unknown_check(check, &plan.check_names()))?;
        check_input(
            &step.processing.name,
            step.processing.stage.input_capability(),
            context.input.capability,
        )?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, check, step = %step.step_name, "Running single check");
        self.sink
            .emit(EventKind::PipelineStarted, serde_json::json!({"run_id": run_id, "check": check}))
            .await;

        let PipelineContext {
            values,
            input,
            mut shared,
        } = context;
        let mut schema = PipelineSchema::new();
        let run = StepRun {
            step,
            only_check: Some(check),
            dump_intermediates: plan.dump_intermediates,
        };
        let (output, outcome) = self.run_step(run, &values, &input, &mut shared, &mut schema).await?;

        self.finish(run_id, started_at, schema, vec![outcome], output).await
    }

    async fn finish(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        schema: PipelineSchema,
        steps: Vec<StepOutcome>,
        output: StageData,
    ) -> Result<RunOutcome, RotseflowError> {
        self.heartbeat().stop("Pipeline processing finished. Serializing result");
        let failed_checks: usize = steps.iter().map(|step| step.failed_checks.len()).sum();
        self.sink
            .emit(
                EventKind::PipelineCompleted,
                serde_json::json!({"run_id": run_id, "steps": steps.len(), "failed_checks": failed_checks}),
            )
            .await;

        Ok(RunOutcome {
            run_id,
            schema,
            steps,
            output,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_step(
        &self,
        run: StepRun<'_>,
        values: &serde_json::Map<String, serde_json::Value>,
        input: &StageData,
        shared: &mut serde_json::Map<String, serde_json::Value>,
        schema: &mut PipelineSchema,
    ) -> Result<(StageData, StepOutcome), RotseflowError> {
        let StepRun {
            step,
            only_check,
            dump_intermediates,
        } = run;
        let processing = &step.processing;
        let timer = SpanTimer::start(&step.step_name);
        info!(step = %step.step_name, "Starting to run step");

        let args = processing.kwargs.resolve(values, &processing.name);
        debug!(stage = %processing.name, state = %StageState::Running, "Stage state");
        self.sink
            .emit(EventKind::StageStarted, serde_json::json!({"step": step.step_name, "stage": processing.name}))
            .await;
        self.heartbeat().start(&format!("Running {}", processing.name));

        let output = match processing.stage.run(input, &args).await {
            Ok(output) if output.capability == processing.stage.output_capability() => output,
            Ok(output) => {
                let expected = processing.stage.output_capability();
                let err = ExecutionError::new(
                    &processing.name,
                    format!("produced {} but declares {expected}", output.capability),
                );
                return Err(self.stage_failed(step, err.into()).await);
            }
            Err(err) => return Err(self.stage_failed(step, err).await),
        };
        debug!(stage = %processing.name, state = %StageState::Succeeded, "Stage state");
        self.sink
            .emit(
                EventKind::StageCompleted,
                serde_json::json!({"step": step.step_name, "stage": processing.name, "elapsed_ms": timer.elapsed_ms()}),
            )
            .await;

        let mut qa_results = Vec::new();
        let mut failed_checks = Vec::new();
        let monitors = step
            .monitors
            .iter()
            .filter(|monitor| only_check.map_or(true, |check| monitor.name == check));
        for monitor in monitors {
            let monitor_input = MonitorInput {
                current: &output,
                previous: Some(input),
                shared: &mut *shared,
            };
            match self.run_monitor(monitor, values, monitor_input).await {
                Ok(result) => qa_results.push(result),
                Err(err) => {
                    warn!(check = %monitor.name, error = %err, "Failed to run QA");
                    self.sink
                        .emit(EventKind::QaFailed, serde_json::json!({"check": monitor.name, "error": err.to_string()}))
                        .await;
                    failed_checks.push(monitor.name.clone());
                }
            }
        }

        let mut record = schema.add_step(&step.step_name);
        record.add_metrics(output.metrics.clone());
        for result in &qa_results {
            record.add_params(result.params.clone());
            record.add_metrics(result.metrics.clone());
        }

        if dump_intermediates {
            if let Some(path) = &step.output_file {
                if let Err(err) = dump_results(path, &qa_results).await {
                    warn!(step = %step.step_name, path = %path.display(), error = %err, "Can't dump step results");
                }
            }
        }

        self.heartbeat().stop(&format!("Step {} finished.", step.step_name));
        let outcome = StepOutcome {
            step_name: step.step_name.clone(),
            stage: processing.name.clone(),
            state: StageState::Succeeded,
            qa_results,
            failed_checks,
            duration_ms: timer.finish(),
        };
        Ok((output, outcome))
    }

    async fn run_monitor(
        &self,
        monitor: &PlannedMonitor,
        values: &serde_json::Map<String, serde_json::Value>,
        input: MonitorInput<'_>,
    ) -> Result<QaResult, RotseflowError> {
        let args = monitor.kwargs.resolve(values, &monitor.name);
        self.heartbeat().start(&format!("Running {}", monitor.name));

        let result = monitor.stage.run(input, &args).await?;
        if let Some(qafile) = args.get_path("qafile") {
            write_qa_file(&qafile, &result).await?;
        }

        self.sink
            .emit(
                EventKind::QaCompleted,
                serde_json::json!({"check": monitor.name, "status": result.status}),
            )
            .await;
        Ok(result)
    }

    async fn stage_failed(&self, step: &PlannedStep, err: RotseflowError) -> RotseflowError {
        let name = &step.processing.name;
        error!(stage = %name, state = %StageState::Failed, error = %err, "Failed to run PA");
        self.sink
            .emit(EventKind::StageFailed, serde_json::json!({"step": step.step_name, "stage": name, "error": err.to_string()}))
            .await;
        self.heartbeat().stop(&format!("Step {} failed.", step.step_name));
        match err {
            RotseflowError::Execution(_) => err,
            other => ExecutionError::new(name, other.to_string()).into(),
        }
    }
}

fn check_input(stage: &str, expected: Capability, found: Capability) -> Result<(), TypeIncompatibilityError> {
    if expected.accepts(found) {
        Ok(())
    } else {
        Err(TypeIncompatibilityError::new(stage, None, expected, found))
    }
}

/// Writes one QA result as sorted, indented JSON.
async fn write_qa_file(path: &Path, result: &QaResult) -> Result<(), RotseflowError> {
    tokio::fs::write(path, to_sorted_json(result)?).await?;
    debug!(check = %result.name, path = %path.display(), "Wrote QA file");
    Ok(())
}

/// Writes a step's QA results as YAML, keyed by check name.
async fn dump_results(path: &Path, results: &[QaResult]) -> Result<(), RotseflowError> {
    let yaml = {
        let by_name: BTreeMap<&str, &QaResult> = results.iter().map(|result| (result.name.as_str(), result)).collect();
        serde_yaml::to_string(&by_name)?
    };
    tokio::fs::write(path, yaml).await?;
    info!(path = %path.display(), "Dumped step QA results");
    Ok(())
}
