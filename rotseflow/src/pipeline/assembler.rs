//! Turns a configuration into an [`ExecutionPlan`].

use super::plan::{ExecutionPlan, PlannedMonitor, PlannedStage, PlannedStep};
use super::registry::StageRegistry;
use crate::config::{PipelineConfig, StageConfig};
use crate::core::Capability;
use crate::errors::{ConfigurationError, RotseflowError, TypeIncompatibilityError};
use crate::external::StageServices;
use crate::stages::StageInit;
use tracing::{debug, info, warn};

/// Resolves every stage of `config` and checks that they chain.
///
/// Checks whose input does not match their step's output are dropped with a
/// warning; everything else that is wrong aborts assembly.
///
/// # Errors
///
/// - `ConfigurationError` for an empty pipeline or an unknown stage
/// - `TypeIncompatibilityError` when a processing stage cannot consume the
///   previous stage's output
/// - whatever a stage factory reports, typically `ParameterError`
pub fn assemble(
    config: &PipelineConfig,
    registry: &StageRegistry,
    services: &StageServices,
    input_capability: Capability,
) -> Result<ExecutionPlan, RotseflowError> {
    if config.pipeline.is_empty() {
        return Err(ConfigurationError::empty_pipeline().into());
    }

    let mut steps = Vec::with_capacity(config.pipeline.len());
    let mut offered = input_capability;
    let mut previous: Option<String> = None;

    for step in &config.pipeline {
        let processing = build_processing(&step.pa, registry, services)?;
        let stage = &processing.stage;

        if !stage.input_capability().accepts(offered) {
            return Err(TypeIncompatibilityError::new(
                processing.name.clone(),
                previous,
                stage.input_capability(),
                offered,
            )
            .into());
        }

        let produced = stage.output_capability();
        let mut monitors = Vec::with_capacity(step.qas.len());
        for qa in &step.qas {
            let monitor = build_monitor(qa, registry, services)?;
            if monitor.stage.input_capability().accepts(produced) {
                monitors.push(monitor);
            } else {
                warn!(
                    check = %monitor.name,
                    stage = %processing.name,
                    expected = %monitor.stage.input_capability(),
                    found = %produced,
                    "Incompatible QA, dropping it"
                );
            }
        }

        debug!(step = %step.step_name, stage = %processing.name, checks = monitors.len(), "Planned step");
        previous = Some(processing.name.clone());
        offered = produced;
        steps.push(PlannedStep {
            step_name: step.step_name.clone(),
            processing,
            monitors,
            output_file: step.output_file.clone(),
        });
    }

    info!(steps = steps.len(), input = %input_capability, output = %offered, "Pipeline assembled");
    Ok(ExecutionPlan {
        input_capability,
        steps,
        dump_intermediates: config.dump_intermediates,
    })
}

fn build_processing(
    config: &StageConfig,
    registry: &StageRegistry,
    services: &StageServices,
) -> Result<PlannedStage, RotseflowError> {
    let name = config.instance_name();
    let init = StageInit::new(name, &config.kwargs, services);
    let stage = registry.create_processing(&config.module_name, &config.class_name, &init)?;
    Ok(PlannedStage {
        name: name.to_string(),
        kwargs: config.kwargs.clone(),
        stage,
    })
}

fn build_monitor(
    config: &StageConfig,
    registry: &StageRegistry,
    services: &StageServices,
) -> Result<PlannedMonitor, RotseflowError> {
    let name = config.instance_name();
    let init = StageInit::new(name, &config.kwargs, services);
    let stage = registry.create_monitoring(&config.module_name, &config.class_name, &init)?;
    Ok(PlannedMonitor {
        name: name.to_string(),
        kwargs: config.kwargs.clone(),
        stage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StepConfig, QA_MODULE};
    use crate::testing::{MockMonitoringStage, MockProcessingStage, TEST_MODULE};
    use std::sync::Arc;

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        for (class, input, output) in [
            ("Find", Capability::Request, Capability::Images),
            ("Coadd", Capability::Images, Capability::Coadds),
            ("Phot", Capability::Differences, Capability::LightCurve),
        ] {
            registry.register_processing(TEST_MODULE, class, move |init| {
                let stage: Arc<dyn crate::stages::ProcessingStage> =
                    Arc::new(MockProcessingStage::new(init.name, input, output));
                Ok(stage)
            });
        }
        for (class, input) in [("ImageCheck", Capability::Images), ("CoaddCheck", Capability::Coadds)] {
            registry.register_monitoring(TEST_MODULE, class, move |init| {
                let stage: Arc<dyn crate::stages::MonitoringStage> =
                    Arc::new(MockMonitoringStage::new(init.name, input));
                Ok(stage)
            });
        }
        registry
    }

    fn step(pa: &str, qas: &[&str]) -> StepConfig {
        StepConfig {
            pa: StageConfig::new(TEST_MODULE, pa),
            qas: qas.iter().map(|qa| StageConfig::new(TEST_MODULE, *qa)).collect(),
            step_name: pa.to_string(),
            output_file: None,
        }
    }

    fn config(steps: Vec<StepConfig>) -> PipelineConfig {
        let mut config = crate::testing::fixtures::minimal_config();
        config.pipeline = steps;
        config
    }

    #[test]
    fn test_compatible_chain_assembles() {
        let plan = assemble(
            &config(vec![step("Find", &["ImageCheck"]), step("Coadd", &["CoaddCheck"])]),
            &registry(),
            &StageServices::new(),
            Capability::Request,
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.output_capability(), Capability::Coadds);
        assert_eq!(plan.check_names(), vec!["ImageCheck".to_string(), "CoaddCheck".to_string()]);
    }

    #[test]
    fn test_incompatible_chain_is_fatal() {
        let err = assemble(
            &config(vec![step("Find", &[]), step("Phot", &[])]),
            &registry(),
            &StageServices::new(),
            Capability::Request,
        )
        .unwrap_err();

        match err {
            RotseflowError::TypeIncompatibility(e) => {
                assert_eq!(e.stage, "Phot");
                assert_eq!(e.previous.as_deref(), Some("Find"));
                assert_eq!(e.found, Capability::Images);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_stage_checked_against_input() {
        let err = assemble(
            &config(vec![step("Coadd", &[])]),
            &registry(),
            &StageServices::new(),
            Capability::Request,
        )
        .unwrap_err();
        assert!(matches!(err, RotseflowError::TypeIncompatibility(ref e) if e.previous.is_none()));
    }

    #[test]
    fn test_incompatible_check_dropped() {
        let plan = assemble(
            &config(vec![step("Find", &["CoaddCheck", "ImageCheck"])]),
            &registry(),
            &StageServices::new(),
            Capability::Request,
        )
        .unwrap();

        assert_eq!(plan.check_names(), vec!["ImageCheck".to_string()]);
    }

    #[test]
    fn test_unknown_and_empty_are_configuration_errors() {
        let mut unknown = step("Find", &[]);
        unknown.qas.push(StageConfig::new(QA_MODULE, "Nope"));
        let err = assemble(&config(vec![unknown]), &registry(), &StageServices::new(), Capability::Request)
            .unwrap_err();
        assert!(matches!(err, RotseflowError::Configuration(_)));

        let err = assemble(&config(vec![]), &registry(), &StageServices::new(), Capability::Request).unwrap_err();
        assert_eq!(err.error_info().map(|i| i.code.as_str()), Some("CONFIG-003-EMPTY"));
    }
}
