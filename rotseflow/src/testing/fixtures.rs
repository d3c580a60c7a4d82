//! Test fixtures for pipeline testing.

use crate::config::{KwArg, KwArgs, Nights, PipelineConfig, StageConfig, StepConfig};
use crate::core::Capability;
use crate::pipeline::StageRegistry;
use crate::stages::{MonitoringStage, ProcessingStage};
use std::path::PathBuf;
use std::sync::Arc;

use super::{MockMonitoringStage, MockProcessingStage, TEST_MODULE};

/// A valid run identity with no steps; tests fill in `pipeline`.
#[must_use]
pub fn minimal_config() -> PipelineConfig {
    PipelineConfig {
        night: Some(Nights::single("070810")),
        telescope: Some("3b".to_string()),
        field: Some("sks0246+3014".to_string()),
        program: Some("supernova".to_string()),
        flavor: None,
        ra: None,
        dec: None,
        datadir: None,
        outdir: Some(PathBuf::from("/tmp/rotseflow-test")),
        tempdir: None,
        period: 5.0,
        timeout: 120.0,
        dump_intermediates: false,
        single_qa: None,
        pipeline: Vec::new(),
    }
}

/// A step running `pa` from the test module, followed by `qas`.
#[must_use]
pub fn test_step(pa: &str, qas: &[&str]) -> StepConfig {
    StepConfig {
        pa: StageConfig::new(TEST_MODULE, pa),
        qas: qas.iter().map(|qa| StageConfig::new(TEST_MODULE, *qa)).collect(),
        step_name: pa.to_string(),
        output_file: None,
    }
}

/// Check arguments judging `key` against a reference of 10 with
/// relative deviation ranges of 10% and 20%.
#[must_use]
pub fn sample_thresholds(key: &str) -> KwArgs {
    KwArgs::new().with("refKey", KwArg::literal(key)).with(
        "param",
        KwArg::literal(serde_json::json!({
            format!("{key}_NORMAL_RANGE"): [-0.1, 0.1],
            format!("{key}_WARN_RANGE"): [-0.2, 0.2],
            format!("{key}_REF"): [10.0],
        })),
    )
}

/// A registry of mock stages chaining request to light curve.
///
/// Processing classes are `Find`, `Coadd`, `Extract` and `Phot`; checks are
/// `ImageCheck` and `CoaddCheck`.
#[must_use]
pub fn mock_registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    for (class, input, output) in [
        ("Find", Capability::Request, Capability::Images),
        ("Coadd", Capability::Images, Capability::Coadds),
        ("Extract", Capability::Coadds, Capability::Catalogs),
        ("Phot", Capability::Differences, Capability::LightCurve),
    ] {
        registry.register_processing(TEST_MODULE, class, move |init| {
            let stage: Arc<dyn ProcessingStage> = Arc::new(MockProcessingStage::new(init.name, input, output));
            Ok(stage)
        });
    }
    for (class, input) in [("ImageCheck", Capability::Images), ("CoaddCheck", Capability::Coadds)] {
        registry.register_monitoring(TEST_MODULE, class, move |init| {
            let stage: Arc<dyn MonitoringStage> = Arc::new(MockMonitoringStage::new(init.name, input));
            Ok(stage)
        });
    }
    registry
}
