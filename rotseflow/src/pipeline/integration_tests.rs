//! End-to-end runs of assembled pipelines.

use super::*;
use crate::config::{CompactConfig, KwArg, KwArgs, Nights, PipelineConfig, RunTarget, StageConfig};
use crate::core::{Capability, QaStatus, StageData};
use crate::errors::RotseflowError;
use crate::events::{CollectingEventSink, EventKind};
use crate::external::{FoundData, MockDataFinder, MockImageInspector, MockToolRunner, StageServices, ToolOutput};
use crate::stages::{MonitoringStage, ProcessingStage};
use crate::testing::{
    assert_check_ran, assert_status, assert_steps, minimal_config, mock_registry, sample_thresholds, test_step,
    MockMonitoringStage, MockProcessingStage, RecordingHeartbeat, TEST_MODULE,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn config_with(steps: Vec<crate::config::StepConfig>) -> PipelineConfig {
    let mut config = minimal_config();
    config.pipeline = steps;
    config
}

fn share_pa(registry: &mut StageRegistry, class: &str, stage: &Arc<MockProcessingStage>) {
    let stage = Arc::clone(stage);
    registry.register_processing(TEST_MODULE, class, move |_| {
        let stage: Arc<dyn ProcessingStage> = stage.clone();
        Ok(stage)
    });
}

fn share_qa(registry: &mut StageRegistry, class: &str, check: MockMonitoringStage) {
    let check = Arc::new(check);
    registry.register_monitoring(TEST_MODULE, class, move |_| {
        let check: Arc<dyn MonitoringStage> = check.clone();
        Ok(check)
    });
}

#[tokio::test]
async fn test_full_run_emits_events_and_records_steps() {
    let sink = Arc::new(CollectingEventSink::new());
    let heartbeat = RecordingHeartbeat::new();
    let engine = Engine::new()
        .with_event_sink(sink.clone())
        .with_heartbeat(Arc::new(heartbeat.clone()));
    let config = config_with(vec![test_step("Find", &["ImageCheck"]), test_step("Coadd", &["CoaddCheck"])]);

    let outcome = engine
        .run_config(&config, &mock_registry(), &StageServices::new())
        .await
        .unwrap();

    assert_steps(&outcome, &["FIND", "COADD"]);
    assert_eq!(outcome.output.capability, Capability::Coadds);
    assert_eq!(outcome.qa_results().count(), 2);
    assert!(outcome.finished_at >= outcome.started_at);
    assert_eq!(
        sink.kinds(),
        vec![
            EventKind::PipelineStarted,
            EventKind::StageStarted,
            EventKind::StageCompleted,
            EventKind::QaCompleted,
            EventKind::StageStarted,
            EventKind::StageCompleted,
            EventKind::QaCompleted,
            EventKind::PipelineCompleted,
        ]
    );

    let beats = heartbeat.events();
    assert_eq!(beats.first().map(String::as_str), Some("start:Running Find"));
    assert!(beats.contains(&"start:Running CoaddCheck".to_string()));
    assert!(beats.contains(&"stop:Step Find finished.".to_string()));
    assert_eq!(
        beats.last().map(String::as_str),
        Some("stop:Pipeline processing finished. Serializing result")
    );
}

#[tokio::test]
async fn test_monitoring_failure_is_not_fatal() {
    let mut registry = mock_registry();
    share_qa(
        &mut registry,
        "GoodCheck",
        MockMonitoringStage::new("GoodCheck", Capability::Images).with_metric("GOOD", 1),
    );
    share_qa(
        &mut registry,
        "BadCheck",
        MockMonitoringStage::new("BadCheck", Capability::Images)
            .with_metric("BAD", 1)
            .failing("no header"),
    );
    let sink = Arc::new(CollectingEventSink::new());
    let engine = Engine::new().with_event_sink(sink.clone());
    let config = config_with(vec![test_step("Find", &["BadCheck", "GoodCheck"])]);

    let outcome = engine
        .run_config(&config, &registry, &StageServices::new())
        .await
        .unwrap();

    assert_eq!(outcome.steps[0].failed_checks, vec!["BadCheck".to_string()]);
    let record = outcome.schema.step("Find").unwrap();
    assert!(record.metrics.contains_key("GOOD"));
    assert!(!record.metrics.contains_key("BAD"));
    assert_eq!(sink.of_kind(EventKind::QaFailed).len(), 1);
    assert_eq!(sink.of_kind(EventKind::PipelineCompleted).len(), 1);
}

#[tokio::test]
async fn test_processing_failure_stops_the_run() {
    let mut registry = mock_registry();
    let coadd = Arc::new(
        MockProcessingStage::new("Coadd", Capability::Images, Capability::Coadds).failing("coadd_all crashed"),
    );
    let extract = Arc::new(MockProcessingStage::new("Extract", Capability::Coadds, Capability::Catalogs));
    share_pa(&mut registry, "Coadd", &coadd);
    share_pa(&mut registry, "Extract", &extract);
    let sink = Arc::new(CollectingEventSink::new());
    let engine = Engine::new().with_event_sink(sink.clone());
    let config = config_with(vec![test_step("Find", &[]), test_step("Coadd", &[]), test_step("Extract", &[])]);

    let err = engine
        .run_config(&config, &registry, &StageServices::new())
        .await
        .unwrap_err();

    match err {
        RotseflowError::Execution(e) => {
            assert_eq!(e.stage, "Coadd");
            assert!(e.message.contains("coadd_all crashed"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(coadd.call_count(), 1);
    assert_eq!(extract.call_count(), 0);
    assert_eq!(sink.of_kind(EventKind::StageFailed).len(), 1);
    assert!(sink.of_kind(EventKind::PipelineCompleted).is_empty());
}

#[tokio::test]
async fn test_wrong_output_capability_is_execution_failure() {
    let mut registry = mock_registry();
    registry.register_processing(TEST_MODULE, "Liar", |init| {
        let stage: Arc<dyn ProcessingStage> = Arc::new(LyingStage(init.name.to_string()));
        Ok(stage)
    });
    let config = config_with(vec![test_step("Liar", &[])]);

    let err = Engine::new()
        .run_config(&config, &registry, &StageServices::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RotseflowError::Execution(ref e) if e.message.contains("declares images")));
}

#[derive(Debug)]
struct LyingStage(String);

#[async_trait::async_trait]
impl ProcessingStage for LyingStage {
    fn name(&self) -> &str {
        &self.0
    }

    fn input_capability(&self) -> Capability {
        Capability::Request
    }

    fn output_capability(&self) -> Capability {
        Capability::Images
    }

    async fn run(&self, _input: &StageData, _args: &crate::config::StageArgs) -> Result<StageData, RotseflowError> {
        Ok(StageData::new(Capability::Coadds))
    }
}

#[tokio::test]
async fn test_unresolved_reference_dropped_stage_still_runs() {
    let mut registry = mock_registry();
    let find = Arc::new(MockProcessingStage::new("Find", Capability::Request, Capability::Images));
    share_pa(&mut registry, "Find", &find);
    let mut step = test_step("Find", &[]);
    step.pa = step.pa.with_kwargs(
        KwArgs::new()
            .with("outdir", KwArg::reference("outdir"))
            .with("Night", KwArg::reference("night"))
            .with("Missing", KwArg::reference("nope")),
    );

    Engine::new()
        .run_config(&config_with(vec![step]), &registry, &StageServices::new())
        .await
        .unwrap();

    let recorded = find.recorded_args();
    let args = &recorded[0];
    assert_eq!(args.get_str("outdir"), Some("/tmp/rotseflow-test"));
    assert_eq!(args.get_str("Night"), Some("070810"));
    assert!(!args.contains("Missing"));
}

#[tokio::test]
async fn test_input_mismatch_fails_before_anything_runs() {
    let mut registry = mock_registry();
    let find = Arc::new(MockProcessingStage::new("Find", Capability::Request, Capability::Images));
    share_pa(&mut registry, "Find", &find);
    let plan = assemble(
        &config_with(vec![test_step("Find", &[])]),
        &registry,
        &StageServices::new(),
        Capability::Request,
    )
    .unwrap();

    let err = Engine::new()
        .run(&plan, PipelineContext::new(StageData::new(Capability::Coadds)))
        .await
        .unwrap_err();

    assert!(matches!(err, RotseflowError::TypeIncompatibility(_)));
    assert_eq!(find.call_count(), 0);
}

#[tokio::test]
async fn test_single_check_runs_one_stage_and_one_check() {
    let mut registry = mock_registry();
    let find = Arc::new(MockProcessingStage::new("Find", Capability::Request, Capability::Images));
    let coadd = Arc::new(MockProcessingStage::new("Coadd", Capability::Images, Capability::Coadds));
    share_pa(&mut registry, "Find", &find);
    share_pa(&mut registry, "Coadd", &coadd);
    let config = config_with(vec![
        test_step("Find", &["ImageCheck"]),
        test_step("Coadd", &["CoaddCheck", "OtherCheck"]),
    ]);
    share_qa(&mut registry, "OtherCheck", MockMonitoringStage::new("OtherCheck", Capability::Coadds));
    let plan = assemble(&config, &registry, &StageServices::new(), Capability::Request).unwrap();
    let input = StageData::new(Capability::Images).with_images(["070810_sks0246+3014_3b001.fit"]);

    let outcome = Engine::new()
        .run_single_check(&plan, "CoaddCheck", PipelineContext::new(input))
        .await
        .unwrap();

    assert_eq!(find.call_count(), 0);
    assert_eq!(coadd.call_count(), 1);
    assert_steps(&outcome, &["COADD"]);
    let names: Vec<&str> = outcome.qa_results().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["CoaddCheck"]);
}

#[tokio::test]
async fn test_single_check_unknown_name_lists_valid_checks() {
    let config = config_with(vec![test_step("Find", &["ImageCheck"])]);
    let plan = assemble(&config, &mock_registry(), &StageServices::new(), Capability::Request).unwrap();

    let err = Engine::new()
        .run_single_check(&plan, "Nope", PipelineContext::new(StageData::request()))
        .await
        .unwrap_err();

    let info = err.error_info().cloned().unwrap();
    assert_eq!(info.code, "CONFIG-004-UNKNOWN_CHECK");
    assert!(err.to_string().contains("ImageCheck"));
}

#[tokio::test]
async fn test_single_qa_setting_dispatches_single_check() {
    let mut config = config_with(vec![test_step("Find", &["ImageCheck"]), test_step("Coadd", &["CoaddCheck"])]);
    config.single_qa = Some("ImageCheck".to_string());

    let outcome = Engine::new()
        .run_config(&config, &mock_registry(), &StageServices::new())
        .await
        .unwrap();

    assert_steps(&outcome, &["FIND"]);
    assert_eq!(outcome.output.capability, Capability::Images);
}

#[tokio::test]
async fn test_single_qa_on_later_step_names_run_single_check() {
    let mut config = config_with(vec![test_step("Find", &["ImageCheck"]), test_step("Coadd", &["CoaddCheck"])]);
    config.single_qa = Some("CoaddCheck".to_string());

    let err = Engine::new()
        .run_config(&config, &mock_registry(), &StageServices::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RotseflowError::Configuration(_)));
    assert!(err.to_string().contains("Coadd"));
    let info = err.error_info().cloned().unwrap();
    assert_eq!(info.code, "CONFIG-005-SINGLE_CHECK_INPUT");
    assert!(info.fix_hint.unwrap().contains("run_single_check"));
}

#[tokio::test]
async fn test_run_config_drives_timer_heartbeat() {
    let mut config = config_with(vec![test_step("Find", &["ImageCheck"]), test_step("Coadd", &["CoaddCheck"])]);
    config.period = 0.01;
    config.timeout = 60.0;
    let heartbeat = Arc::new(TimerHeartbeat::spawn(config.heartbeat_settings()));

    Engine::new()
        .with_heartbeat(heartbeat.clone())
        .run_config(&config, &mock_registry(), &StageServices::new())
        .await
        .unwrap();

    assert_eq!(
        heartbeat.started_labels(),
        vec!["Running Find", "Running ImageCheck", "Running Coadd", "Running CoaddCheck"]
    );
    assert!(heartbeat.current_label().is_none());
}

#[tokio::test]
async fn test_configured_heartbeat_timeout_does_not_cancel() {
    let mut config = config_with(vec![test_step("Find", &["ImageCheck"])]);
    config.period = 0.001;
    config.timeout = 0.001;

    let outcome = Engine::from_config(&config)
        .unwrap()
        .run_config(&config, &mock_registry(), &StageServices::new())
        .await
        .unwrap();
    assert_steps(&outcome, &["FIND"]);

    let outcome = Engine::new()
        .run_config(&config, &mock_registry(), &StageServices::new())
        .await
        .unwrap();
    assert_check_ran(&outcome, "ImageCheck");
}

#[tokio::test]
async fn test_qafile_written_as_sorted_json() {
    let dir = tempfile::tempdir().unwrap();
    let qafile = dir.path().join("image_check.json");
    let mut step = test_step("Find", &[]);
    step.qas.push(
        StageConfig::new(TEST_MODULE, "ImageCheck").with_kwargs(
            KwArgs::new()
                .with("qafile", KwArg::literal(qafile.display().to_string()))
                .with("night", KwArg::reference("night")),
        ),
    );

    Engine::new()
        .run_config(&config_with(vec![step]), &mock_registry(), &StageServices::new())
        .await
        .unwrap();

    let text = std::fs::read_to_string(&qafile).unwrap();
    assert!(text.starts_with("{\n    \"METRICS\""));
    let written: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(written["QA"], "ImageCheck");
    assert_eq!(written["PARAMS"]["night"], "070810");
}

#[tokio::test]
async fn test_dump_intermediates_writes_step_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let output_file = dir.path().join("find.yaml");
    let mut step = test_step("Find", &["ImageCheck"]);
    step.output_file = Some(output_file.clone());
    let mut config = config_with(vec![step]);
    config.dump_intermediates = true;

    Engine::new()
        .run_config(&config, &mock_registry(), &StageServices::new())
        .await
        .unwrap();

    let dumped: serde_yaml::Value = serde_yaml::from_str(&std::fs::read_to_string(&output_file).unwrap()).unwrap();
    assert_eq!(dumped["ImageCheck"]["QA"], serde_yaml::Value::from("ImageCheck"));
}

#[tokio::test]
async fn test_checks_share_the_pass_through_map() {
    let config = config_with(vec![test_step("Find", &["ImageCheck"]), test_step("Coadd", &["CoaddCheck"])]);
    let plan = assemble(&config, &mock_registry(), &StageServices::new(), Capability::Request).unwrap();
    let context = PipelineContext::from_config(&config);

    let outcome = Engine::new().run(&plan, context).await.unwrap();

    assert_eq!(outcome.steps.len(), 2);
    assert!(outcome.steps.iter().all(|step| step.failed_checks.is_empty()));
}

#[tokio::test]
async fn test_threshold_fixture_drives_status() {
    let mut registry = mock_registry();
    share_qa(
        &mut registry,
        "Count",
        MockMonitoringStage::new("Count", Capability::Images).with_metric("COUNT", 10.5),
    );
    let mut step = test_step("Find", &[]);
    step.qas
        .push(StageConfig::new(TEST_MODULE, "Count").with_kwargs(sample_thresholds("COUNT")));

    let outcome = Engine::new()
        .run_config(&config_with(vec![step]), &registry, &StageServices::new())
        .await
        .unwrap();

    // The mock reports its metrics but leaves status to the caller.
    let result = assert_check_ran(&outcome, "Count");
    assert_status(result, QaStatus::Unknown);
    assert!(result.params.contains_key("refKey"));
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"SIMPLE  =                    T").unwrap();
    path
}

#[tokio::test]
async fn test_compact_config_runs_with_builtin_stages() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let image = touch(data.path(), "070810_sks0246+3014_3b001_c.fit");
    let orphan = touch(data.path(), "070810_sks0246+3014_3b002_c.fit");
    let catalog = touch(data.path(), "070810_sks0246+3014_3b001_cobj.fit");
    let coadd = out.path().join("coadd").join("070810_sks0246+3014_3b_c.fit");

    let mut finder = MockDataFinder::new();
    finder.expect_find().returning(move |_| {
        Ok(FoundData {
            images: vec![image.clone(), orphan.clone()],
            prods: vec![catalog.clone()],
            field: None,
        })
    });
    let mut runner = MockToolRunner::new();
    let produced = coadd.clone();
    runner
        .expect_run()
        .withf(|invocation| invocation.program == "coadd_all")
        .returning(move |_| Ok(ToolOutput::success(vec![produced.clone()])));
    let mut inspector = MockImageInspector::new();
    inspector.expect_median_pixel().returning(|_| Ok(1500.0));
    inspector.expect_header().returning(|_| {
        Ok(BTreeMap::from([
            ("EXPTIME".to_string(), serde_json::json!(60.0)),
            ("EXPNUM".to_string(), serde_json::json!(1)),
            ("DATE-OBS".to_string(), serde_json::json!("2007-08-10")),
        ]))
    });
    let services = StageServices::new()
        .with_data_finder(Arc::new(finder))
        .with_tool_runner(Arc::new(runner))
        .with_image_inspector(Arc::new(inspector));

    let compact = CompactConfig::from_yaml_str(
        r"
Flavor: science
Program: supernova
Period: 5.0
Timeout: 120.0
Pipeline: [Find_Data, Coaddition]
Algorithms:
  Find_Data:
    QA:
      Check_HDUs:
        PARAMS: {}
  Coaddition:
    QA:
      Count_Pixels:
        PARAMS:
          COUNT_NORMAL_RANGE: [-0.1, 0.1]
          COUNT_WARN_RANGE: [-0.2, 0.2]
          COUNT_REF: [1500.0]
",
    )
    .unwrap();
    let target = RunTarget::new(Nights::single("070810"))
        .with_field("sks0246+3014")
        .with_dirs(Some(data.path().to_path_buf()), Some(out.path().to_path_buf()), None);
    let config = compact.expand(&target).unwrap();

    let outcome = Engine::new()
        .run_config(&config, &StageRegistry::with_builtins(), &services)
        .await
        .unwrap();

    assert_steps(&outcome, &["FIND_DATA", "COADDITION"]);
    let find = outcome.schema.step("Find_Data").unwrap();
    assert_eq!(find.metrics["NIMAGES"], 1);
    assert_eq!(find.metrics["CHECKHDUS_STATUS"], "NORMAL");
    let coaddition = outcome.schema.step("Coaddition").unwrap();
    assert_eq!(coaddition.metrics["NCOADD"], 1);
    assert_eq!(coaddition.metrics["COUNT_STATUS"], "NORMAL");
    assert_eq!(coaddition.params["COUNT_REF"], serde_json::json!([1500.0]));
    assert!(out.path().join("preproc/image/070810_sks0246+3014_3b001_c.fit").exists());
    assert!(!out.path().join("preproc/image/070810_sks0246+3014_3b002_c.fit").exists());

    let json = outcome.schema.to_json_string().unwrap();
    let restored = crate::schema::PipelineSchema::from_json_str(&json).unwrap();
    assert_eq!(restored, outcome.schema);
}
