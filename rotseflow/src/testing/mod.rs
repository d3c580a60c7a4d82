//! Testing utilities for rotseflow pipelines.
//!
//! This module provides:
//! - Mock processing and monitoring stages
//! - Configuration and registry fixtures
//! - Assertions for QA results and run outcomes

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{assert_check_ran, assert_metric, assert_status, assert_steps};
pub use fixtures::{minimal_config, mock_registry, sample_thresholds, test_step};
pub use mocks::{MockMonitoringStage, MockProcessingStage, RecordingHeartbeat};

/// Module namespace the fixtures register mock stages under.
pub const TEST_MODULE: &str = "rotseflow.testing";
