//! Core domain model types for rotseflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - QA status and stage state enums
//! - Capability tags for stage chaining
//! - Stage data and metric values

mod capability;
mod data;
mod metric;
mod status;

pub use capability::Capability;
pub use data::StageData;
pub use metric::MetricValue;
pub use status::{QaStatus, StageState};
