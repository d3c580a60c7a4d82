//! QA status evaluation.
//!
//! - [`classify`]: threshold classification and aggregation
//! - [`evaluator`]: deviation computation and the status rules
//! - [`settings`]: per-check configuration read from keyword arguments
//! - [`result`]: the record a check produces

pub mod classify;
pub mod evaluator;
pub mod result;
pub mod settings;

pub use classify::{aggregate, classify, Range, Thresholds};
pub use evaluator::{composite, evaluate, fit_tolerance, DeviationMode, Evaluation, Rule};
pub use result::QaResult;
pub use settings::QaSettings;
