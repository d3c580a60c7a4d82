//! The per-run output document.
//!
//! Each executed processing stage gets one [`StepRecord`] holding the
//! parameters and metrics its QA checks reported. The whole document
//! serializes as
//!
//! ```json
//! {
//!     "PIPELINE_STEPS": [
//!         {
//!             "METRICS": {},
//!             "PARAMS": {},
//!             "PIPELINE_STEP": "COADDITION"
//!         }
//!     ]
//! }
//! ```

mod merger;

pub use merger::{PipelineSchema, Section, StepHandle, StepRecord};

use crate::errors::RotseflowError;
use serde::Serialize;

/// Serializes `value` as JSON with sorted keys and 4-space indentation.
///
/// # Errors
///
/// Returns a serialization error if `value` cannot be represented as JSON.
pub fn to_sorted_json<T: Serialize + ?Sized>(value: &T) -> Result<String, RotseflowError> {
    // Going through `Value` sorts struct fields along with map keys.
    let value = serde_json::to_value(value)?;
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buffer).map_err(|e| RotseflowError::External(e.into()))
}
