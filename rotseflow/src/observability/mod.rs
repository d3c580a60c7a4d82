//! Logging setup and timing helpers.
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_logging`] once.

mod logging;
mod timer;

pub use logging::{init_logging, LogFormat, LogSettings, DEFAULT_FILTER};
pub use timer::SpanTimer;
