//! Error types for the rotseflow pipeline.
//!
//! Fatal categories (configuration, type incompatibility, execution) stop a
//! run and surface to the caller. QA failures and reference problems are
//! absorbed where they happen and only show up in logs and status fields.

use crate::core::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The main error type for rotseflow operations.
#[derive(Debug, Error)]
pub enum RotseflowError {
    /// The pipeline configuration is invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Two chained stages do not agree on the data they exchange.
    #[error("{0}")]
    TypeIncompatibility(#[from] TypeIncompatibilityError),

    /// A stage rejected its keyword configuration.
    #[error("{0}")]
    Parameter(#[from] ParameterError),

    /// Reference data required by a stage is missing.
    #[error("{0}")]
    Reference(#[from] ReferenceError),

    /// A processing stage failed while running.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// An external collaborator (tool, file finder, inspector) failed.
    #[error("External collaborator failed: {0}")]
    External(#[from] anyhow::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RotseflowError {
    /// Returns true for categories that abort a run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::TypeIncompatibility(_)
                | Self::Parameter(_)
                | Self::Execution(_)
        )
    }

    /// Process exit code for this error when it ends a run.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Parameter(_) | Self::Yaml(_) => 2,
            Self::TypeIncompatibility(_) => 3,
            Self::Execution(_) => 4,
            Self::Reference(_)
            | Self::External(_)
            | Self::Serialization(_)
            | Self::Io(_) => 1,
        }
    }

    /// Returns the structured error info, when the variant carries one.
    #[must_use]
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Configuration(e) => e.error_info.as_ref(),
            Self::TypeIncompatibility(e) => Some(&e.error_info),
            _ => None,
        }
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "CONFIG-001-UNKNOWN_STAGE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        serde_json::Value::Object(map)
    }
}

/// Error raised when the pipeline configuration cannot be turned into a plan.
#[derive(Debug, Clone, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The stage involved, if any.
    pub stage: Option<String>,
    /// Optional structured info.
    pub error_info: Option<ErrorInfo>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: None,
            error_info: None,
        }
    }

    /// Sets the stage involved.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the structured error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// A stage name that no registry entry resolves.
    #[must_use]
    pub fn unknown_stage(module: &str, class: &str) -> Self {
        Self::new(format!("Failed to resolve {class} from {module}"))
            .with_stage(class)
            .with_error_info(
                ErrorInfo::new(
                    "CONFIG-001-UNKNOWN_STAGE",
                    format!("No implementation registered for {module}.{class}"),
                )
                .with_fix_hint(ErrorSuggestions::get("CONFIG-001-UNKNOWN_STAGE").unwrap_or_default())
                .with_context_entry("module", module)
                .with_context_entry("class", class),
            )
    }

    /// A required configuration key is absent.
    #[must_use]
    pub fn missing_key(key: &str) -> Self {
        Self::new(format!("Config is missing \"{key}\" key"))
            .with_error_info(
                ErrorInfo::new("CONFIG-002-MISSING_KEY", format!("Missing \"{key}\" key"))
                    .with_context_entry("key", key),
            )
    }
}

impl ConfigurationError {
    /// The pipeline lists no steps.
    #[must_use]
    pub fn empty_pipeline() -> Self {
        Self::new("Pipeline has no steps").with_error_info(
            ErrorInfo::new("CONFIG-003-EMPTY", "Empty pipeline")
                .with_fix_hint(ErrorSuggestions::get("CONFIG-003-EMPTY").unwrap_or_default()),
        )
    }

    /// A single check was requested that no step configures.
    #[must_use]
    pub fn unknown_check(name: &str, valid: &[String]) -> Self {
        Self::new(format!("Unknown input QA {name}. Valid QAs are: {}", valid.join(", ")))
            .with_stage(name)
            .with_error_info(
                ErrorInfo::new("CONFIG-004-UNKNOWN_CHECK", format!("No step runs check {name}"))
                    .with_fix_hint(ErrorSuggestions::get("CONFIG-004-UNKNOWN_CHECK").unwrap_or_default())
                    .with_context_entry("valid", valid.join(", ")),
            )
    }

    /// `SingleQA` names a check whose step cannot start from the run request.
    #[must_use]
    pub fn single_check_input(name: &str, step: &str, accepted: Capability) -> Self {
        Self::new(format!(
            "SingleQA {name} runs after step {step}, which consumes {accepted}; \
             a configured run only supplies the request"
        ))
        .with_stage(name)
        .with_error_info(
            ErrorInfo::new(
                "CONFIG-005-SINGLE_CHECK_INPUT",
                format!("Step {step} of check {name} needs {accepted} input"),
            )
            .with_fix_hint(ErrorSuggestions::get("CONFIG-005-SINGLE_CHECK_INPUT").unwrap_or_default())
            .with_context_entry("step", step)
            .with_context_entry("accepts", accepted.to_string()),
        )
    }
}

/// Error raised when a stage cannot consume what the previous stage produces.
#[derive(Debug, Clone, Error)]
#[error(
    "Can't connect input of {stage} to output of {}: expected {expected}, got {found}",
    previous.as_deref().unwrap_or("pipeline input")
)]
pub struct TypeIncompatibilityError {
    /// The stage whose input does not match.
    pub stage: String,
    /// The upstream stage, `None` for the pipeline's initial input.
    pub previous: Option<String>,
    /// The capability the stage accepts.
    pub expected: Capability,
    /// The capability actually offered.
    pub found: Capability,
    /// Structured info.
    pub error_info: ErrorInfo,
}

impl TypeIncompatibilityError {
    /// Creates a new type incompatibility error.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        previous: Option<String>,
        expected: Capability,
        found: Capability,
    ) -> Self {
        let stage = stage.into();
        let info = ErrorInfo::new(
            "PLAN-001-INCOMPATIBLE",
            format!("{stage} accepts {expected} but receives {found}"),
        )
        .with_fix_hint(ErrorSuggestions::get("PLAN-001-INCOMPATIBLE").unwrap_or_default());

        Self {
            stage,
            previous,
            expected,
            found,
            error_info: info,
        }
    }
}

/// Error raised when a stage's keyword configuration is invalid.
#[derive(Debug, Clone, Error)]
#[error("Parameter Exception: {value:?}")]
pub struct ParameterError {
    /// Description of the invalid parameter.
    pub value: String,
}

impl ParameterError {
    /// Creates a new parameter error.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    /// A required keyword argument was not supplied.
    #[must_use]
    pub fn missing(stage: &str, key: &str) -> Self {
        Self::new(format!("{stage} requires keyword argument '{key}'"))
    }
}

/// Error raised when reference data for a stage cannot be found.
#[derive(Debug, Clone, Error)]
#[error("Reference Exception: {value:?}")]
pub struct ReferenceError {
    /// Description of the missing reference.
    pub value: String,
}

impl ReferenceError {
    /// Creates a new reference error.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// Error raised when a processing stage fails during a run.
#[derive(Debug, Clone, Error)]
#[error("Failed to run PA {stage}: {message}")]
pub struct ExecutionError {
    /// The stage that failed.
    pub stage: String,
    /// The underlying failure.
    pub message: String,
}

impl ExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Provides default suggestions for common error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONFIG-001-UNKNOWN_STAGE" => Some(
                "Check ClassName and ModuleName in the pipeline configuration. \
                 Custom stages must be registered before assembly.",
            ),
            "CONFIG-002-MISSING_KEY" => Some(
                "Add the key to the configuration file or generate the file from a compact config.",
            ),
            "CONFIG-003-EMPTY" => Some("Add at least one step to the Pipeline list."),
            "CONFIG-004-UNKNOWN_CHECK" => Some("Set SingleQA to the Name (or ClassName) of a configured check."),
            "CONFIG-005-SINGLE_CHECK_INPUT" => Some(
                "Only checks of a step consuming the request run from SingleQA. \
                 Call Engine::run_single_check with a context holding that step's input instead.",
            ),
            "PLAN-001-INCOMPATIBLE" => Some(
                "Reorder the pipeline steps so each stage consumes what the previous one produces.",
            ),
            _ => None,
        }
    }
}
