//! Interfaces to the collaborators that do the actual astronomy.
//!
//! The core never decodes images or runs reduction math itself. Stages reach
//! the outside world through these traits:
//!
//! - [`DataFinder`] locates preprocessed images and catalogs
//! - [`ToolRunner`] invokes external reduction programs
//! - [`ImageInspector`] reads pixel statistics and header keys

mod command;

pub use command::CommandToolRunner;

use crate::config::Nights;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to look for when finding data.
#[derive(Debug, Clone, PartialEq)]
pub struct DataQuery {
    /// Night(s) to search.
    pub nights: Nights,
    /// Telescope id.
    pub telescope: String,
    /// Sky field, if known.
    pub field: Option<String>,
    /// Target right ascension, used to find the field when it is unknown.
    pub ra: Option<f64>,
    /// Target declination.
    pub dec: Option<f64>,
    /// Observing program.
    pub program: String,
    /// Where the data lives.
    pub datadir: Option<PathBuf>,
}

/// Files found for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoundData {
    /// Image files.
    pub images: Vec<PathBuf>,
    /// Catalog ("prod") files matching the images.
    pub prods: Vec<PathBuf>,
    /// The field the data belongs to, when resolved from coordinates.
    pub field: Option<String>,
}

/// Locates preprocessed data for a night range, telescope and field.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataFinder: Send + Sync {
    /// Finds the images and catalogs matching `query`.
    async fn find(&self, query: &DataQuery) -> anyhow::Result<FoundData>;
}

/// One invocation of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program to run.
    pub program: String,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Glob patterns, relative to the working directory, naming the files
    /// the program produces.
    pub outputs: Vec<String>,
}

impl ToolInvocation {
    /// Creates an invocation with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an output pattern.
    #[must_use]
    pub fn output(mut self, pattern: impl Into<String>) -> Self {
        self.outputs.push(pattern.into());
        self
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What an external program left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Files matching the invocation's output patterns, sorted.
    pub outputs: Vec<PathBuf>,
}

impl ToolOutput {
    /// A successful run that produced `outputs`.
    #[must_use]
    pub fn success(outputs: Vec<PathBuf>) -> Self {
        Self {
            exit_code: Some(0),
            outputs,
            ..Self::default()
        }
    }

    /// Returns true if the program exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external reduction programs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs `invocation` to completion.
    ///
    /// A non-zero exit is reported through [`ToolOutput::exit_code`], not
    /// as an error; errors mean the program could not be run at all.
    async fn run(&self, invocation: &ToolInvocation) -> anyhow::Result<ToolOutput>;
}

/// Reads image statistics and headers.
#[cfg_attr(test, mockall::automock)]
pub trait ImageInspector: Send + Sync {
    /// Median pixel value of the primary image.
    fn median_pixel(&self, image: &Path) -> anyhow::Result<f64>;

    /// Primary header keys and values.
    fn header(&self, image: &Path) -> anyhow::Result<BTreeMap<String, serde_json::Value>>;
}

/// The collaborators available to built-in stages.
#[derive(Clone, Default)]
pub struct StageServices {
    /// File discovery.
    pub data_finder: Option<Arc<dyn DataFinder>>,
    /// External programs.
    pub tool_runner: Option<Arc<dyn ToolRunner>>,
    /// Image inspection.
    pub image_inspector: Option<Arc<dyn ImageInspector>>,
}

impl StageServices {
    /// No collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data finder.
    #[must_use]
    pub fn with_data_finder(mut self, finder: Arc<dyn DataFinder>) -> Self {
        self.data_finder = Some(finder);
        self
    }

    /// Sets the tool runner.
    #[must_use]
    pub fn with_tool_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.tool_runner = Some(runner);
        self
    }

    /// Sets the image inspector.
    #[must_use]
    pub fn with_image_inspector(mut self, inspector: Arc<dyn ImageInspector>) -> Self {
        self.image_inspector = Some(inspector);
        self
    }

    /// Uses [`CommandToolRunner`] for external programs.
    #[must_use]
    pub fn with_command_runner(self) -> Self {
        self.with_tool_runner(Arc::new(CommandToolRunner::new()))
    }
}

impl fmt::Debug for StageServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageServices")
            .field("data_finder", &self.data_finder.is_some())
            .field("tool_runner", &self.tool_runner.is_some())
            .field("image_inspector", &self.image_inspector.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let invocation = ToolInvocation::new("sex")
            .arg("image_c.fit")
            .arg("-c")
            .arg("rotse3.sex")
            .in_dir("/tmp/coadd")
            .output("prod/*_sobj.fit");

        assert_eq!(invocation.to_string(), "sex image_c.fit -c rotse3.sex");
        assert_eq!(invocation.outputs, vec!["prod/*_sobj.fit".to_string()]);
    }

    #[test]
    fn test_tool_output_success() {
        assert!(ToolOutput::success(vec![]).succeeded());
        assert!(!ToolOutput::default().succeeded());
    }

    #[test]
    fn test_services_debug_hides_collaborators() {
        let services = StageServices::new().with_command_runner();
        let debug = format!("{services:?}");
        assert!(debug.contains("tool_runner: true"));
        assert!(debug.contains("data_finder: false"));
    }
}
