//! A [`ToolRunner`] that spawns local processes.

use super::{ToolInvocation, ToolOutput, ToolRunner};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use glob::glob;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs programs with `tokio::process` and collects their outputs by glob.
#[derive(Debug, Clone, Default)]
pub struct CommandToolRunner {
    envs: Vec<(String, String)>,
}

impl CommandToolRunner {
    /// Creates a runner inheriting the current environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an environment variable for every spawned program.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl ToolRunner for CommandToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> anyhow::Result<ToolOutput> {
        debug!(command = %invocation, dir = ?invocation.working_dir, "Spawning tool");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", invocation.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            warn!(command = %invocation, status = ?output.status.code(), stderr = %stderr.trim(), "Tool exited with failure");
        }

        let base = invocation.working_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let outputs = collect_outputs(&base, &invocation.outputs)?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout,
            stderr,
            outputs,
        })
    }
}

/// Expands each pattern relative to `base`, returning sorted unique matches.
pub(crate) fn collect_outputs(base: &Path, patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for pattern in patterns {
        let full_pattern = base.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();
        let matches = glob(&pattern_str).map_err(|e| anyhow!("Invalid glob pattern '{pattern}': {e}"))?;
        found.extend(matches.filter_map(Result::ok));
    }
    found.sort();
    found.dedup();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_outputs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_c.fit", "a_c.fit", "a_cobj.fit"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let found = collect_outputs(dir.path(), &["*_c.fit".to_string()]).unwrap();
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();

        assert_eq!(names, vec!["a_c.fit", "b_c.fit"]);
    }

    #[test]
    fn test_collect_outputs_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_outputs(dir.path(), &["[".to_string()]).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let runner = CommandToolRunner::new();

        let ok = runner.run(&ToolInvocation::new("true")).await.unwrap();
        assert!(ok.succeeded());

        let failed = runner.run(&ToolInvocation::new("false")).await.unwrap();
        assert!(!failed.succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_collects_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = ToolInvocation::new("touch")
            .arg("coadd_000-000_c.fit")
            .in_dir(dir.path())
            .output("*_c.fit");

        let output = CommandToolRunner::new().run(&invocation).await.unwrap();

        assert!(output.succeeded());
        assert_eq!(output.outputs, vec![dir.path().join("coadd_000-000_c.fit")]);
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let result = CommandToolRunner::new()
            .run(&ToolInvocation::new("rotseflow-no-such-program"))
            .await;
        assert!(result.is_err());
    }
}
