//! Timeout-bounded execution of candidate programs in throwaway directories.
//!
//! Every execution gets a fresh scratch directory that is removed before
//! [`Sandbox::execute`] returns, whatever the outcome. Files the candidate
//! leaves behind are captured into the result first.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::types::ExecutionResult;
use crate::io::process::run_command_with_timeout;

/// Message reported for executions that hit the wall-clock limit.
pub const TIMEOUT_MESSAGE: &str = "Execution timed out.";

/// Runs a candidate program in isolation.
pub trait Sandbox: Send + Sync {
    fn execute(&self, candidate: &str, timeout: Duration) -> ExecutionResult;
}

/// Interpreter invocation: program plus leading arguments. The entry file is appended last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Interpreter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from an argv-style list (`["python3", "-I"]`). Returns `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Sandbox that writes the candidate to a scratch directory and runs the interpreter on it.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    interpreter: Interpreter,
    entry_file: String,
    scratch_root: Option<PathBuf>,
    output_limit_bytes: usize,
}

impl ProcessSandbox {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            entry_file: "script.py".to_string(),
            scratch_root: None,
            output_limit_bytes: 1_000_000,
        }
    }

    pub fn with_entry_file(mut self, entry_file: impl Into<String>) -> Self {
        self.entry_file = entry_file.into();
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sandbox-");
        match &self.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)
                    .with_context(|| format!("create scratch root {}", root.display()))?;
                builder
                    .tempdir_in(root)
                    .with_context(|| format!("create scratch dir in {}", root.display()))
            }
            None => builder.tempdir().context("create scratch dir"),
        }
    }

    fn run_in(&self, dir: &Path, candidate: &str, timeout: Duration) -> Result<ExecutionResult> {
        let entry = dir.join(&self.entry_file);
        fs::write(&entry, candidate).with_context(|| format!("write {}", entry.display()))?;

        let mut cmd = self.interpreter.command();
        cmd.arg(&self.entry_file).current_dir(dir);
        let output = run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes, true)
            .with_context(|| format!("run interpreter {}", self.interpreter.program))?;

        if output.timed_out {
            return Ok(ExecutionResult::timeout(TIMEOUT_MESSAGE));
        }
        if !output.status.success() {
            let stderr = output.stderr_lossy();
            let message = if stderr.trim().is_empty() {
                match output.status.code() {
                    Some(code) => format!("process exited with status {code}"),
                    None => "process terminated by signal".to_string(),
                }
            } else {
                format!(
                    "{}{}",
                    stderr.trim_end(),
                    output.stderr_truncated_notice("candidate")
                )
            };
            return Ok(ExecutionResult::runtime_error(message));
        }

        let produced = collect_produced_files(dir, &self.entry_file)?;
        Ok(ExecutionResult::success(output.stdout_lossy(), produced))
    }
}

impl Sandbox for ProcessSandbox {
    #[instrument(skip_all, fields(stage = "execute", timeout_secs = timeout.as_secs()))]
    fn execute(&self, candidate: &str, timeout: Duration) -> ExecutionResult {
        let scratch = match self.scratch_dir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(err = %e, "failed to create scratch directory");
                return ExecutionResult::runtime_error(format!("{e:#}"));
            }
        };
        debug!(scratch = %scratch.path().display(), "created scratch directory");

        let result = match self.run_in(scratch.path(), candidate, timeout) {
            Ok(result) => result,
            Err(e) => {
                warn!(err = %e, "sandbox execution failed");
                ExecutionResult::runtime_error(format!("{e:#}"))
            }
        };

        // Early returns and panics are covered by TempDir's Drop; here removal failures get logged.
        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(scratch = %scratch_path.display(), err = %e, "failed to remove scratch directory");
        }

        info!(
            status = result.status.as_str(),
            produced_files = result.produced_files.len(),
            "execution finished"
        );
        result
    }
}

/// Read every regular file under `dir` except the entry file, keyed by `/`-separated relative path.
fn collect_produced_files(dir: &Path, entry_file: &str) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if key == entry_file {
            continue;
        }
        let bytes =
            fs::read(entry.path()).with_context(|| format!("read {}", entry.path().display()))?;
        files.insert(key, bytes);
    }
    Ok(files)
}
