//! Agent abstraction for prompt-in, text-out collaborators.
//!
//! The [`Agent`] trait decouples the command-backed collaborators from the
//! actual backend. [`CommandAgent`] pipes the prompt to an external command on
//! stdin and returns its stdout. Tests use scripted agents that return
//! predetermined replies without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Abstraction over prompt-driven backends.
pub trait Agent: Send + Sync {
    /// Short label used in logs and error messages.
    fn name(&self) -> &str;

    /// Send `prompt` and return the raw reply.
    fn ask(&self, prompt: &str) -> Result<String>;
}

/// External command invocation for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentCommand {
    /// Program and arguments, e.g. `["llm", "-m", "gpt-4o"]`.
    pub command: Vec<String>,
    /// Wall-clock budget for one call.
    pub timeout_secs: u64,
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 300,
        }
    }
}

impl AgentCommand {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.command
            .first()
            .is_some_and(|program| !program.trim().is_empty())
    }
}

/// Agent that spawns an external command per call.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    name: String,
    spec: AgentCommand,
    output_limit_bytes: usize,
}

impl CommandAgent {
    pub fn new(name: impl Into<String>, spec: AgentCommand, output_limit_bytes: usize) -> Self {
        Self {
            name: name.into(),
            spec,
            output_limit_bytes,
        }
    }
}

impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(agent = %self.name, timeout_secs = self.spec.timeout_secs))]
    fn ask(&self, prompt: &str) -> Result<String> {
        let (program, args) = self
            .spec
            .command
            .split_first()
            .ok_or_else(|| anyhow!("{} agent has no command configured", self.name))?;
        info!(program = %program, prompt_bytes = prompt.len(), "invoking agent");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let timeout = Duration::from_secs(self.spec.timeout_secs);
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            timeout,
            self.output_limit_bytes,
            false,
        )
        .with_context(|| format!("run {} agent", self.name))?;

        if output.timed_out {
            warn!(timeout_secs = self.spec.timeout_secs, "agent timed out");
            return Err(anyhow!("{} agent timed out after {:?}", self.name, timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "{} agent failed with status {:?}: {}",
                self.name,
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }

        let reply = output.stdout_lossy();
        if reply.trim().is_empty() {
            return Err(anyhow!("{} agent returned an empty reply", self.name));
        }
        debug!(reply_bytes = reply.len(), "agent replied");
        Ok(reply)
    }
}
