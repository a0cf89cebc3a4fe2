//! cadloop configuration stored as TOML (default `cadloop.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::io::agent::AgentCommand;
use crate::io::renderer::DEFAULT_EXPORT_TEMPLATE;

pub const DEFAULT_CONFIG_FILE: &str = "cadloop.toml";

/// Top-level configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CadloopConfig {
    pub design: DesignConfig,
    pub coding: CodingConfig,
    pub sandbox: SandboxConfig,
    pub validation: ValidationConfig,
    pub render: RenderConfig,
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DesignConfig {
    /// Outer loop ceiling.
    pub max_iterations: usize,
    /// Judge score at or above which the goal counts as achieved.
    pub stop_threshold: f64,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            stop_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodingConfig {
    /// Inner loop ceiling.
    pub max_iterations: usize,
    /// Timeout for the side-effect-free test run of each candidate.
    pub test_timeout_secs: u64,
    pub escalation_numerator: usize,
    pub escalation_denominator: usize,
}

impl Default for CodingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            test_timeout_secs: 10,
            escalation_numerator: 2,
            escalation_denominator: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter argv; the entry file is appended.
    pub interpreter: Vec<String>,
    pub entry_file: String,
    /// Parent for scratch directories. System temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    pub output_limit_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: vec!["python3".to_string()],
            entry_file: "script.py".to_string(),
            scratch_root: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Probe the interpreter for importable modules at startup.
    pub discover_modules: bool,
    /// Extra directories searched for third-party packages.
    pub search_paths: Vec<PathBuf>,
    /// Module names always treated as importable.
    pub extra_modules: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            discover_modules: true,
            search_paths: Vec::new(),
            extra_modules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    pub format: String,
    pub timeout_secs: u64,
    /// Variable holding the final part in generated code.
    pub export_target: String,
    /// minijinja template with `format`, `target` and `file_name` in scope.
    pub export_template: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            format: "stl".to_string(),
            timeout_secs: 60,
            export_target: "result".to_string(),
            export_template: DEFAULT_EXPORT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AgentsConfig {
    pub generator: AgentCommand,
    /// Higher-capability generator used after escalation. Optional.
    pub master: Option<AgentCommand>,
    /// Goal refinement. Goals pass through unchanged when unset.
    pub describer: Option<AgentCommand>,
    pub feedback: AgentCommand,
    pub judge: AgentCommand,
}

impl CadloopConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.design.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations("design.max_iterations"));
        }
        if !(0.0..=1.0).contains(&self.design.stop_threshold) {
            return Err(ConfigError::StopThreshold(
                self.design.stop_threshold.to_string(),
            ));
        }
        if self.coding.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations("coding.max_iterations"));
        }
        if self.coding.test_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("coding.test_timeout_secs"));
        }
        let (numerator, denominator) = (
            self.coding.escalation_numerator,
            self.coding.escalation_denominator,
        );
        if numerator == 0 || denominator == 0 || numerator > denominator {
            return Err(ConfigError::EscalationFraction {
                numerator,
                denominator,
            });
        }
        if self
            .sandbox
            .interpreter
            .first()
            .is_none_or(|program| program.trim().is_empty())
        {
            return Err(ConfigError::EmptyCommand("sandbox.interpreter"));
        }
        if self.render.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("render.timeout_secs"));
        }
        Ok(())
    }

    /// Like [`CadloopConfig::validate`], and additionally require the agents a full run needs.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        self.validate()?;
        for (name, agent) in [
            ("agents.generator", &self.agents.generator),
            ("agents.feedback", &self.agents.feedback),
            ("agents.judge", &self.agents.judge),
        ] {
            if !agent.is_configured() {
                return Err(ConfigError::MissingCollaborator(name));
            }
        }
        for (name, agent) in [
            ("agents.master", &self.agents.master),
            ("agents.describer", &self.agents.describer),
        ] {
            if agent.as_ref().is_some_and(|a| !a.is_configured()) {
                return Err(ConfigError::EmptyCommand(name));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CadloopConfig::default()`.
pub fn load_config(path: &Path) -> Result<CadloopConfig> {
    if !path.exists() {
        return Ok(CadloopConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CadloopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CadloopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => return Err(anyhow!("config path missing parent {}", path.display())),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
