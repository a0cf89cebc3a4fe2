//! Assembly of the loops and their collaborators from a [`CadloopConfig`].
//!
//! The CLI builds everything through this module so that a configured run, a
//! standalone validation and a standalone execution resolve modules and
//! sandbox settings the same way.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::agents::describer::{AgentDescriber, Describer, PassthroughDescriber};
use crate::agents::feedback::AgentFeedback;
use crate::agents::generator::{AgentGenerator, Generator};
use crate::agents::judge::AgentJudge;
use crate::coding::CodingLoop;
use crate::core::cancel::CancelToken;
use crate::core::error::ConfigError;
use crate::core::escalation::FractionEscalation;
use crate::core::types::{ExecutionResult, ExecutionStatus};
use crate::design::{DesignLoop, DesignOutcome};
use crate::io::agent::{AgentCommand, CommandAgent};
use crate::io::config::CadloopConfig;
use crate::io::history::{IterationLog, IterationPaths};
use crate::io::modules::ModuleIndex;
use crate::io::prompt::PromptEngine;
use crate::io::renderer::ExportRenderer;
use crate::io::sandbox::{Interpreter, ProcessSandbox};
use crate::validate::ValidationPipeline;

/// Sandbox configured from `[sandbox]`.
pub fn sandbox(cfg: &CadloopConfig) -> Result<ProcessSandbox, ConfigError> {
    let interpreter = Interpreter::from_argv(&cfg.sandbox.interpreter)
        .ok_or(ConfigError::EmptyCommand("sandbox.interpreter"))?;
    let mut sandbox = ProcessSandbox::new(interpreter)
        .with_entry_file(cfg.sandbox.entry_file.clone())
        .with_output_limit(cfg.sandbox.output_limit_bytes);
    if let Some(root) = &cfg.sandbox.scratch_root {
        sandbox = sandbox.with_scratch_root(root.clone());
    }
    Ok(sandbox)
}

/// Module index configured from `[validation]`. Probes the interpreter at most once.
pub fn module_index(cfg: &CadloopConfig, interpreter: &Interpreter) -> ModuleIndex {
    let index = if cfg.validation.discover_modules {
        ModuleIndex::discover(interpreter)
    } else {
        debug!("module discovery disabled, using builtin module table");
        ModuleIndex::stdlib_only()
    };
    index
        .with_search_paths(cfg.validation.search_paths.iter().cloned())
        .with_modules(cfg.validation.extra_modules.iter().cloned())
}

pub fn validation_pipeline(cfg: &CadloopConfig) -> Result<ValidationPipeline, ConfigError> {
    let sandbox = sandbox(cfg)?;
    Ok(ValidationPipeline::new(module_index(
        cfg,
        sandbox.interpreter(),
    )))
}

fn agent(name: &str, spec: &AgentCommand, cfg: &CadloopConfig) -> Box<CommandAgent> {
    Box::new(CommandAgent::new(
        name,
        spec.clone(),
        cfg.sandbox.output_limit_bytes,
    ))
}

/// Build the full design loop, writing history under `output_root`.
///
/// The same cancel token is handed to both loops.
pub fn design_loop(
    cfg: &CadloopConfig,
    output_root: &Path,
    cancel: CancelToken,
) -> Result<DesignLoop> {
    cfg.validate_for_run()?;
    let prompts = Arc::new(PromptEngine::new().context("load prompt templates")?);
    let sandbox = Arc::new(sandbox(cfg)?);
    let modules = module_index(cfg, sandbox.interpreter());
    let export_target = cfg.render.export_target.clone();

    let generator = AgentGenerator::new(
        agent("generator", &cfg.agents.generator, cfg),
        prompts.clone(),
        export_target.clone(),
    );
    let master = cfg.agents.master.as_ref().map(|spec| {
        Box::new(AgentGenerator::new(
            agent("master", spec, cfg),
            prompts.clone(),
            export_target.clone(),
        )) as Box<dyn Generator>
    });
    let describer: Box<dyn Describer> = match &cfg.agents.describer {
        Some(spec) => Box::new(AgentDescriber::new(
            agent("describer", spec, cfg),
            prompts.clone(),
        )),
        None => Box::new(PassthroughDescriber),
    };

    let coding = CodingLoop::builder()
        .generator(generator)
        .boxed_master(master)
        .validator(ValidationPipeline::new(modules))
        .sandbox(sandbox.clone())
        .escalation(FractionEscalation::new(
            cfg.coding.escalation_numerator,
            cfg.coding.escalation_denominator,
        )?)
        .test_timeout(Duration::from_secs(cfg.coding.test_timeout_secs))
        .cancel_token(cancel.clone())
        .build()?;

    let renderer = ExportRenderer::new(sandbox, prompts.clone())
        .with_export_template(cfg.render.export_template.clone())
        .with_export_target(export_target)
        .with_timeout(Duration::from_secs(cfg.render.timeout_secs));
    let feedback = AgentFeedback::new(agent("feedback", &cfg.agents.feedback, cfg), prompts.clone());
    let judge = AgentJudge::new(agent("judge", &cfg.agents.judge, cfg), prompts)
        .context("compile judge answer schemas")?;

    info!(output_root = %output_root.display(), has_master = cfg.agents.master.is_some(), "assembled design loop");
    Ok(DesignLoop::builder()
        .coding(coding)
        .boxed_describer(describer)
        .renderer(renderer)
        .feedback(feedback)
        .judge(judge)
        .history(IterationLog::spawn(output_root))
        .coding_iterations(cfg.coding.max_iterations)
        .render_format(cfg.render.format.clone())
        .cancel_token(cancel)
        .build()?)
}

/// JSON summary printed by `cadloop run`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub completed: bool,
    pub iterations: usize,
    pub output_dir: PathBuf,
    /// 1-based iteration whose directory holds the best candidate.
    pub best_iteration: Option<usize>,
    pub best_dir: Option<PathBuf>,
    pub best_score: Option<f64>,
    pub best_feedback: Option<String>,
    pub adoptions: Vec<AdoptionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdoptionSummary {
    pub iteration: usize,
    pub reason: &'static str,
}

impl RunSummary {
    pub fn from_outcome(outcome: &DesignOutcome, output_root: &Path) -> Self {
        let best_iteration = outcome.adoptions.last().map(|(iteration, _)| iteration + 1);
        Self {
            completed: outcome.completed,
            iterations: outcome.iterations,
            output_dir: output_root.to_path_buf(),
            best_iteration,
            best_dir: best_iteration.map(|n| IterationPaths::new(output_root, n).dir),
            best_score: outcome.best_feedback.as_ref().and_then(|f| f.score),
            best_feedback: outcome.best_feedback.as_ref().map(|f| f.text.clone()),
            adoptions: outcome
                .adoptions
                .iter()
                .map(|(iteration, reason)| AdoptionSummary {
                    iteration: iteration + 1,
                    reason: reason.as_str(),
                })
                .collect(),
        }
    }
}

/// JSON summary printed by `cadloop exec`. File contents are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecSummary {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub message: String,
    pub produced_files: Vec<String>,
}

impl From<&ExecutionResult> for ExecSummary {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            status: result.status,
            stdout: result.stdout.clone(),
            message: result.message.clone(),
            produced_files: result.produced_files.keys().cloned().collect(),
        }
    }
}
