//! Program generator collaborator.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::response::{extract_code, parse_plan};
use crate::core::types::Plan;
use crate::io::agent::Agent;
use crate::io::prompt::PromptEngine;

/// Synthesizes, repairs and plans candidate programs.
pub trait Generator: Send + Sync {
    fn generate(&self, goal: &str, plan: &Plan) -> Result<String>;

    fn fix(&self, code: &str, goal: &str, feedback: &str) -> Result<String>;

    fn plan(
        &self,
        goal: &str,
        feedback: Option<&str>,
        previous_plan: Option<&Plan>,
    ) -> Result<Plan>;
}

/// Generator that prompts an [`Agent`] and parses its markdown replies.
pub struct AgentGenerator {
    agent: Box<dyn Agent>,
    prompts: Arc<PromptEngine>,
    export_target: String,
}

impl AgentGenerator {
    pub fn new(
        agent: Box<dyn Agent>,
        prompts: Arc<PromptEngine>,
        export_target: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            prompts,
            export_target: export_target.into(),
        }
    }

    fn code_reply(&self, prompt: &str) -> Result<String> {
        let reply = self.agent.ask(prompt)?;
        let code = extract_code(&reply);
        if code.is_empty() {
            return Err(anyhow!("{} returned no code", self.agent.name()));
        }
        debug!(agent = self.agent.name(), code_bytes = code.len(), "extracted code");
        Ok(code)
    }
}

impl Generator for AgentGenerator {
    fn generate(&self, goal: &str, plan: &Plan) -> Result<String> {
        let prompt = self.prompts.generate(goal, plan, &self.export_target)?;
        self.code_reply(&prompt).context("generate code")
    }

    fn fix(&self, code: &str, goal: &str, feedback: &str) -> Result<String> {
        let prompt = self.prompts.fix(code, goal, feedback, &self.export_target)?;
        self.code_reply(&prompt).context("fix code")
    }

    fn plan(
        &self,
        goal: &str,
        feedback: Option<&str>,
        previous_plan: Option<&Plan>,
    ) -> Result<Plan> {
        let prompt = self.prompts.plan(goal, feedback, previous_plan)?;
        let reply = self.agent.ask(&prompt).context("plan code")?;
        Ok(parse_plan(&reply))
    }
}
