//! Visual feedback collaborator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::io::agent::Agent;
use crate::io::prompt::PromptEngine;

/// Critiques produced artifacts against the goal.
pub trait VisualFeedback: Send + Sync {
    fn compare(
        &self,
        goal: &str,
        reference_images: &[PathBuf],
        produced_snapshots: &[PathBuf],
    ) -> Result<String>;
}

pub struct AgentFeedback {
    agent: Box<dyn Agent>,
    prompts: Arc<PromptEngine>,
}

impl AgentFeedback {
    pub fn new(agent: Box<dyn Agent>, prompts: Arc<PromptEngine>) -> Self {
        Self { agent, prompts }
    }
}

impl VisualFeedback for AgentFeedback {
    fn compare(
        &self,
        goal: &str,
        reference_images: &[PathBuf],
        produced_snapshots: &[PathBuf],
    ) -> Result<String> {
        let prompt = self
            .prompts
            .feedback(goal, reference_images, produced_snapshots)?;
        let reply = self.agent.ask(&prompt).context("visual feedback")?;
        Ok(reply.trim().to_string())
    }
}
