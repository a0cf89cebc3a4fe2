//! Design goal refinement.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::types::{DesignGoal, RefinedDesignGoal};
use crate::io::agent::Agent;
use crate::io::prompt::PromptEngine;

/// Turns a user goal into the refined goal used for the rest of the task.
pub trait Describer: Send + Sync {
    fn refine(&self, goal: &DesignGoal) -> Result<RefinedDesignGoal>;
}

/// Describer that keeps the goal unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDescriber;

impl Describer for PassthroughDescriber {
    fn refine(&self, goal: &DesignGoal) -> Result<RefinedDesignGoal> {
        Ok(RefinedDesignGoal::unrefined(goal))
    }
}

pub struct AgentDescriber {
    agent: Box<dyn Agent>,
    prompts: Arc<PromptEngine>,
}

impl AgentDescriber {
    pub fn new(agent: Box<dyn Agent>, prompts: Arc<PromptEngine>) -> Self {
        Self { agent, prompts }
    }
}

impl Describer for AgentDescriber {
    fn refine(&self, goal: &DesignGoal) -> Result<RefinedDesignGoal> {
        let prompt = self.prompts.describe(&goal.text, &goal.images)?;
        let reply = self.agent.ask(&prompt).context("describe goal")?;
        Ok(RefinedDesignGoal::refine(goal, reply.trim()))
    }
}
