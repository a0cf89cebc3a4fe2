//! Feedback judge: ranks critiques and decides goal achievement.
//!
//! Agent replies are JSON objects checked against embedded schemas before
//! being deserialized, so a malformed verdict surfaces as an error instead of
//! a silently defaulted field.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::io::agent::Agent;
use crate::io::prompt::PromptEngine;

const BETTER_SCHEMA: &str = include_str!("../../schemas/judge_better.schema.json");
const ACHIEVED_SCHEMA: &str = include_str!("../../schemas/judge_achieved.schema.json");

/// Oracle comparing feedback reports. Implementations must be side-effect free.
pub trait Judge: Send + Sync {
    /// Whether `new_feedback` describes a better attempt than `best_feedback`.
    fn is_better(&self, new_feedback: &str, best_feedback: &str, goal: &str) -> Result<bool>;

    /// `(achieved, score)` with `score` in `[0, 1]`.
    fn is_goal_achieved(&self, feedback: &str, goal: &str) -> Result<(bool, f64)>;
}

#[derive(Debug, Deserialize)]
struct BetterVerdict {
    better: bool,
}

#[derive(Debug, Deserialize)]
struct AchievedVerdict {
    achieved: bool,
    score: f64,
}

pub struct AgentJudge {
    agent: Box<dyn Agent>,
    prompts: Arc<PromptEngine>,
    better_schema: Validator,
    achieved_schema: Validator,
}

impl AgentJudge {
    pub fn new(agent: Box<dyn Agent>, prompts: Arc<PromptEngine>) -> Result<Self> {
        Ok(Self {
            agent,
            prompts,
            better_schema: compile_schema(BETTER_SCHEMA)?,
            achieved_schema: compile_schema(ACHIEVED_SCHEMA)?,
        })
    }

    fn verdict<T: DeserializeOwned>(&self, prompt: &str, schema: &Validator) -> Result<T> {
        let reply = self.agent.ask(prompt)?;
        let value = parse_json_object(&reply)?;
        if !schema.is_valid(&value) {
            let messages = schema
                .iter_errors(&value)
                .map(|err| err.to_string())
                .collect::<Vec<_>>();
            return Err(anyhow!(
                "judge verdict failed schema validation: {}",
                messages.join("; ")
            ));
        }
        serde_json::from_value(value).context("deserialize judge verdict")
    }
}

impl Judge for AgentJudge {
    fn is_better(&self, new_feedback: &str, best_feedback: &str, goal: &str) -> Result<bool> {
        let prompt = self
            .prompts
            .judge_better(new_feedback, best_feedback, goal)?;
        let verdict: BetterVerdict = self
            .verdict(&prompt, &self.better_schema)
            .context("judge is_better")?;
        debug!(better = verdict.better, "judge compared feedback");
        Ok(verdict.better)
    }

    fn is_goal_achieved(&self, feedback: &str, goal: &str) -> Result<(bool, f64)> {
        let prompt = self.prompts.judge_achieved(feedback, goal)?;
        let verdict: AchievedVerdict = self
            .verdict(&prompt, &self.achieved_schema)
            .context("judge is_goal_achieved")?;
        debug!(
            achieved = verdict.achieved,
            score = verdict.score,
            "judge scored feedback"
        );
        Ok((verdict.achieved, verdict.score))
    }
}

fn compile_schema(source: &str) -> Result<Validator> {
    let schema_value: Value = serde_json::from_str(source).context("parse judge schema")?;
    validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))
}

/// Parse the outermost `{...}` span of `reply`, tolerating prose or code fences around it.
fn parse_json_object(reply: &str) -> Result<Value> {
    let start = reply
        .find('{')
        .ok_or_else(|| anyhow!("judge reply contains no JSON object"))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("judge reply contains no JSON object"))?;
    serde_json::from_str(&reply[start..=end]).context("parse judge reply")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedAgent;

    fn judge(replies: &[&str]) -> AgentJudge {
        AgentJudge::new(
            Box::new(ScriptedAgent::new("judge", replies)),
            Arc::new(PromptEngine::new().expect("templates")),
        )
        .expect("judge")
    }

    #[test]
    fn parses_better_verdict() {
        let judge = judge(&["{\"better\": true}", "Verdict:\n```json\n{\"better\": false}\n```"]);
        assert!(judge.is_better("new", "old", "goal").expect("first"));
        assert!(!judge.is_better("new", "old", "goal").expect("second"));
    }

    #[test]
    fn parses_achieved_verdict() {
        let judge = judge(&["{\"achieved\": false, \"score\": 0.85}"]);
        let (achieved, score) = judge.is_goal_achieved("close", "goal").expect("verdict");
        assert!(!achieved);
        assert!((score - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_out_of_range_score() {
        let judge = judge(&["{\"achieved\": true, \"score\": 1.5}"]);
        let err = judge.is_goal_achieved("x", "goal").expect_err("invalid");
        assert!(format!("{err:#}").contains("schema validation"));
    }

    #[test]
    fn rejects_reply_without_json() {
        let judge = judge(&["I think it is better."]);
        assert!(judge.is_better("a", "b", "goal").is_err());
    }
}
