//! Scripted and recording collaborators for tests.
//!
//! Every stub is `Clone` and shares its script and call log between clones, so a
//! test can hand one clone to a loop and inspect the other afterwards.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::agents::feedback::VisualFeedback;
use crate::agents::generator::Generator;
use crate::agents::judge::Judge;
use crate::core::types::{ExecutionResult, Plan};
use crate::io::agent::Agent;
use crate::io::history::{HistoryEvent, HistorySink};
use crate::io::renderer::{RenderOutcome, Renderer};
use crate::io::sandbox::Sandbox;

fn locked<T: Clone>(value: &Mutex<T>) -> T {
    value.lock().expect("stub mutex poisoned").clone()
}

/// Agent replying from a fixed script; errors once the script runs out.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    name: String,
    replies: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAgent {
    pub fn new(name: &str, replies: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            replies: Arc::new(Mutex::new(replies.iter().map(|r| r.to_string()).collect())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        locked(&self.prompts)
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("stub mutex poisoned")
            .push(prompt.to_string());
        self.replies
            .lock()
            .expect("stub mutex poisoned")
            .pop_front()
            .ok_or_else(|| anyhow!("{} script exhausted", self.name))
    }
}

/// One recorded `generate` or `fix` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCall {
    pub kind: &'static str,
    pub code: Option<String>,
    pub feedback: Option<String>,
}

/// One recorded `plan` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCall {
    pub feedback: Option<String>,
    pub previous_plan: Option<Plan>,
}

/// Generator returning scripted programs. An empty script entry, or an
/// exhausted script, makes that call fail.
#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<Mutex<Vec<GeneratorCall>>>,
    plan_calls: Arc<Mutex<Vec<PlanCall>>>,
    fail_plans: bool,
}

impl ScriptedGenerator {
    pub fn new(script: &[&str]) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.iter().map(|s| s.to_string()).collect())),
            calls: Arc::new(Mutex::new(Vec::new())),
            plan_calls: Arc::new(Mutex::new(Vec::new())),
            fail_plans: false,
        }
    }

    /// Make every `plan` call fail.
    pub fn failing_plans(mut self) -> Self {
        self.fail_plans = true;
        self
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        locked(&self.calls)
    }

    pub fn plan_calls(&self) -> Vec<PlanCall> {
        locked(&self.plan_calls)
    }

    fn next(&self, call: GeneratorCall) -> Result<String> {
        self.calls.lock().expect("stub mutex poisoned").push(call);
        match self.script.lock().expect("stub mutex poisoned").pop_front() {
            Some(text) if !text.is_empty() => Ok(text),
            Some(_) => Err(anyhow!("scripted generation failure")),
            None => Err(anyhow!("generator script exhausted")),
        }
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, _goal: &str, _plan: &Plan) -> Result<String> {
        self.next(GeneratorCall {
            kind: "generate",
            code: None,
            feedback: None,
        })
    }

    fn fix(&self, code: &str, _goal: &str, feedback: &str) -> Result<String> {
        self.next(GeneratorCall {
            kind: "fix",
            code: Some(code.to_string()),
            feedback: Some(feedback.to_string()),
        })
    }

    fn plan(
        &self,
        goal: &str,
        feedback: Option<&str>,
        previous_plan: Option<&Plan>,
    ) -> Result<Plan> {
        self.plan_calls
            .lock()
            .expect("stub mutex poisoned")
            .push(PlanCall {
                feedback: feedback.map(str::to_string),
                previous_plan: previous_plan.cloned(),
            });
        if self.fail_plans {
            return Err(anyhow!("scripted plan failure"));
        }
        Ok(Plan::from_goal(goal))
    }
}

/// Sandbox returning canned results without spawning anything. The last
/// result repeats once the sequence runs out.
#[derive(Debug, Clone)]
pub struct FixedSandbox {
    results: Arc<Mutex<VecDeque<ExecutionResult>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FixedSandbox {
    pub fn new(result: ExecutionResult) -> Self {
        Self::sequence(vec![result])
    }

    pub fn sequence(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls)
    }
}

impl Sandbox for FixedSandbox {
    fn execute(&self, candidate: &str, _timeout: Duration) -> ExecutionResult {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .push(candidate.to_string());
        let mut results = self.results.lock().expect("stub mutex poisoned");
        if results.len() > 1 {
            results.pop_front().expect("non-empty")
        } else {
            results
                .front()
                .cloned()
                .unwrap_or_else(|| ExecutionResult::runtime_error("no scripted result"))
        }
    }
}

/// Renderer that reports `exported_model.<format>` inside the target dir
/// without writing anything. Scripted failures are consumed first.
#[derive(Debug, Clone, Default)]
pub struct StubRenderer {
    failures: Arc<Mutex<VecDeque<bool>>>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-call outcome script: `false` fails that render.
    pub fn with_script(script: &[bool]) -> Self {
        Self {
            failures: Arc::new(Mutex::new(script.iter().copied().collect())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        locked(&self.calls)
    }
}

impl Renderer for StubRenderer {
    fn render(&self, _candidate: &str, target_dir: &Path, format: &str) -> RenderOutcome {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .push(target_dir.to_path_buf());
        let ok = self
            .failures
            .lock()
            .expect("stub mutex poisoned")
            .pop_front()
            .unwrap_or(true);
        RenderOutcome {
            ok,
            message: (if ok { "rendered" } else { "scripted render failure" }).to_string(),
            artifact_dir: target_dir.to_path_buf(),
            artifacts: if ok {
                vec![target_dir.join(format!("exported_model.{format}"))]
            } else {
                Vec::new()
            },
        }
    }
}

/// Visual feedback replying from a script. Empty entries fail that call.
#[derive(Debug, Clone)]
pub struct ScriptedFeedback {
    script: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<Mutex<Vec<Vec<PathBuf>>>>,
}

impl ScriptedFeedback {
    pub fn new(script: &[&str]) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.iter().map(|s| s.to_string()).collect())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot lists passed to each call.
    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        locked(&self.calls)
    }
}

impl VisualFeedback for ScriptedFeedback {
    fn compare(
        &self,
        _goal: &str,
        _reference_images: &[PathBuf],
        produced_snapshots: &[PathBuf],
    ) -> Result<String> {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .push(produced_snapshots.to_vec());
        match self.script.lock().expect("stub mutex poisoned").pop_front() {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(anyhow!("scripted feedback failure")),
        }
    }
}

/// One recorded `is_better` call and its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetterCall {
    pub new_feedback: String,
    pub best_feedback: String,
    pub answer: Option<bool>,
}

/// Judge answering from scripts and recording every call.
///
/// `None` entries make that call fail. Exhausted scripts answer "not better"
/// and "not achieved, score 0".
#[derive(Debug, Clone, Default)]
pub struct ScriptedJudge {
    better: Arc<Mutex<VecDeque<Option<bool>>>>,
    achieved: Arc<Mutex<VecDeque<Option<(bool, f64)>>>>,
    better_calls: Arc<Mutex<Vec<BetterCall>>>,
    achieved_calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_better(self, answers: &[Option<bool>]) -> Self {
        self.better
            .lock()
            .expect("stub mutex poisoned")
            .extend(answers.iter().copied());
        self
    }

    pub fn with_achieved(self, answers: &[Option<(bool, f64)>]) -> Self {
        self.achieved
            .lock()
            .expect("stub mutex poisoned")
            .extend(answers.iter().copied());
        self
    }

    pub fn better_calls(&self) -> Vec<BetterCall> {
        locked(&self.better_calls)
    }

    pub fn achieved_calls(&self) -> Vec<String> {
        locked(&self.achieved_calls)
    }
}

impl Judge for ScriptedJudge {
    fn is_better(&self, new_feedback: &str, best_feedback: &str, _goal: &str) -> Result<bool> {
        let answer = self
            .better
            .lock()
            .expect("stub mutex poisoned")
            .pop_front()
            .unwrap_or(Some(false));
        self.better_calls
            .lock()
            .expect("stub mutex poisoned")
            .push(BetterCall {
                new_feedback: new_feedback.to_string(),
                best_feedback: best_feedback.to_string(),
                answer,
            });
        answer.ok_or_else(|| anyhow!("scripted judge failure"))
    }

    fn is_goal_achieved(&self, feedback: &str, _goal: &str) -> Result<(bool, f64)> {
        self.achieved_calls
            .lock()
            .expect("stub mutex poisoned")
            .push(feedback.to_string());
        self.achieved
            .lock()
            .expect("stub mutex poisoned")
            .pop_front()
            .unwrap_or(Some((false, 0.0)))
            .ok_or_else(|| anyhow!("scripted judge failure"))
    }
}

/// History sink keeping events in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingHistory {
    events: Arc<Mutex<Vec<HistoryEvent>>>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HistoryEvent> {
        locked(&self.events)
    }
}

impl HistorySink for RecordingHistory {
    fn record(&self, event: HistoryEvent) {
        self.events
            .lock()
            .expect("stub mutex poisoned")
            .push(event);
    }
}
