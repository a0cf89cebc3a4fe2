//! Coding loop: find one candidate that validates and runs.
//!
//! Each attempt either generates a fresh program or fixes the most recent one,
//! validates it statically, then test-runs it in the sandbox without export
//! side effects. The first candidate that passes both wins.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::agents::generator::Generator;
use crate::core::cancel::CancelToken;
use crate::core::error::{ConfigError, StageError};
use crate::core::escalation::{EscalationPolicy, FractionEscalation};
use crate::core::types::{CandidateArtifact, Plan, Tier};
use crate::io::sandbox::Sandbox;
use crate::validate::Validator;

/// Inputs for one coding loop invocation.
#[derive(Debug, Clone, Copy)]
pub struct CodingRequest<'a> {
    pub goal: &'a str,
    /// Plan to reuse or refresh.
    pub plan: Option<&'a Plan>,
    /// Existing program to improve instead of generating from scratch.
    pub seed_code: Option<&'a str>,
    pub seed_feedback: Option<&'a str>,
    pub max_iterations: usize,
}

impl<'a> CodingRequest<'a> {
    pub fn new(goal: &'a str, max_iterations: usize) -> Self {
        Self {
            goal,
            plan: None,
            seed_code: None,
            seed_feedback: None,
            max_iterations,
        }
    }
}

/// Result of one coding loop invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CodingOutcome {
    pub plan: Plan,
    /// First candidate that validated and ran; `None` when the budget ran out.
    pub candidate: Option<CandidateArtifact>,
    /// Attempts consumed, never more than the requested ceiling.
    pub attempts: usize,
    /// Corrective feedback from the last failed attempt.
    pub last_feedback: Option<String>,
}

impl CodingOutcome {
    pub fn into_result(self) -> Option<(CandidateArtifact, Plan)> {
        let plan = self.plan;
        self.candidate.map(|candidate| (candidate, plan))
    }
}

pub struct CodingLoop {
    generator: Box<dyn Generator>,
    master: Option<Box<dyn Generator>>,
    validator: Box<dyn Validator>,
    sandbox: Arc<dyn Sandbox>,
    escalation: Box<dyn EscalationPolicy>,
    test_timeout: Duration,
    refresh_plan: bool,
    cancel: CancelToken,
}

impl CodingLoop {
    pub fn builder() -> CodingLoopBuilder {
        CodingLoopBuilder::default()
    }

    fn select(&self, attempt: usize, max_iterations: usize) -> (&dyn Generator, Tier) {
        match (self.escalation.tier(attempt, max_iterations), &self.master) {
            (Tier::Master, Some(master)) => (master.as_ref(), Tier::Master),
            _ => (self.generator.as_ref(), Tier::Standard),
        }
    }

    fn refreshed_plan(&self, request: &CodingRequest<'_>) -> Plan {
        let fallback = || {
            request
                .plan
                .cloned()
                .unwrap_or_else(|| Plan::from_goal(request.goal))
        };
        if !self.refresh_plan {
            return fallback();
        }
        match self
            .generator
            .plan(request.goal, request.seed_feedback, request.plan)
        {
            Ok(plan) => {
                debug!(
                    component = "coding",
                    stage = "plan",
                    elements = plan.elements.len(),
                    "refreshed plan"
                );
                plan
            }
            Err(e) => {
                warn!(
                    component = "coding",
                    stage = "plan",
                    err = %e,
                    "plan refresh failed, reusing previous plan"
                );
                fallback()
            }
        }
    }

    /// Run up to `request.max_iterations` attempts and return the first executable candidate.
    pub fn generate(&self, request: &CodingRequest<'_>) -> CodingOutcome {
        let plan = self.refreshed_plan(request);
        let mut current_code = request.seed_code.map(str::to_string);
        let mut feedback = request.seed_feedback.map(str::to_string);
        let mut attempts = 0;

        for attempt in 0..request.max_iterations {
            if self.cancel.is_cancelled() {
                info!(component = "coding", attempt, "cancelled");
                break;
            }
            attempts += 1;
            let (generator, tier) = self.select(attempt, request.max_iterations);
            debug!(
                component = "coding",
                attempt,
                tier = tier.as_str(),
                "attempt started"
            );

            let produced = match &current_code {
                Some(code) => generator.fix(
                    code,
                    request.goal,
                    feedback.as_deref().unwrap_or_default(),
                ),
                None => generator.generate(request.goal, &plan),
            };
            let text = match produced {
                Ok(text) => text,
                Err(e) => {
                    let err = StageError::Generation(format!("{e:#}"));
                    warn!(
                        component = "coding",
                        attempt,
                        stage = err.stage(),
                        err = %err,
                        "attempt failed"
                    );
                    feedback = Some(err.feedback_text());
                    continue;
                }
            };

            match self.check(&text) {
                Ok(()) => {
                    info!(
                        component = "coding",
                        attempt,
                        tier = tier.as_str(),
                        "candidate accepted"
                    );
                    return CodingOutcome {
                        plan,
                        candidate: Some(CandidateArtifact {
                            text,
                            attempt,
                            tier,
                        }),
                        attempts,
                        last_feedback: feedback,
                    };
                }
                Err(err) => {
                    warn!(
                        component = "coding",
                        attempt,
                        stage = err.stage(),
                        err = %err,
                        "attempt failed"
                    );
                    feedback = Some(err.feedback_text());
                    current_code = Some(text);
                }
            }
        }

        info!(component = "coding", attempts, "no executable candidate");
        CodingOutcome {
            plan,
            candidate: None,
            attempts,
            last_feedback: feedback,
        }
    }

    /// Validate, then test-run. No process is spawned for invalid candidates.
    fn check(&self, text: &str) -> Result<(), StageError> {
        let validation = self.validator.validate(text);
        if !validation.ok {
            return Err(StageError::Validation {
                kind: validation.kind,
                message: validation.message,
            });
        }
        let execution = self.sandbox.execute(text, self.test_timeout);
        if !execution.is_success() {
            return Err(StageError::Execution {
                status: execution.status,
                message: execution.message,
            });
        }
        Ok(())
    }
}

pub struct CodingLoopBuilder {
    generator: Option<Box<dyn Generator>>,
    master: Option<Box<dyn Generator>>,
    validator: Option<Box<dyn Validator>>,
    sandbox: Option<Arc<dyn Sandbox>>,
    escalation: Box<dyn EscalationPolicy>,
    test_timeout: Duration,
    refresh_plan: bool,
    cancel: CancelToken,
}

impl Default for CodingLoopBuilder {
    fn default() -> Self {
        Self {
            generator: None,
            master: None,
            validator: None,
            sandbox: None,
            escalation: Box::new(FractionEscalation::default()),
            test_timeout: Duration::from_secs(10),
            refresh_plan: true,
            cancel: CancelToken::new(),
        }
    }
}

impl CodingLoopBuilder {
    pub fn generator(mut self, generator: impl Generator + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn master(mut self, master: impl Generator + 'static) -> Self {
        self.master = Some(Box::new(master));
        self
    }

    pub fn boxed_generator(mut self, generator: Box<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn boxed_master(mut self, master: Option<Box<dyn Generator>>) -> Self {
        self.master = master;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn escalation(mut self, policy: impl EscalationPolicy + 'static) -> Self {
        self.escalation = Box::new(policy);
        self
    }

    pub fn test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Ask the generator for a fresh plan at the start of every invocation (default `true`).
    pub fn refresh_plan(mut self, refresh: bool) -> Self {
        self.refresh_plan = refresh;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<CodingLoop, ConfigError> {
        Ok(CodingLoop {
            generator: self
                .generator
                .ok_or(ConfigError::MissingCollaborator("generator"))?,
            master: self.master,
            validator: self
                .validator
                .ok_or(ConfigError::MissingCollaborator("validator"))?,
            sandbox: self
                .sandbox
                .ok_or(ConfigError::MissingCollaborator("sandbox"))?,
            escalation: self.escalation,
            test_timeout: self.test_timeout,
            refresh_plan: self.refresh_plan,
            cancel: self.cancel,
        })
    }
}
