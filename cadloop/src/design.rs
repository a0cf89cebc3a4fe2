//! Design loop: bounded hill-climbing over coding loop results.
//!
//! Each iteration asks the coding loop for an executable candidate (seeded
//! with the current best), renders it, collects visual feedback and lets the
//! judge decide whether it replaces the best and whether the goal is met.
//! Stage failures consume the iteration and never escape the loop.

use std::path::Path;

use tracing::{info, warn};

use crate::agents::describer::{Describer, PassthroughDescriber};
use crate::agents::feedback::VisualFeedback;
use crate::agents::judge::Judge;
use crate::coding::{CodingLoop, CodingRequest};
use crate::core::cancel::CancelToken;
use crate::core::error::{ConfigError, StageError};
use crate::core::state::{Adoption, BestCandidate, LoopState};
use crate::core::types::{CandidateArtifact, DesignGoal, FeedbackReport, Plan, RefinedDesignGoal};
use crate::io::history::{
    HistoryEvent, HistorySink, IterationPaths, IterationRecord, IterationStage, NullHistory,
};
use crate::io::renderer::Renderer;

/// Result of one design task.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignOutcome {
    pub refined_goal: RefinedDesignGoal,
    pub best_candidate: Option<CandidateArtifact>,
    pub best_feedback: Option<FeedbackReport>,
    pub best_plan: Option<Plan>,
    /// `true` only when the judge declared the goal achieved.
    pub completed: bool,
    /// Design iterations consumed, never more than the requested ceiling.
    pub iterations: usize,
    /// `(iteration, reason)` for every best replacement, oldest first.
    pub adoptions: Vec<(usize, Adoption)>,
}

/// What one iteration did, for logging and history.
struct IterationReport {
    stage: IterationStage,
    candidate: Option<String>,
    feedback: Option<String>,
    score: Option<f64>,
    adopted: bool,
}

impl IterationReport {
    fn failed(stage: IterationStage, candidate: Option<String>) -> Self {
        Self {
            stage,
            candidate,
            feedback: None,
            score: None,
            adopted: false,
        }
    }
}

pub struct DesignLoop {
    coding: CodingLoop,
    describer: Box<dyn Describer>,
    renderer: Box<dyn Renderer>,
    feedback: Box<dyn VisualFeedback>,
    judge: Box<dyn Judge>,
    history: Box<dyn HistorySink>,
    coding_iterations: usize,
    render_format: String,
    cancel: CancelToken,
}

impl DesignLoop {
    pub fn builder() -> DesignLoopBuilder {
        DesignLoopBuilder::default()
    }

    /// Run one design task.
    ///
    /// Only invalid limits are reported as errors; every stage failure is
    /// absorbed, and exhaustion yields `completed == false`.
    pub fn run(
        &self,
        goal: &DesignGoal,
        output_root: &Path,
        max_iterations: usize,
        stop_threshold: f64,
    ) -> Result<DesignOutcome, ConfigError> {
        if max_iterations == 0 {
            return Err(ConfigError::ZeroIterations("max_iterations"));
        }
        if !(0.0..=1.0).contains(&stop_threshold) {
            return Err(ConfigError::StopThreshold(stop_threshold.to_string()));
        }

        let refined = self.refine(goal);
        self.history.record(HistoryEvent::InitialGoal(goal.clone()));
        self.history
            .record(HistoryEvent::RefinedGoal(refined.clone()));

        let mut state = LoopState::new();
        for iteration in 0..max_iterations {
            if self.cancel.is_cancelled() {
                info!(component = "design", iteration, "cancelled");
                break;
            }
            state.consume_iteration();
            let report =
                self.iteration(&refined, output_root, iteration, stop_threshold, &mut state);
            info!(
                component = "design",
                iteration,
                stage = ?report.stage,
                adopted = report.adopted,
                score = ?report.score,
                "iteration finished"
            );
            self.history.record(HistoryEvent::Iteration(IterationRecord {
                goal: refined.text().to_string(),
                iteration: iteration + 1,
                stage: report.stage,
                candidate: report.candidate,
                feedback: report.feedback,
                score: report.score,
                adopted: report.adopted,
            }));
            if state.completed() {
                break;
            }
        }

        let adoptions = state.adoptions().to_vec();
        let (best, iterations, completed) = state.into_parts();
        if completed {
            info!(component = "design", iterations, "design goal achieved");
        } else {
            info!(
                component = "design",
                iterations,
                has_best = best.is_some(),
                "design goal not achieved"
            );
        }
        let (best_candidate, best_feedback, best_plan) = match best {
            Some(best) => (Some(best.candidate), Some(best.feedback), Some(best.plan)),
            None => (None, None, None),
        };
        Ok(DesignOutcome {
            refined_goal: refined,
            best_candidate,
            best_feedback,
            best_plan,
            completed,
            iterations,
            adoptions,
        })
    }

    fn refine(&self, goal: &DesignGoal) -> RefinedDesignGoal {
        match self.describer.refine(goal) {
            Ok(refined) => refined,
            Err(e) => {
                warn!(
                    component = "design",
                    stage = "describe",
                    err = %e,
                    "goal refinement failed, using goal as-is"
                );
                RefinedDesignGoal::unrefined(goal)
            }
        }
    }

    fn iteration(
        &self,
        goal: &RefinedDesignGoal,
        output_root: &Path,
        iteration: usize,
        stop_threshold: f64,
        state: &mut LoopState,
    ) -> IterationReport {
        let best = state.best();
        let request = CodingRequest {
            goal: goal.text(),
            plan: best.map(|b| &b.plan),
            seed_code: best.map(|b| b.candidate.text.as_str()),
            seed_feedback: best.map(|b| b.feedback.text.as_str()),
            max_iterations: self.coding_iterations,
        };
        let Some((candidate, plan)) = self.coding.generate(&request).into_result() else {
            warn!(
                component = "design",
                iteration,
                stage = "generate",
                "no executable candidate"
            );
            return IterationReport::failed(IterationStage::NoCandidate, None);
        };

        let target_dir = IterationPaths::new(output_root, iteration + 1).dir;
        let rendered = self
            .renderer
            .render(&candidate.text, &target_dir, &self.render_format);
        if !rendered.ok {
            let err = StageError::Render(rendered.message);
            warn!(
                component = "design",
                iteration,
                stage = err.stage(),
                err = %err,
                "iteration failed"
            );
            return IterationReport::failed(IterationStage::RenderFailed, Some(candidate.text));
        }

        let compared = self
            .feedback
            .compare(goal.text(), goal.images(), &rendered.artifacts);
        let feedback_text = match compared {
            Ok(text) => text,
            Err(e) => {
                let err = StageError::Feedback(format!("{e:#}"));
                warn!(
                    component = "design",
                    iteration,
                    stage = err.stage(),
                    err = %err,
                    "iteration failed"
                );
                return IterationReport::failed(IterationStage::FeedbackFailed, Some(candidate.text));
            }
        };

        let new_best = |feedback: &str| BestCandidate {
            candidate: candidate.clone(),
            feedback: FeedbackReport::new(feedback),
            plan: plan.clone(),
            iteration,
        };

        let verdict = state
            .best()
            .map(|best| self.judge.is_better(&feedback_text, &best.feedback.text, goal.text()));
        let mut adopted = false;
        match verdict {
            None => {
                state.adopt(new_best(&feedback_text), Adoption::First);
                adopted = true;
            }
            Some(Ok(true)) => {
                state.adopt(new_best(&feedback_text), Adoption::Improved);
                adopted = true;
            }
            Some(Ok(false)) => {}
            Some(Err(e)) => {
                let err = StageError::Judge(format!("{e:#}"));
                warn!(
                    component = "design",
                    iteration,
                    stage = err.stage(),
                    err = %err,
                    "keeping current best"
                );
            }
        }

        let mut score = None;
        match self.judge.is_goal_achieved(&feedback_text, goal.text()) {
            Ok((achieved, value)) => {
                score = Some(value);
                if achieved || value >= stop_threshold {
                    if !adopted {
                        state.adopt(new_best(&feedback_text), Adoption::GoalAchieved);
                        adopted = true;
                    }
                    state.mark_completed();
                }
                state.record_score(iteration, value);
            }
            Err(e) => {
                let err = StageError::Judge(format!("{e:#}"));
                warn!(
                    component = "design",
                    iteration,
                    stage = err.stage(),
                    err = %err,
                    "treating goal as not achieved"
                );
            }
        }

        IterationReport {
            stage: IterationStage::Judged,
            candidate: Some(candidate.text),
            feedback: Some(feedback_text),
            score,
            adopted,
        }
    }
}

pub struct DesignLoopBuilder {
    coding: Option<CodingLoop>,
    describer: Box<dyn Describer>,
    renderer: Option<Box<dyn Renderer>>,
    feedback: Option<Box<dyn VisualFeedback>>,
    judge: Option<Box<dyn Judge>>,
    history: Box<dyn HistorySink>,
    coding_iterations: usize,
    render_format: String,
    cancel: CancelToken,
}

impl Default for DesignLoopBuilder {
    fn default() -> Self {
        Self {
            coding: None,
            describer: Box::new(PassthroughDescriber),
            renderer: None,
            feedback: None,
            judge: None,
            history: Box::new(NullHistory),
            coding_iterations: 5,
            render_format: "stl".to_string(),
            cancel: CancelToken::new(),
        }
    }
}

impl DesignLoopBuilder {
    pub fn coding(mut self, coding: CodingLoop) -> Self {
        self.coding = Some(coding);
        self
    }

    pub fn describer(mut self, describer: impl Describer + 'static) -> Self {
        self.describer = Box::new(describer);
        self
    }

    pub fn boxed_describer(mut self, describer: Box<dyn Describer>) -> Self {
        self.describer = describer;
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn feedback(mut self, feedback: impl VisualFeedback + 'static) -> Self {
        self.feedback = Some(Box::new(feedback));
        self
    }

    pub fn judge(mut self, judge: impl Judge + 'static) -> Self {
        self.judge = Some(Box::new(judge));
        self
    }

    pub fn history(mut self, history: impl HistorySink + 'static) -> Self {
        self.history = Box::new(history);
        self
    }

    /// Attempt ceiling handed to the coding loop on every iteration.
    pub fn coding_iterations(mut self, max_iterations: usize) -> Self {
        self.coding_iterations = max_iterations;
        self
    }

    pub fn render_format(mut self, format: impl Into<String>) -> Self {
        self.render_format = format.into();
        self
    }

    /// Token checked before every design iteration. Share it with the coding
    /// loop's builder to also stop between coding attempts.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<DesignLoop, ConfigError> {
        if self.coding_iterations == 0 {
            return Err(ConfigError::ZeroIterations("coding max_iterations"));
        }
        Ok(DesignLoop {
            coding: self
                .coding
                .ok_or(ConfigError::MissingCollaborator("coding loop"))?,
            describer: self.describer,
            renderer: self
                .renderer
                .ok_or(ConfigError::MissingCollaborator("renderer"))?,
            feedback: self
                .feedback
                .ok_or(ConfigError::MissingCollaborator("visual feedback"))?,
            judge: self
                .judge
                .ok_or(ConfigError::MissingCollaborator("judge"))?,
            history: self.history,
            coding_iterations: self.coding_iterations,
            render_format: self.render_format,
            cancel: self.cancel,
        })
    }
}
