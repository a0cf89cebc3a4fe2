//! Best-candidate bookkeeping for one design task.

use crate::core::types::{CandidateArtifact, FeedbackReport, Plan};

/// The best candidate seen so far together with its feedback and plan.
#[derive(Debug, Clone, PartialEq)]
pub struct BestCandidate {
    pub candidate: CandidateArtifact,
    pub feedback: FeedbackReport,
    pub plan: Plan,
    /// Design iteration (zero-based) that produced this candidate.
    pub iteration: usize,
}

/// Why a candidate was adopted as best.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adoption {
    /// No best existed yet.
    First,
    /// The judge ranked it above the previous best.
    Improved,
    /// The judge declared the goal achieved.
    GoalAchieved,
}

impl Adoption {
    pub fn as_str(self) -> &'static str {
        match self {
            Adoption::First => "first",
            Adoption::Improved => "improved",
            Adoption::GoalAchieved => "goal_achieved",
        }
    }
}

/// Loop state owned by exactly one design loop invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoopState {
    best: Option<BestCandidate>,
    iteration_count: usize,
    completed: bool,
    adoptions: Vec<(usize, Adoption)>,
}

impl LoopState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self) -> Option<&BestCandidate> {
        self.best.as_ref()
    }

    pub fn has_best(&self) -> bool {
        self.best.is_some()
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Adoption history as `(iteration, reason)` pairs, oldest first.
    pub fn adoptions(&self) -> &[(usize, Adoption)] {
        &self.adoptions
    }

    /// Record that one design iteration slot has been consumed.
    pub fn consume_iteration(&mut self) {
        self.iteration_count += 1;
    }

    /// Replace the best triple.
    pub fn adopt(&mut self, best: BestCandidate, reason: Adoption) {
        self.adoptions.push((best.iteration, reason));
        self.best = Some(best);
    }

    /// Attach the judge's score to the best feedback if it came from `iteration`.
    pub fn record_score(&mut self, iteration: usize, score: f64) {
        if let Some(best) = self.best.as_mut().filter(|b| b.iteration == iteration) {
            best.feedback.score = Some(score);
        }
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn into_parts(self) -> (Option<BestCandidate>, usize, bool) {
        (self.best, self.iteration_count, self.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Tier;

    fn best(text: &str, iteration: usize) -> BestCandidate {
        BestCandidate {
            candidate: CandidateArtifact {
                text: text.to_string(),
                attempt: 0,
                tier: Tier::Standard,
            },
            feedback: FeedbackReport::new(format!("feedback for {text}")),
            plan: Plan::from_goal("goal"),
            iteration,
        }
    }

    #[test]
    fn adopt_replaces_best_and_records_reason() {
        let mut state = LoopState::new();
        assert!(!state.has_best());

        state.adopt(best("a", 0), Adoption::First);
        state.adopt(best("b", 2), Adoption::Improved);

        assert_eq!(state.best().map(|b| b.candidate.text.as_str()), Some("b"));
        assert_eq!(
            state.adoptions(),
            &[(0, Adoption::First), (2, Adoption::Improved)]
        );
    }

    #[test]
    fn score_only_attaches_to_matching_iteration() {
        let mut state = LoopState::new();
        state.adopt(best("a", 1), Adoption::First);

        state.record_score(2, 0.9);
        assert_eq!(state.best().and_then(|b| b.feedback.score), None);

        state.record_score(1, 0.5);
        assert_eq!(state.best().and_then(|b| b.feedback.score), Some(0.5));
    }

    #[test]
    fn iteration_count_and_completion_are_tracked() {
        let mut state = LoopState::new();
        state.consume_iteration();
        state.consume_iteration();
        state.mark_completed();

        let (best, iterations, completed) = state.into_parts();
        assert!(best.is_none());
        assert_eq!(iterations, 2);
        assert!(completed);
    }
}
