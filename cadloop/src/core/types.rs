//! Shared data model for the design and coding loops.
//!
//! These types are plain values passed between loop stages. They carry no I/O
//! handles so that loop state can be inspected and asserted on in tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// User-supplied design task: text plus optional reference imagery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignGoal {
    pub text: String,
    #[serde(default)]
    pub images: Vec<PathBuf>,
    /// Free-form auxiliary metadata supplied by the caller.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DesignGoal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_images(mut self, images: Vec<PathBuf>) -> Self {
        self.images = images;
        self
    }
}

/// Design goal after the one-time refinement pass. Immutable for the rest of the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedDesignGoal {
    text: String,
    images: Vec<PathBuf>,
    metadata: BTreeMap<String, String>,
}

impl RefinedDesignGoal {
    /// Refine `goal` by replacing its text; imagery and metadata are preserved.
    pub fn refine(goal: &DesignGoal, refined_text: impl Into<String>) -> Self {
        Self {
            text: refined_text.into(),
            images: goal.images.clone(),
            metadata: goal.metadata.clone(),
        }
    }

    /// Use the goal as-is (no refinement happened).
    pub fn unrefined(goal: &DesignGoal) -> Self {
        Self::refine(goal, goal.text.clone())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// Coding plan produced by the generator once per design iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub outline: String,
    pub elements: Vec<String>,
}

impl Plan {
    pub fn new(outline: impl Into<String>, elements: Vec<String>) -> Self {
        Self {
            outline: outline.into(),
            elements,
        }
    }

    /// Minimal plan used when no planner output is available.
    pub fn from_goal(goal_text: &str) -> Self {
        Self::new(goal_text.trim(), Vec::new())
    }

    /// Markdown rendering handed to generators as seed context.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Plan\n");
        out.push_str(self.outline.trim());
        out.push('\n');
        if !self.elements.is_empty() {
            out.push_str("\n# Elements\n");
            for element in &self.elements {
                out.push_str(element);
                out.push('\n');
            }
        }
        out
    }
}

/// Which generator implementation produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Master,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Master => "master",
        }
    }
}

/// Program text synthesized during one coding attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArtifact {
    pub text: String,
    /// Zero-based coding attempt that produced this candidate.
    pub attempt: usize,
    pub tier: Tier,
}

/// Failure classification for the validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    None,
    SyntaxError,
    GrammarError,
    DependencyError,
}

impl ValidationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationKind::None => "none",
            ValidationKind::SyntaxError => "syntax_error",
            ValidationKind::GrammarError => "grammar_error",
            ValidationKind::DependencyError => "dependency_error",
        }
    }
}

/// Outcome of the static validation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub kind: ValidationKind,
    pub message: String,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            ok: true,
            kind: ValidationKind::None,
            message: String::new(),
        }
    }

    pub fn fail(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            kind,
            message: message.into(),
        }
    }
}

/// Terminal status of one sandboxed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    RuntimeError,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::RuntimeError => "runtime_error",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

/// Result of one sandboxed execution. `produced_files` is keyed by path relative
/// to the scratch directory, using `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub produced_files: BTreeMap<String, Vec<u8>>,
    pub message: String,
}

impl ExecutionResult {
    pub fn success(stdout: String, produced_files: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            stdout,
            produced_files,
            message: String::new(),
        }
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::RuntimeError,
            stdout: String::new(),
            produced_files: BTreeMap::new(),
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            stdout: String::new(),
            produced_files: BTreeMap::new(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Free-form critique of a rendered candidate, opaque to the loops beyond the
/// judge's comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub text: String,
    /// Score reported by the judge for this feedback, once known.
    pub score: Option<f64>,
}

impl FeedbackReport {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
        }
    }
}
