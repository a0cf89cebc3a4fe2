//! Static acceptance checks run on every candidate before it is executed.
//!
//! The pipeline is three ordered, short-circuiting stages: syntax, structure,
//! and dependency availability. None of them spawns a process.

use tracing::debug;

use crate::core::python::{
    Diagnostic, ParsedSource, imported_modules, structural_errors, syntax_errors,
};
use crate::core::types::{ValidationKind, ValidationResult};
use crate::io::modules::ModuleIndex;

/// Validates candidate program text.
pub trait Validator: Send + Sync {
    fn validate(&self, candidate: &str) -> ValidationResult;
}

/// Syntax, then structure, then dependency availability.
#[derive(Debug, Clone, Default)]
pub struct ValidationPipeline {
    modules: ModuleIndex,
}

impl ValidationPipeline {
    pub fn new(modules: ModuleIndex) -> Self {
        Self { modules }
    }
}

impl Validator for ValidationPipeline {
    fn validate(&self, candidate: &str) -> ValidationResult {
        let parsed = match ParsedSource::parse(candidate) {
            Ok(parsed) => parsed,
            Err(e) => return ValidationResult::fail(ValidationKind::SyntaxError, e.to_string()),
        };

        let syntax = syntax_errors(&parsed);
        if !syntax.is_empty() {
            debug!(stage = "validate", check = "syntax", errors = syntax.len(), "rejected");
            return ValidationResult::fail(ValidationKind::SyntaxError, join(&syntax));
        }

        let structure = structural_errors(&parsed);
        if !structure.is_empty() {
            debug!(stage = "validate", check = "grammar", errors = structure.len(), "rejected");
            return ValidationResult::fail(ValidationKind::GrammarError, join(&structure));
        }

        let imports = imported_modules(&parsed);
        let missing = self.modules.missing(&imports);
        if !missing.is_empty() {
            debug!(stage = "validate", check = "dependency", missing = ?missing, "rejected");
            return ValidationResult::fail(
                ValidationKind::DependencyError,
                format!("missing modules: {}", missing.join(", ")),
            );
        }

        ValidationResult::pass()
    }
}

fn join(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
