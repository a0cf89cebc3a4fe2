//! Prompt rendering for the command-backed collaborators.

use std::path::PathBuf;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::Plan;

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const DESCRIBE_TEMPLATE: &str = include_str!("prompts/describe.md");
const FEEDBACK_TEMPLATE: &str = include_str!("prompts/feedback.md");
const JUDGE_BETTER_TEMPLATE: &str = include_str!("prompts/judge_better.md");
const JUDGE_ACHIEVED_TEMPLATE: &str = include_str!("prompts/judge_achieved.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("plan", PLAN_TEMPLATE),
            ("generate", GENERATE_TEMPLATE),
            ("fix", FIX_TEMPLATE),
            ("describe", DESCRIBE_TEMPLATE),
            ("feedback", FEEDBACK_TEMPLATE),
            ("judge_better", JUDGE_BETTER_TEMPLATE),
            ("judge_achieved", JUDGE_ACHIEVED_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} template"))?;
        }
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))?;
        Ok(rendered)
    }

    pub fn plan(
        &self,
        goal: &str,
        feedback: Option<&str>,
        previous_plan: Option<&Plan>,
    ) -> Result<String> {
        self.render(
            "plan",
            context! {
                goal => goal.trim(),
                feedback => feedback.map(str::trim).filter(|s| !s.is_empty()),
                previous_plan => previous_plan.map(Plan::render),
            },
        )
    }

    pub fn generate(&self, goal: &str, plan: &Plan, export_target: &str) -> Result<String> {
        self.render(
            "generate",
            context! {
                goal => goal.trim(),
                plan => plan.render(),
                export_target,
            },
        )
    }

    pub fn fix(&self, code: &str, goal: &str, feedback: &str, export_target: &str) -> Result<String> {
        self.render(
            "fix",
            context! {
                code => code.trim(),
                goal => goal.trim(),
                feedback => feedback.trim(),
                export_target,
            },
        )
    }

    pub fn describe(&self, goal: &str, images: &[PathBuf]) -> Result<String> {
        self.render(
            "describe",
            context! {
                goal => goal.trim(),
                images => display_paths(images),
            },
        )
    }

    pub fn feedback(
        &self,
        goal: &str,
        reference_images: &[PathBuf],
        produced_snapshots: &[PathBuf],
    ) -> Result<String> {
        self.render(
            "feedback",
            context! {
                goal => goal.trim(),
                reference_images => display_paths(reference_images),
                produced_snapshots => display_paths(produced_snapshots),
            },
        )
    }

    pub fn judge_better(&self, new_feedback: &str, best_feedback: &str, goal: &str) -> Result<String> {
        self.render(
            "judge_better",
            context! {
                goal => goal.trim(),
                new_feedback => new_feedback.trim(),
                best_feedback => best_feedback.trim(),
            },
        )
    }

    pub fn judge_achieved(&self, feedback: &str, goal: &str) -> Result<String> {
        self.render(
            "judge_achieved",
            context! {
                goal => goal.trim(),
                feedback => feedback.trim(),
            },
        )
    }

    /// Render a user-supplied export snippet template.
    pub fn export_snippet(
        &self,
        template: &str,
        format: &str,
        target: &str,
        file_name: &str,
    ) -> Result<String> {
        self.env
            .render_str(
                template,
                context! {
                    format,
                    target,
                    file_name,
                },
            )
            .context("render export snippet")
    }
}

fn display_paths(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}
