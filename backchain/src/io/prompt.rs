//! Prompt templates sent to the oracle.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::Step;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const INTENT_ANALYSIS_TEMPLATE: &str = include_str!("prompts/intent_analysis.md");
const WORKING_BACKWARDS_TEMPLATE: &str = include_str!("prompts/working_backwards.md");
const STEP_EXECUTION_TEMPLATE: &str = include_str!("prompts/step_execution.md");
const PLANNING_TEMPLATE: &str = include_str!("prompts/planning.md");

/// Description of where planning starts from.
pub const CURRENT_STATE: &str = "Initial state";

/// Inputs for one backward-planning query.
#[derive(Debug, Clone, Copy)]
pub struct BackwardPrompt<'a> {
    pub goal: &'a str,
    pub progress: &'a str,
    /// Chain so far, closest to the goal first.
    pub known_steps: &'a [Step],
}

/// Inputs for the planning query issued once backward planning ends.
#[derive(Debug, Clone, Copy)]
pub struct PlanningPrompt<'a> {
    pub goal: &'a str,
    /// Backward chain, closest to the goal first.
    pub analysis: &'a [Step],
    pub tools: &'a [&'a str],
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("intent_analysis", INTENT_ANALYSIS_TEMPLATE)
            .expect("intent_analysis template should be valid");
        env.add_template("working_backwards", WORKING_BACKWARDS_TEMPLATE)
            .expect("working_backwards template should be valid");
        env.add_template("step_execution", STEP_EXECUTION_TEMPLATE)
            .expect("step_execution template should be valid");
        env.add_template("planning", PLANNING_TEMPLATE)
            .expect("planning template should be valid");
        Self { env }
    }

    pub fn system(&self) -> Result<String> {
        self.render("system", context! {})
    }

    pub fn intent_analysis(&self, user_input: &str) -> Result<String> {
        self.render(
            "intent_analysis",
            context! { user_input => user_input.trim() },
        )
    }

    pub fn working_backwards(&self, input: &BackwardPrompt<'_>) -> Result<String> {
        let known_steps: Vec<&str> = input
            .known_steps
            .iter()
            .map(|step| step.description.as_str())
            .collect();
        self.render(
            "working_backwards",
            context! {
                goal => input.goal.trim(),
                current_state => CURRENT_STATE,
                progress => input.progress,
                known_steps => known_steps,
            },
        )
    }

    pub fn step_execution(&self, step: &Step) -> Result<String> {
        self.render(
            "step_execution",
            context! {
                description => step.description.as_str(),
                tools => &step.tools_needed,
                prerequisites => &step.prerequisites,
            },
        )
    }

    pub fn planning(&self, input: &PlanningPrompt<'_>) -> Result<String> {
        let analysis: Vec<&str> = input
            .analysis
            .iter()
            .map(|step| step.description.as_str())
            .collect();
        self.render(
            "planning",
            context! {
                goal => input.goal.trim(),
                current_state => CURRENT_STATE,
                analysis => analysis,
                tools => input.tools,
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load template {name}"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render template {name}"))?;
        debug!(template = name, bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}
