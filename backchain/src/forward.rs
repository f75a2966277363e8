//! Forward execution: run the reversed chain one step at a time.

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::core::command::extract_command;
use crate::core::cursor::ExecutionCursor;
use crate::core::plan::{BackwardChain, ForwardPlan};
use crate::core::status::preview;
use crate::core::types::{AgentRequest, Step};
use crate::io::oracle::{Oracle, OracleContext};
use crate::io::prompt::PromptEngine;

/// Finish summary when planning produced no steps.
pub const NOTHING_TO_DO: &str = "I've completed the analysis, but there are no steps to execute. \
     The goal may already be achieved or may not require any actions.";

/// Outcome of asking the oracle to carry out one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The response fenced a command; the step completes when its output arrives.
    Command(String),
    /// No command: the response itself completed the step.
    SelfContained,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardExecutor {
    plan: ForwardPlan,
    cursor: ExecutionCursor,
    plan_ready: bool,
    pending_command: Option<String>,
    progress: String,
}

impl ForwardExecutor {
    /// Freeze `chain` into its execution order and rewind the cursor.
    pub fn create_forward_plan(&mut self, chain: &BackwardChain) -> &ForwardPlan {
        self.plan = ForwardPlan::from_chain(chain);
        self.cursor = ExecutionCursor::start(&self.plan);
        self.plan_ready = true;
        self.pending_command = None;
        self.progress = "No steps completed yet.".to_string();
        info!(steps = self.plan.len(), "created forward plan");
        &self.plan
    }

    /// Begin with the first step, or finish immediately on an empty plan.
    #[instrument(skip_all, fields(steps = self.plan.len()))]
    pub fn start_execution<O: Oracle>(
        &mut self,
        goal: &str,
        oracle: &mut OracleContext<'_, O>,
        prompts: &PromptEngine,
    ) -> Result<AgentRequest> {
        if self.plan.is_empty() {
            info!("forward plan is empty, nothing to execute");
            return Ok(AgentRequest::Finish(NOTHING_TO_DO.to_string()));
        }
        self.continue_execution(goal, oracle, prompts)
    }

    /// Dispatch the current step, chaining through steps that need no command.
    ///
    /// Each pass either finishes, returns a command, or advances the cursor, so
    /// the loop runs at most `plan.len() + 1` times.
    #[instrument(skip_all, fields(index = self.cursor.current_step_index(), steps = self.plan.len()))]
    pub fn continue_execution<O: Oracle>(
        &mut self,
        goal: &str,
        oracle: &mut OracleContext<'_, O>,
        prompts: &PromptEngine,
    ) -> Result<AgentRequest> {
        for _ in 0..=self.plan.len() {
            let Some(step) = self.plan.get(self.cursor.current_step_index()).cloned() else {
                break;
            };
            match self.execute_step(&step, oracle, prompts)? {
                StepOutcome::Command(command) => return Ok(AgentRequest::RunCommand(command)),
                StepOutcome::SelfContained => {}
            }
        }
        Ok(AgentRequest::Finish(self.finish_summary(goal)))
    }

    /// Ask the oracle to carry out `step`.
    ///
    /// A fenced command is recorded as pending and returned without advancing;
    /// otherwise the response becomes the step's result.
    #[instrument(skip_all, fields(step = %step.description))]
    pub fn execute_step<O: Oracle>(
        &mut self,
        step: &Step,
        oracle: &mut OracleContext<'_, O>,
        prompts: &PromptEngine,
    ) -> Result<StepOutcome> {
        let prompt = prompts.step_execution(step)?;
        let response = oracle.ask(&prompt)?;

        match extract_command(&response) {
            Some(command) => {
                debug!(command_bytes = command.len(), "step dispatched a command");
                self.pending_command = Some(command.clone());
                Ok(StepOutcome::Command(command))
            }
            None => {
                self.mark_step_completed(&response);
                Ok(StepOutcome::SelfContained)
            }
        }
    }

    /// Record the current step as done with `result` and advance.
    ///
    /// No-op (returns `false`) before a plan exists, on an empty plan, or once
    /// every step is complete.
    pub fn mark_step_completed(&mut self, result: &str) -> bool {
        if !self.plan_ready {
            return false;
        }
        let total = self.plan.len();
        let Some(description) = self
            .cursor
            .complete_current(&self.plan, result)
            .map(|step| step.description.clone())
        else {
            debug!("mark_step_completed past end of plan, ignoring");
            return false;
        };
        self.progress = format!(
            "Completed {}/{} steps. Last completed: {}",
            self.cursor.completed_steps().len(),
            total,
            description
        );
        self.pending_command = None;
        info!(
            index = self.cursor.current_step_index(),
            total,
            result = %preview(result, 100),
            "step completed"
        );
        true
    }

    /// Whether `command` is the one this engine is waiting on.
    pub fn is_pending(&self, command: &str) -> bool {
        self.pending_command.as_deref() == Some(command)
    }

    /// Complete the current step from the output of its pending command.
    ///
    /// Returns `false` without touching anything when `command` does not match.
    pub fn complete_command(&mut self, command: &str, output: &str, preview_chars: usize) -> bool {
        if !self.is_pending(command) {
            debug!("command output does not match the pending command");
            return false;
        }
        let result = format!("Command executed. Output: {}", preview(output, preview_chars));
        self.mark_step_completed(&result)
    }

    /// Forget the pending command so the current step can be asked again.
    pub fn clear_pending(&mut self) {
        self.pending_command = None;
    }

    fn finish_summary(&self, goal: &str) -> String {
        if self.plan.is_empty() {
            NOTHING_TO_DO.to_string()
        } else {
            format!(
                "I've completed all {} steps of the plan. The goal '{}' has been achieved.",
                self.plan.len(),
                goal
            )
        }
    }

    pub fn plan(&self) -> &ForwardPlan {
        &self.plan
    }

    pub fn cursor(&self) -> &ExecutionCursor {
        &self.cursor
    }

    pub fn plan_ready(&self) -> bool {
        self.plan_ready
    }

    pub fn pending_command(&self) -> Option<&str> {
        self.pending_command.as_deref()
    }

    pub fn progress(&self) -> &str {
        &self.progress
    }
}
