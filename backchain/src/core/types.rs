//! Shared deterministic types for the planner core.
//!
//! These types define stable contracts between the engines, the agent and the
//! driver. They carry no I/O and compare by value.

use serde::{Deserialize, Serialize};

/// A single planning step.
///
/// `result` stays `None` for steps in the backward chain and forward plan; it is
/// only populated on the copies recorded as completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub description: String,
    /// Tool identifiers in mention order.
    pub tools_needed: Vec<String>,
    /// Conditions asserted to precede this step.
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Shallow copy of this step with `result` attached.
    pub fn with_result(&self, result: impl Into<String>) -> Self {
        Self {
            result: Some(result.into()),
            ..self.clone()
        }
    }
}

/// Phase of the top-level planner state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerPhase {
    #[default]
    AwaitingGoal,
    BackwardPlanning,
    ForwardPlanReady,
    Executing,
    Complete,
}

impl PlannerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PlannerPhase::AwaitingGoal => "awaiting_goal",
            PlannerPhase::BackwardPlanning => "backward_planning",
            PlannerPhase::ForwardPlanReady => "forward_plan_ready",
            PlannerPhase::Executing => "executing",
            PlannerPhase::Complete => "complete",
        }
    }
}

/// Externally observed event fed to the agent by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// User input.
    Text(String),
    /// Output of a command previously dispatched via [`AgentRequest::RunCommand`].
    CommandOutput { command: String, output: String },
}

/// What the agent asks of the driver after handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRequest {
    /// User-visible status message.
    Message(String),
    /// Run this exact command text through the executor and report its output.
    RunCommand(String),
    /// The goal is finished; carries the final summary.
    Finish(String),
}

impl AgentRequest {
    pub fn is_finish(&self) -> bool {
        matches!(self, AgentRequest::Finish(_))
    }
}
