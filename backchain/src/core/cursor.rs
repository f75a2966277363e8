//! Execution progress over a frozen forward plan.
//!
//! Invariants held after every operation:
//! - `completed_steps.len() == current_step_index`
//! - `pending_steps == plan[current_step_index..]`

use crate::core::plan::ForwardPlan;
use crate::core::types::Step;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCursor {
    current_step_index: usize,
    completed_steps: Vec<Step>,
    pending_steps: Vec<Step>,
}

impl ExecutionCursor {
    /// Cursor at the start of `plan` with every step pending.
    pub fn start(plan: &ForwardPlan) -> Self {
        Self {
            current_step_index: 0,
            completed_steps: Vec::new(),
            pending_steps: plan.steps().to_vec(),
        }
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn completed_steps(&self) -> &[Step] {
        &self.completed_steps
    }

    pub fn pending_steps(&self) -> &[Step] {
        &self.pending_steps
    }

    /// Record the current step of `plan` as completed with `result` and advance.
    ///
    /// Returns the recorded copy, or `None` (leaving the cursor untouched) when
    /// the plan is empty or the cursor is already past its end.
    pub fn complete_current(&mut self, plan: &ForwardPlan, result: &str) -> Option<&Step> {
        let step = plan.get(self.current_step_index)?;
        self.completed_steps.push(step.with_result(result));
        self.current_step_index += 1;
        self.pending_steps = plan.suffix(self.current_step_index).to_vec();
        self.completed_steps.last()
    }
}
