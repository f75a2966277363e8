//! Human-readable renderings of plan and execution progress.

use crate::core::cursor::ExecutionCursor;
use crate::core::plan::ForwardPlan;
use crate::core::types::Step;

/// Numbered list of step descriptions, one per line, starting at `first_number`.
pub fn numbered_steps(steps: &[Step], first_number: usize) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", first_number + i, step.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inputs for [`render_execution_status`].
#[derive(Debug, Clone, Copy)]
pub struct StatusView<'a> {
    pub goal: &'a str,
    pub plan: &'a ForwardPlan,
    pub cursor: &'a ExecutionCursor,
    pub progress: &'a str,
}

pub fn render_execution_status(view: &StatusView<'_>) -> String {
    let StatusView {
        goal,
        plan,
        cursor,
        progress,
    } = *view;
    let index = cursor.current_step_index();

    let current = match plan.get(index) {
        Some(step) => format!(
            "Currently executing step {}/{}: {}",
            index + 1,
            plan.len(),
            step.description
        ),
        None => "All steps completed.".to_string(),
    };

    let completed = if cursor.completed_steps().is_empty() {
        "None yet.".to_string()
    } else {
        marked(cursor.completed_steps(), "✓", 1)
    };
    let pending = if cursor.pending_steps().is_empty() {
        "None remaining.".to_string()
    } else {
        marked(cursor.pending_steps(), "○", index + 1)
    };

    format!(
        "## Execution Status\n\n\
         **Goal:** {goal}\n\n\
         ### Plan\n{}\n\n\
         ### Current Step\n{current}\n\n\
         ### Completed\n{completed}\n\n\
         ### Pending\n{pending}\n\n\
         ### Observations\n{progress}",
        numbered_steps(plan.steps(), 1),
    )
}

fn marked(steps: &[Step], mark: &str, first_number: usize) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{mark} {}. {}", first_number + i, step.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::BackwardChain;

    #[test]
    fn status_marks_completed_and_pending() {
        let chain: BackwardChain = ["deploy", "build", "setup"]
            .iter()
            .map(|d| Step::new(*d))
            .collect();
        let plan = ForwardPlan::from_chain(&chain);
        let mut cursor = ExecutionCursor::start(&plan);
        cursor.complete_current(&plan, "ok");

        let status = render_execution_status(&StatusView {
            goal: "ship it",
            plan: &plan,
            cursor: &cursor,
            progress: "Completed 1/3 steps.",
        });

        assert!(status.contains("**Goal:** ship it"));
        assert!(status.contains("1. setup\n2. build\n3. deploy"));
        assert!(status.contains("Currently executing step 2/3: build"));
        assert!(status.contains("✓ 1. setup"));
        assert!(status.contains("○ 2. build\n○ 3. deploy"));
        assert!(status.ends_with("Completed 1/3 steps."));
    }

    #[test]
    fn status_after_last_step() {
        let plan = ForwardPlan::from_chain(&std::iter::once(Step::new("only")).collect());
        let mut cursor = ExecutionCursor::start(&plan);
        cursor.complete_current(&plan, "ok");

        let status = render_execution_status(&StatusView {
            goal: "g",
            plan: &plan,
            cursor: &cursor,
            progress: "",
        });
        assert!(status.contains("All steps completed."));
        assert!(status.contains("None remaining."));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ééééé", 2), "éé...");
        assert_eq!(preview("abc", 3), "abc");
    }
}
