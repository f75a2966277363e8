//! Intent-analysis response parsing.
//!
//! The oracle answers in a bracketed notation:
//!
//! ```text
//! [Input] → [User Intent] → [Intent](Build a web application)
//! [Fixed User want intent] = Build a simple web application
//! [Goal]=[Tasks](
//!   Task 1: Set up the development environment,
//!   Task 2: Create the frontend,
//! )
//! Required tools: editor, terminal
//! ```

const PLACEHOLDER: &str = "To be determined";
const BORDER: &str = "◤◢◤◢◤◢◤◢◤◢◤◢◤◢◤◢◤◢◤◢◤◢◤◢◤◢◤◢";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentAnalysis {
    pub intent: String,
    pub fixed_goal: Option<String>,
    pub tasks: Vec<String>,
    pub required_tools: Vec<String>,
}

impl IntentAnalysis {
    /// Goal to plan for: the fixed goal when present, else the user's own words.
    pub fn goal_or(&self, user_input: &str) -> String {
        self.fixed_goal
            .clone()
            .unwrap_or_else(|| user_input.trim().to_string())
    }

    /// Bordered block summarizing intent, goal, tasks and required tools.
    pub fn visualize(&self) -> String {
        let mut content = format!("[Input] → [User Intent] → [Intent]({})\n\n", self.intent);
        content.push_str(&format!(
            "[Fixed User want intent] = {}\n\n",
            self.fixed_goal.as_deref().unwrap_or_default()
        ));
        content.push_str("Achieve Goal == Need Tasks\n[Goal]=[Tasks](\n");
        for (i, task) in self.tasks.iter().enumerate() {
            content.push_str(&format!("  Task {}: {}\n", i + 1, task));
        }
        content.push(')');
        if !self.required_tools.is_empty() {
            content.push_str(&format!(
                "\n\nRequired tools: {}",
                self.required_tools.join(", ")
            ));
        }
        format!("{BORDER}\n{content}\n{BORDER}")
    }
}

pub fn parse_intent_analysis(text: &str) -> IntentAnalysis {
    let lines: Vec<&str> = text.lines().collect();
    let mut analysis = IntentAnalysis::default();

    for (i, line) in lines.iter().enumerate() {
        if line.contains("[Intent]") {
            let intent = inline_intent(line).or_else(|| {
                lines
                    .get(i + 1)
                    .map(|next| next.trim())
                    .filter(|next| !next.is_empty() && !next.starts_with('['))
            });
            if let Some(intent) = intent {
                analysis.intent = intent.to_string();
            }
        }

        if line.contains("[Fixed User want intent]") {
            analysis.fixed_goal = line
                .rsplit('=')
                .next()
                .map(str::trim)
                .filter(|goal| !goal.is_empty() && *goal != PLACEHOLDER)
                .map(str::to_string);
        }

        if let Some(task) = task_item(line).filter(|task| *task != PLACEHOLDER) {
            analysis.tasks.push(task.to_string());
        }

        if let Some((_, tools)) = line.split_once("Required tools:") {
            analysis.required_tools = tools
                .split(',')
                .map(str::trim)
                .filter(|tool| !tool.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    analysis
}

/// `Task <n>: text` on a trimmed line, with the trailing comma dropped.
fn task_item(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("Task ")?;
    let (number, task) = rest.split_once(':')?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let task = task.trim().trim_end_matches(',').trim();
    (!task.is_empty()).then_some(task)
}

/// `[Intent](text)` on the same line.
fn inline_intent(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once("[Intent](")?;
    let inner = rest.rsplit_once(')').map_or(rest, |(inner, _)| inner).trim();
    (!inner.is_empty()).then_some(inner)
}
