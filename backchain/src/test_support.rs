//! Test-only doubles for the oracle and command runner, plus step builders.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::conversation::Conversation;
use crate::core::types::Step;
use crate::io::oracle::Oracle;
use crate::io::shell::CommandRunner;

/// Oracle that replies from a fixed queue and records every conversation it saw.
///
/// Running out of replies is an error, which doubles as a failing collaborator.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<String>>,
    seen: RefCell<Vec<Conversation>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Queue another reply.
    pub fn push(&self, reply: impl Into<String>) {
        self.replies.borrow_mut().push_back(reply.into());
    }

    /// Conversations received so far, in call order.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.seen.borrow().clone()
    }

    /// Number of `generate` calls, including failed ones.
    pub fn calls(&self) -> usize {
        self.seen.borrow().len()
    }

    /// Last user prompt of every call.
    pub fn prompts(&self) -> Vec<String> {
        self.seen
            .borrow()
            .iter()
            .filter_map(|c| c.last().map(|m| m.content.clone()))
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn generate(&self, conversation: &Conversation) -> Result<String> {
        self.seen.borrow_mut().push(conversation.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted oracle exhausted"))
    }
}

/// Command runner that replies from a fixed queue and records commands.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outputs: RefCell<VecDeque<String>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: RefCell::new(outputs.into_iter().map(Into::into).collect()),
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str) -> Result<String> {
        self.commands.borrow_mut().push(command.to_string());
        self.outputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted runner exhausted"))
    }
}

/// Step with the given description, tools and prerequisites.
pub fn step(description: &str, tools: &[&str], prerequisites: &[&str]) -> Step {
    Step {
        description: description.to_string(),
        tools_needed: tools.iter().map(|t| t.to_string()).collect(),
        prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        result: None,
    }
}

/// Backward-planning reply describing `steps` in the requested format.
pub fn backward_response(steps: &[Step]) -> String {
    let mut buf = String::from("Working backwards from the goal:\n\n");
    for step in steps {
        buf.push_str("Prerequisite step:\n");
        buf.push_str(&format!("1. {}\n", step.description));
        buf.push_str(&format!("2. Tools: {}\n", step.tools_needed.join(", ")));
        buf.push_str(&format!(
            "3. Prerequisites: {}\n\n",
            step.prerequisites.join(", ")
        ));
    }
    buf
}

/// Step-execution reply with a fenced `bash` command.
pub fn command_response(command: &str) -> String {
    format!("I'll run this:\n\n```bash\n{command}\n```\n")
}

/// Follow-up backward reply that adds no steps.
pub const NO_FURTHER_STEPS: &str = "No further prerequisites.";

/// Reply to the planning query.
pub const PLAN_REVIEW: &str = "Success means the goal holds; verify after each step.";

/// Replies that take a goal to a ready forward plan over two text events:
/// the first backward round (`steps`, ending at the initial state), an empty
/// follow-up round that terminates planning, and the planning review.
pub fn planned_replies(steps: &[Step]) -> Vec<String> {
    vec![
        backward_response(steps),
        NO_FURTHER_STEPS.to_string(),
        PLAN_REVIEW.to_string(),
    ]
}
