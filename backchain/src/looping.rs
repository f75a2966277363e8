//! Event-driving loop for `backchain run`.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::agent::GoalSeekAgent;
use crate::core::types::{AgentEvent, AgentRequest};
use crate::io::oracle::Oracle;
use crate::io::shell::CommandRunner;

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The agent finished; carries its final summary.
    Finished(String),
    /// `max_events` events were handled without a finish.
    EventLimitReached { max_events: usize },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub events_handled: usize,
    pub commands_run: usize,
    pub stop: LoopStop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    pub max_events: usize,
    /// Text sent back after each status message.
    pub continue_message: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_events: 200,
            continue_message: "continue".to_string(),
        }
    }
}

/// Feed `goal` to the agent, then keep answering its requests until it finishes
/// or `max_events` events have been handled.
///
/// Messages are answered with the continue message, commands are run through
/// `runner` and their output fed back. `on_request` sees every request in order.
/// Oracle and runner errors stop the loop immediately.
#[instrument(skip_all, fields(max_events = config.max_events))]
pub fn run_loop<O: Oracle, R: CommandRunner, F: FnMut(&AgentRequest)>(
    agent: &mut GoalSeekAgent<O>,
    runner: &R,
    goal: &str,
    config: &LoopConfig,
    mut on_request: F,
) -> Result<LoopOutcome> {
    let mut event = AgentEvent::Text(goal.to_string());
    let mut events_handled = 0usize;
    let mut commands_run = 0usize;

    while events_handled < config.max_events {
        let request = agent
            .handle_event(event)
            .with_context(|| format!("handle event {}", events_handled + 1))?;
        events_handled += 1;
        on_request(&request);

        event = match request {
            AgentRequest::Finish(summary) => {
                info!(events_handled, commands_run, "agent finished");
                return Ok(LoopOutcome {
                    events_handled,
                    commands_run,
                    stop: LoopStop::Finished(summary),
                });
            }
            AgentRequest::Message(_) => AgentEvent::Text(config.continue_message.clone()),
            AgentRequest::RunCommand(command) => {
                debug!(command = %command, "running requested command");
                let output = runner.run(&command).context("run command")?;
                commands_run += 1;
                AgentEvent::CommandOutput { command, output }
            }
        };
    }

    info!(events_handled, "event limit reached");
    Ok(LoopOutcome {
        events_handled,
        commands_run,
        stop: LoopStop::EventLimitReached {
            max_events: config.max_events,
        },
    })
}
