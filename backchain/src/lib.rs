//! Plan-and-execute orchestration by working backwards from a goal.
//!
//! The planner asks an oracle for the prerequisites of a goal, then of those
//! prerequisites, until it reaches the current state or a step cap. The chain is
//! reversed into a forward plan and executed one step at a time; steps that need
//! a shell command are handed to an executor and resume when the output arrives.
//!
//! - **[`core`]**: Pure, deterministic logic (step model, plan, cursor, response
//!   parsers). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (oracle process, shell, config,
//!   prompts). Isolated behind traits so tests can script them.
//!
//! Orchestration modules ([`backward`], [`forward`], [`agent`], [`looping`])
//! combine the two into the planner state machine and its driver.

pub mod agent;
pub mod backward;
pub mod core;
pub mod exit_codes;
pub mod forward;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
