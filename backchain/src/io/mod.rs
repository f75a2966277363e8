//! Side-effecting collaborators: oracle, shell, processes, prompts and config.

pub mod config;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod shell;
