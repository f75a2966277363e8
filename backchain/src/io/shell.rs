//! Command execution for steps that dispatch a shell command.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::io::config::ShellConfig;
use crate::io::process::run_command_with_timeout;

/// Abstraction over command executors.
pub trait CommandRunner {
    /// Run `command` and return its output text.
    ///
    /// A command that runs but fails still yields output; errors are reserved
    /// for failures to run it at all.
    fn run(&self, command: &str) -> Result<String>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &str) -> Result<String> {
        (**self).run(command)
    }
}

/// Runs commands through the configured interpreter (`sh -c` by default).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    config: ShellConfig,
}

impl ShellRunner {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }
}

impl CommandRunner for ShellRunner {
    #[instrument(skip_all, fields(command_bytes = command.len()))]
    fn run(&self, command: &str) -> Result<String> {
        let (program, prefix) = self
            .config
            .program
            .split_first()
            .ok_or_else(|| anyhow!("shell.program must be a non-empty array"))?;
        info!(program = %program, "running command");

        let mut cmd = Command::new(program);
        cmd.args(prefix).arg(command);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output =
            run_command_with_timeout(cmd, None, timeout, self.config.output_limit_bytes)
                .context("run shell command")?;

        let mut text = output.combined_text("command");
        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "command timed out");
            push_notice(
                &mut text,
                &format!("[command timed out after {}s]", timeout.as_secs()),
            );
        } else if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            warn!(exit_code = %code, "command failed");
            push_notice(&mut text, &format!("[exit status {code}]"));
        }
        Ok(text)
    }
}

fn push_notice(text: &mut String, notice: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(notice);
    text.push('\n');
}
