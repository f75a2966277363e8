//! Oracle abstraction for text generation.
//!
//! The [`Oracle`] trait decouples the planner from the actual model backend
//! (currently `codex exec`). Tests use scripted oracles that return
//! predetermined replies without spawning processes.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::conversation::{Conversation, Message, Role};
use crate::io::config::OracleConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Abstraction over text-generation backends.
pub trait Oracle {
    /// Produce the next assistant reply for `conversation`.
    fn generate(&self, conversation: &Conversation) -> Result<String>;
}

impl<T: Oracle + ?Sized> Oracle for &T {
    fn generate(&self, conversation: &Conversation) -> Result<String> {
        (**self).generate(conversation)
    }
}

/// An oracle paired with the conversation it answers within.
pub struct OracleContext<'a, O: Oracle> {
    oracle: &'a O,
    conversation: &'a mut Conversation,
}

impl<'a, O: Oracle> OracleContext<'a, O> {
    pub fn new(oracle: &'a O, conversation: &'a mut Conversation) -> Self {
        Self {
            oracle,
            conversation,
        }
    }

    /// Query with `conversation + [prompt]`; the reply is logged only on success.
    #[instrument(skip_all, fields(history = self.conversation.len(), prompt_bytes = prompt.len()))]
    pub fn ask(&mut self, prompt: &str) -> Result<String> {
        let query = self.conversation.with_user_turn(prompt);
        let reply = self.oracle.generate(&query).context("oracle query")?;
        debug!(reply_bytes = reply.len(), "oracle replied");
        self.conversation.push_assistant(reply.clone());
        Ok(reply)
    }
}

/// Oracle that spawns the configured program (`codex exec` by default).
#[derive(Debug)]
pub struct CodexOracle {
    config: OracleConfig,
    workdir: PathBuf,
    calls: Cell<u32>,
}

impl CodexOracle {
    pub fn new(config: OracleConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            workdir: workdir.into(),
            calls: Cell::new(0),
        }
    }

    fn state_dir(&self) -> PathBuf {
        if self.config.state_dir.is_absolute() {
            self.config.state_dir.clone()
        } else {
            self.workdir.join(&self.config.state_dir)
        }
    }
}

impl Oracle for CodexOracle {
    #[instrument(skip_all, fields(program = %self.config.program, messages = conversation.len()))]
    fn generate(&self, conversation: &Conversation) -> Result<String> {
        let call = self.calls.get() + 1;
        self.calls.set(call);

        let state_dir = self.state_dir();
        fs::create_dir_all(&state_dir)
            .with_context(|| format!("create oracle state dir {}", state_dir.display()))?;
        let output_path = state_dir.join(format!("call-{call:04}.last.md"));
        let log_path = state_dir.join(format!("call-{call:04}.log"));
        if output_path.exists() {
            fs::remove_file(&output_path)
                .with_context(|| format!("remove stale output {}", output_path.display()))?;
        }

        let transcript = render_transcript(conversation, self.config.prompt_budget_bytes);
        info!(call, transcript_bytes = transcript.len(), "starting oracle");

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--output-last-message")
            .arg(&output_path)
            .arg("-")
            .current_dir(&self.workdir);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = run_command_with_timeout(
            cmd,
            Some(transcript.as_bytes()),
            timeout,
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.config.program))?;

        write_oracle_log(&log_path, &output)?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "oracle timed out");
            return Err(anyhow!(
                "{} timed out after {:?}",
                self.config.program,
                timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "oracle failed");
            return Err(anyhow!(
                "{} failed with status {:?}",
                self.config.program,
                output.status.code()
            ));
        }
        if !output_path.exists() {
            return Err(anyhow!("missing oracle output {}", output_path.display()));
        }

        let reply = fs::read_to_string(&output_path)
            .with_context(|| format!("read oracle output {}", output_path.display()))?;
        debug!(reply_bytes = reply.len(), "oracle completed");
        Ok(reply)
    }
}

/// Render a role-tagged transcript of at most `budget` bytes.
///
/// The leading system message and the newest message are always kept; the
/// oldest turns in between are dropped first. If the kept turns alone exceed
/// the budget, the newest turn is cut and marked `[truncated]`.
pub fn render_transcript(conversation: &Conversation, budget: usize) -> String {
    let messages = conversation.messages();
    let Some((newest, rest)) = messages.split_last() else {
        return String::new();
    };
    let (head, middle) = match rest.split_first() {
        Some((first, middle)) if first.role == Role::System => (Some(first), middle),
        _ => (None, rest),
    };

    let head_block = head.map(render_message);
    let newest_block = render_message(newest);
    let fixed_len = head_block.as_ref().map_or(0, String::len) + newest_block.len();

    let mut kept: Vec<String> = Vec::new();
    let mut used = fixed_len;
    for message in middle.iter().rev() {
        let block = render_message(message);
        if used + block.len() > budget {
            break;
        }
        used += block.len();
        kept.push(block);
    }
    kept.reverse();
    let dropped = middle.len() - kept.len();
    if dropped > 0 {
        debug!(dropped, "dropped oldest turns for budget");
    }

    let mut blocks: Vec<String> = Vec::new();
    blocks.extend(head_block);
    if dropped > 0 {
        blocks.push(format!("[{dropped} earlier messages omitted]\n"));
    }
    blocks.extend(kept);

    let other_len: usize = blocks.iter().map(String::len).sum();
    let allowed = budget.saturating_sub(other_len);
    if newest_block.len() > allowed {
        const MARKER: &str = "\n[truncated]\n";
        let keep = floor_char_boundary(&newest_block, allowed.saturating_sub(MARKER.len()));
        debug!(
            before_len = newest_block.len(),
            after_len = keep,
            "truncated newest turn for budget"
        );
        blocks.push(format!("{}{MARKER}", &newest_block[..keep]));
    } else {
        blocks.push(newest_block);
    }

    blocks.concat()
}

fn render_message(message: &Message) -> String {
    let role = message.role.as_str();
    format!("<{role}>\n{}\n</{role}>\n", message.content.trim_end())
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn write_oracle_log(path: &Path, output: &CommandOutput) -> Result<()> {
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice("oracle"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice("oracle"));
    if output.timed_out {
        buf.push_str("\n[oracle timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write oracle log {}", path.display()))
}
