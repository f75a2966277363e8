//! Planner configuration stored under `.backchain/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::agent::AgentSettings;
use crate::looping::LoopConfig;

/// Default config location relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".backchain/config.toml";

/// Planner configuration (TOML).
///
/// Missing fields default to the values in [`BackchainConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackchainConfig {
    /// Cap on backward-chain length and on backward oracle rounds.
    pub max_steps: usize,

    /// Run an intent-analysis query before backward planning.
    pub analyze_intent: bool,

    /// Characters of command output kept in a completed step's result.
    pub result_preview_chars: usize,

    /// Upper bound on events handled by one driver run.
    pub max_events: usize,

    /// Text the driver sends back after each status message.
    pub continue_message: String,

    pub oracle: OracleConfig,
    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,

    /// Transcript size sent on stdin; oldest turns are dropped past this.
    pub prompt_budget_bytes: usize,

    pub output_limit_bytes: usize,

    /// Where the last-message file and per-call logs are written.
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Interpreter prefix; the command text is appended as the last argument.
    pub program: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for BackchainConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            analyze_intent: true,
            result_preview_chars: 100,
            max_events: 200,
            continue_message: "continue".to_string(),
            oracle: OracleConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
            args: vec!["exec".to_string(), "--skip-git-repo-check".to_string()],
            timeout_secs: 10 * 60,
            prompt_budget_bytes: 60_000,
            output_limit_bytes: 100_000,
            state_dir: PathBuf::from(".backchain/oracle"),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: vec!["sh".to_string(), "-c".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl BackchainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.result_preview_chars == 0 {
            return Err(anyhow!("result_preview_chars must be > 0"));
        }
        if self.max_events == 0 {
            return Err(anyhow!("max_events must be > 0"));
        }
        if self.oracle.program.trim().is_empty() {
            return Err(anyhow!("oracle.program must be non-empty"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.prompt_budget_bytes == 0 {
            return Err(anyhow!("oracle.prompt_budget_bytes must be > 0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        if self.shell.program.is_empty() || self.shell.program[0].trim().is_empty() {
            return Err(anyhow!("shell.program must be a non-empty array"));
        }
        if self.shell.timeout_secs == 0 {
            return Err(anyhow!("shell.timeout_secs must be > 0"));
        }
        if self.shell.output_limit_bytes == 0 {
            return Err(anyhow!("shell.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            max_steps: self.max_steps,
            analyze_intent: self.analyze_intent,
            result_preview_chars: self.result_preview_chars,
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_events: self.max_events,
            continue_message: self.continue_message.clone(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BackchainConfig::default()`.
pub fn load_config(path: &Path) -> Result<BackchainConfig> {
    if !path.exists() {
        let cfg = BackchainConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BackchainConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BackchainConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
