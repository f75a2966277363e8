//! Working-backwards planner CLI.
//!
//! `backchain run` drives one goal from backward planning through forward
//! execution, asking the configured oracle for each step and running any fenced
//! commands through the shell.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use backchain::agent::GoalSeekAgent;
use backchain::core::command::extract_command;
use backchain::core::step_parser::{has_reached_initial_state, parse_backward_steps};
use backchain::core::types::{AgentRequest, Step};
use backchain::exit_codes;
use backchain::io::config::{DEFAULT_CONFIG_PATH, BackchainConfig, load_config, write_config};
use backchain::io::oracle::CodexOracle;
use backchain::io::shell::ShellRunner;
use backchain::logging;
use backchain::looping::{LoopStop, run_loop};

#[derive(Parser)]
#[command(
    name = "backchain",
    version,
    about = "Plan by working backwards from a goal, then execute forwards"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config to `.backchain/config.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan and execute a goal.
    Run {
        /// What should be true when the run finishes.
        #[arg(short, long)]
        goal: String,
        /// Config file to load (missing file means defaults).
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Override `max_steps` from the config.
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Parse an oracle response (file or stdin) and print what the planner sees.
    Inspect {
        /// Response file; reads stdin when omitted.
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct InspectReport {
    steps: Vec<Step>,
    reached_initial_state: bool,
    command: Option<String>,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(Path::new(DEFAULT_CONFIG_PATH), force),
        Command::Run {
            goal,
            config,
            max_steps,
        } => cmd_run(&goal, &config, max_steps),
        Command::Inspect { file } => cmd_inspect(file.as_deref()),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &BackchainConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(goal: &str, config_path: &Path, max_steps: Option<usize>) -> Result<i32> {
    if goal.trim().is_empty() {
        return Err(anyhow!("--goal must not be empty"));
    }
    let mut cfg = load_config(config_path)?;
    if let Some(max_steps) = max_steps {
        cfg.max_steps = max_steps;
        cfg.validate()?;
    }

    let workdir = std::env::current_dir().context("resolve working directory")?;
    let oracle = CodexOracle::new(cfg.oracle.clone(), workdir);
    let runner = ShellRunner::new(cfg.shell.clone());
    let mut agent = GoalSeekAgent::new(oracle, cfg.agent_settings())?;

    let stdout = std::io::stdout();
    print_request(&mut stdout.lock(), &agent.greeting())?;
    let mut write_err = None;
    let outcome = run_loop(&mut agent, &runner, goal, &cfg.loop_config(), |request| {
        if write_err.is_none() {
            write_err = print_request(&mut stdout.lock(), request).err();
        }
    })?;
    if let Some(err) = write_err {
        return Err(err);
    }

    match outcome.stop {
        LoopStop::Finished(_) => Ok(exit_codes::OK),
        LoopStop::EventLimitReached { max_events } => {
            eprintln!(
                "stopped after {max_events} events without finishing (phase: {})",
                agent.phase().as_str()
            );
            Ok(exit_codes::INCOMPLETE)
        }
    }
}

fn print_request(out: &mut impl Write, request: &AgentRequest) -> Result<()> {
    match request {
        AgentRequest::Message(message) => writeln!(out, "{message}\n"),
        AgentRequest::RunCommand(command) => writeln!(out, "$ {command}\n"),
        AgentRequest::Finish(summary) => writeln!(out, "{summary}"),
    }
    .context("write output")
}

fn cmd_inspect(file: Option<&Path>) -> Result<i32> {
    let text = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            buf
        }
    };

    let steps = parse_backward_steps(&text);
    let report = InspectReport {
        reached_initial_state: has_reached_initial_state(&steps),
        command: extract_command(&text),
        steps,
    };
    let mut payload = serde_json::to_string_pretty(&report).context("serialize json")?;
    payload.push('\n');
    print!("{payload}");
    Ok(exit_codes::OK)
}
