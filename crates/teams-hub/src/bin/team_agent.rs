//! team-agent - single teammate loop for codex-teams
//!
//! Consumes file-based mailbox messages for one agent and coordinates
//! status over the room log, running the external agent as a blocking
//! child per prompt batch.

use clap::Parser;
use codex_teams_hub::agent_loop::{self, AgentOptions};
use std::path::PathBuf;

/// codex-teams single teammate loop
#[derive(Parser, Debug)]
#[command(name = "team-agent", version, about = "Single teammate mailbox loop")]
struct Cli {
    #[arg(long)]
    repo: PathBuf,

    #[arg(long)]
    session: String,

    #[arg(long, default_value = "main")]
    room: String,

    #[arg(long)]
    agent: String,

    #[arg(long, default_value = "worker")]
    role: String,

    #[arg(long)]
    cwd: PathBuf,

    #[arg(long, default_value = "pair")]
    profile: String,

    #[arg(long, default_value = "")]
    model: String,

    /// External agent binary
    #[arg(long, default_value = "codex")]
    codex_bin: String,

    #[arg(long, default_value_t = 500)]
    poll_ms: u64,

    #[arg(long, default_value_t = 12_000)]
    idle_ms: u64,

    #[arg(long, default_value = "default")]
    permission_mode: String,

    #[arg(long)]
    plan_mode_required: bool,

    /// Task queued before the first mailbox scan
    #[arg(long, default_value = "")]
    initial_task: String,
}

fn main() {
    codex_teams_core::logging::init();
    let cli = Cli::parse();

    let opts = AgentOptions {
        repo: cli.repo,
        session: cli.session,
        room: cli.room,
        agent: cli.agent,
        role: cli.role,
        cwd: cli.cwd,
        profile: cli.profile,
        model: cli.model,
        agent_bin: cli.codex_bin,
        poll_ms: cli.poll_ms,
        idle_ms: cli.idle_ms,
        permission_mode: cli.permission_mode,
        plan_mode_required: cli.plan_mode_required,
        initial_task: cli.initial_task,
    };

    match agent_loop::run(&opts) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
