//! team-hub - shared in-process teammate hub for codex-teams
//!
//! Runs multiple teammate mailbox loops inside one supervisor process.
//! Each teammate keeps independent mailbox/runtime state while polling
//! and execution are coordinated from this single process.

use clap::Parser;
use codex_teams_hub::hub::{self, HubOptions};
use std::path::PathBuf;

/// codex-teams shared in-process hub
#[derive(Parser, Debug)]
#[command(name = "team-hub", version, about = "Shared in-process teammate hub")]
struct Cli {
    #[arg(long)]
    repo: PathBuf,

    #[arg(long)]
    session: String,

    #[arg(long, default_value = "main")]
    room: String,

    /// Worker name prefix when --agents-csv is not given
    #[arg(long, default_value = "worker")]
    prefix: String,

    /// Number of prefix-named workers
    #[arg(long, default_value_t = 0)]
    count: usize,

    /// Explicit comma-separated worker names (overrides --prefix/--count)
    #[arg(long, default_value = "")]
    agents_csv: String,

    /// Directory holding one worktree per worker
    #[arg(long)]
    worktrees_root: PathBuf,

    #[arg(long, default_value = "pair")]
    profile: String,

    #[arg(long, default_value = "")]
    model: String,

    #[arg(long, default_value = "lead")]
    lead_name: String,

    #[arg(long, default_value = "")]
    lead_cwd: String,

    #[arg(long, default_value = "")]
    lead_profile: String,

    #[arg(long, default_value = "")]
    lead_model: String,

    #[arg(long, default_value = "")]
    reviewer_name: String,

    #[arg(long, default_value = "")]
    reviewer_profile: String,

    #[arg(long, default_value = "")]
    reviewer_model: String,

    #[arg(long, default_value = "plan")]
    reviewer_permission_mode: String,

    /// External agent binary
    #[arg(long, default_value = "codex")]
    codex_bin: String,

    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    #[arg(long, default_value_t = 12_000)]
    idle_ms: u64,

    #[arg(long, default_value = "default")]
    permission_mode: String,

    #[arg(long)]
    plan_mode_required: bool,

    #[arg(long)]
    heartbeat_file: Option<PathBuf>,

    #[arg(long)]
    lifecycle_log: Option<PathBuf>,
}

fn main() {
    codex_teams_core::logging::init();
    let cli = Cli::parse();

    let opts = HubOptions {
        repo: cli.repo,
        session: cli.session,
        room: cli.room,
        prefix: cli.prefix,
        count: cli.count,
        agents_csv: cli.agents_csv,
        worktrees_root: cli.worktrees_root,
        profile: cli.profile,
        model: cli.model,
        lead_name: cli.lead_name,
        lead_cwd: cli.lead_cwd,
        lead_profile: cli.lead_profile,
        lead_model: cli.lead_model,
        reviewer_name: cli.reviewer_name,
        reviewer_profile: cli.reviewer_profile,
        reviewer_model: cli.reviewer_model,
        reviewer_permission_mode: cli.reviewer_permission_mode,
        agent_bin: cli.codex_bin,
        poll_ms: cli.poll_ms,
        idle_ms: cli.idle_ms,
        permission_mode: cli.permission_mode,
        plan_mode_required: cli.plan_mode_required,
        heartbeat_file: cli.heartbeat_file,
        lifecycle_log: cli.lifecycle_log,
    };

    match hub::run(&opts) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
