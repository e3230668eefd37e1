//! team-bridge - tmux mailbox bridge for codex-teams
//!
//! Polls file inboxes and injects unread teammate messages into each
//! running tmux pane so teammate communication continues without manual
//! mailbox checks.

use clap::Parser;
use codex_teams_hub::bridge::{self, BridgeOptions};
use std::path::PathBuf;

/// Inject unread codex-teams mailbox messages into tmux panes
#[derive(Parser, Debug)]
#[command(name = "team-bridge", version, about = "tmux mailbox bridge")]
struct Cli {
    #[arg(long)]
    repo: PathBuf,

    #[arg(long)]
    session: String,

    #[arg(long, default_value = "main")]
    room: String,

    /// tmux session to watch (defaults to the team session name)
    #[arg(long, default_value = "")]
    tmux_session: String,

    #[arg(long, default_value = "lead")]
    lead_name: String,

    #[arg(long, default_value_t = 800)]
    poll_ms: u64,

    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Kill a worker's pane when its done signal reaches the lead
    #[arg(long)]
    auto_kill: bool,
}

fn main() {
    codex_teams_core::logging::init();
    let cli = Cli::parse();

    let opts = BridgeOptions {
        repo: cli.repo,
        session: cli.session,
        room: cli.room,
        tmux_session: cli.tmux_session,
        lead_name: cli.lead_name,
        poll_ms: cli.poll_ms,
        limit: cli.limit,
        auto_kill: cli.auto_kill,
    };

    match bridge::run(&opts) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
