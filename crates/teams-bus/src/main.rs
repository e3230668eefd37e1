//! team-bus - local real-time message bus for codex-teams sessions
//!
//! A thin CLI over the SQLite room log: ordered sends with mailbox
//! fan-out, indexed inbox reads, and the control-request lifecycle.

use clap::Parser;

mod cli;

use cli::Cli;

fn main() {
    codex_teams_core::logging::init();
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
