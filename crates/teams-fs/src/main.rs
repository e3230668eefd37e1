//! team-fs - filesystem state core for codex-teams
//!
//! Claude-Teams-like local artifacts under `<repo>/.codex-teams/<session>/`:
//! team config, file mailboxes with locking, runtime records, the state
//! blob, and the filesystem side of control requests.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() {
    codex_teams_core::logging::init();
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
