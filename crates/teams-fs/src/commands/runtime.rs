//! Runtime record commands

use anyhow::Result;
use clap::Args;
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::runtime;

#[derive(Args, Debug)]
pub struct RuntimeSetArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long, default_value = "tmux")]
    backend: String,
    #[arg(long, default_value = "running")]
    status: String,
    #[arg(long, default_value_t = 0)]
    pid: u32,
    #[arg(long, default_value = "")]
    pane_id: String,
    #[arg(long, default_value = "")]
    window: String,
}

pub fn execute_set(args: RuntimeSetArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let rec = runtime::runtime_set(
        &paths,
        &args.agent,
        &args.backend,
        &args.status,
        args.pid,
        &args.pane_id,
        &args.window,
    )?;
    println!("{}", serde_json::to_string(&rec)?);
    Ok(())
}

#[derive(Args, Debug)]
pub struct RuntimeMarkArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    status: String,
    #[arg(long)]
    pid: Option<u32>,
}

pub fn execute_mark(args: RuntimeMarkArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let rec = runtime::runtime_mark(&paths, &args.agent, &args.status, args.pid)?;
    println!("{}", serde_json::to_string(&rec)?);
    Ok(())
}

#[derive(Args, Debug)]
pub struct RuntimeListArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    json: bool,
    /// Persist pruned statuses back to the table
    #[arg(long)]
    prune_write: bool,
}

pub fn execute_list(args: RuntimeListArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let mut table = runtime::read_runtime(&paths)?;
    let changed = table.prune();
    if changed > 0 && args.prune_write {
        runtime::write_runtime(&paths, &mut table)?;
    }
    if args.json {
        println!("{}", serde_json::to_string(&table)?);
        return Ok(());
    }
    for (name, rec) in &table.agents {
        println!(
            "agent={name} backend={} status={} pid={} pane={} window={}",
            rec.backend, rec.status, rec.pid, rec.pane_id, rec.window
        );
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct RuntimeKillArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long, value_parser = ["term", "kill"], default_value = "term")]
    signal: String,
}

pub fn execute_kill(args: RuntimeKillArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let rec = runtime::runtime_kill(&paths, &args.agent, args.signal == "kill")?;
    println!("{}", serde_json::to_string(&rec)?);
    Ok(())
}
