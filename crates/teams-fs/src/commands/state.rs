//! State blob commands

use anyhow::Result;
use clap::Args;
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::{state, team};

#[derive(Args, Debug)]
pub struct InboxPollArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    #[arg(long)]
    mark_read: bool,
    #[arg(long)]
    json: bool,
}

pub fn execute_inbox_poll(args: InboxPollArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let queued = state::inbox_poll(&paths, &args.agent, args.limit, args.mark_read)?;
    if args.json {
        println!("{}", serde_json::to_string(&queued)?);
        return Ok(());
    }
    for item in queued {
        let msg_type = item.message["type"].as_str().unwrap_or_default().to_string();
        let from = item.message["from"].as_str().unwrap_or_default().to_string();
        let summary = item.message["summary"].as_str().unwrap_or_default().to_string();
        println!(
            "queued mailbox_index={} type={msg_type} from={from} summary={summary}",
            item.mailbox_index
        );
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct StateContextSetArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long, default_value = "team-lead")]
    self_name: String,
}

pub fn execute_context_set(args: StateContextSetArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let cfg = team::read_config(&paths)?;
    state::set_team_context(&paths, &cfg, &args.self_name)?;
    println!("state={}", paths.state.display());
    Ok(())
}

#[derive(Args, Debug)]
pub struct StateContextClearArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
}

pub fn execute_context_clear(args: StateContextClearArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    state::clear_team_context(&paths)?;
    println!("state={}", paths.state.display());
    Ok(())
}

#[derive(Args, Debug)]
pub struct StateGetArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    compact: bool,
}

pub fn execute_get(args: StateGetArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let blob = state::read_state(&paths)?;
    if args.compact {
        println!("{}", serde_json::to_string(&blob)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&blob)?);
    }
    Ok(())
}
