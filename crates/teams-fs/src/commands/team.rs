//! Team lifecycle commands

use anyhow::Result;
use clap::Args;
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::team;
use serde_json::json;

#[derive(Args, Debug)]
pub struct TeamCreateArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    team_name: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "team-lead")]
    agent_type: String,
    #[arg(long, default_value = "team-lead")]
    lead_name: String,
    #[arg(long, default_value = "")]
    model: String,
    #[arg(long, default_value = ".")]
    cwd: String,
    #[arg(long, default_value = "")]
    lead_session_id: String,
    #[arg(long, default_value = "")]
    parent_session_id: String,
    #[arg(long, default_value = "tmux")]
    backend_type: String,
    #[arg(long, default_value = "auto")]
    mode: String,
    /// Replace an existing team, clearing runtime artifacts
    #[arg(long)]
    replace: bool,
    #[arg(long)]
    json: bool,
}

pub fn execute_create(args: TeamCreateArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let lead_session_id = if args.lead_session_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        args.lead_session_id
    };
    let parent_session_id = if args.parent_session_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        args.parent_session_id
    };
    let cwd = std::fs::canonicalize(&args.cwd)
        .map(|p| p.display().to_string())
        .unwrap_or(args.cwd);

    let cfg = team::create_team(
        &paths,
        &args.team_name,
        &args.description,
        &args.lead_name,
        &args.agent_type,
        &args.model,
        &cwd,
        &lead_session_id,
        &parent_session_id,
        &args.backend_type,
        &args.mode,
        args.replace,
    )?;

    let out = json!({
        "team_name": cfg.name,
        "team_root": paths.root.display().to_string(),
        "config": paths.config.display().to_string(),
        "tasks": paths.tasks.display().to_string(),
        "lead": args.lead_name,
    });
    if args.json {
        println!("{out}");
    } else {
        for key in ["team_name", "team_root", "config", "tasks", "lead"] {
            println!("{key}={}", out[key].as_str().unwrap_or_default());
        }
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct TeamDeleteArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    /// Delete even while runtime records show live processes
    #[arg(long)]
    force: bool,
}

pub fn execute_delete(args: TeamDeleteArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    team::delete_team(&paths, args.force)?;
    println!("deleted={}", paths.root.display());
    Ok(())
}

#[derive(Args, Debug)]
pub struct TeamGetArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    json: bool,
}

pub fn execute_get(args: TeamGetArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let cfg = team::read_config(&paths)?;
    if args.json {
        println!("{}", serde_json::to_string(&cfg)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
    }
    Ok(())
}
