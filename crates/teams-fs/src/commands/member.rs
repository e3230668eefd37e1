//! Member CRUD commands

use anyhow::{Result, bail};
use clap::Args;
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::team::{self, NewMember};

#[derive(Args, Debug)]
pub struct MemberAddArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "worker")]
    agent_type: String,
    #[arg(long, default_value = "")]
    model: String,
    #[arg(long, default_value = "")]
    prompt: String,
    /// Palette color; assigned by joined order when empty
    #[arg(long, default_value = "")]
    color: String,
    #[arg(long)]
    plan_mode_required: bool,
    #[arg(long, default_value = ".")]
    cwd: String,
    #[arg(long, default_value = "tmux")]
    backend_type: String,
    #[arg(long, default_value = "auto")]
    mode: String,
    #[arg(long, default_value = "")]
    tmux_pane_id: String,
    #[arg(long)]
    json: bool,
}

pub fn execute_add(args: MemberAddArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let mut cfg = team::read_config(&paths)?;
    let cwd = std::fs::canonicalize(&args.cwd)
        .map(|p| p.display().to_string())
        .unwrap_or(args.cwd);
    let rec = team::add_member(
        &mut cfg,
        NewMember {
            name: args.name.clone(),
            agent_type: args.agent_type,
            model: args.model,
            prompt: args.prompt,
            color: args.color,
            plan_mode_required: args.plan_mode_required,
            cwd,
            backend_type: args.backend_type,
            mode: args.mode,
            pane_id: args.tmux_pane_id,
        },
    )?;
    team::write_config(&paths, &mut cfg)?;
    codex_teams_core::mailbox::ensure_inbox(&paths, &args.name)?;

    if args.json {
        println!("{}", serde_json::to_string(&rec)?);
    } else {
        println!("added={}", rec.name);
        println!("agent_id={}", rec.agent_id);
        println!("color={}", rec.color);
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct MemberRemoveArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    /// Member name or agent id
    #[arg(long)]
    ident: String,
}

pub fn execute_remove(args: MemberRemoveArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let mut cfg = team::read_config(&paths)?;
    let changed = team::remove_member(&mut cfg, &args.ident)?;
    if changed {
        team::write_config(&paths, &mut cfg)?;
    }
    println!("removed={changed}");
    Ok(())
}

#[derive(Args, Debug)]
pub struct MemberModeArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    ident: String,
    #[arg(long)]
    mode: String,
}

pub fn execute_mode(args: MemberModeArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let mut cfg = team::read_config(&paths)?;
    let changed = team::set_member_mode(&mut cfg, &args.ident, &args.mode);
    if changed {
        team::write_config(&paths, &mut cfg)?;
    }
    println!("updated={changed}");
    Ok(())
}

#[derive(Args, Debug)]
pub struct MemberBatchModeArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    /// name:mode (repeatable)
    #[arg(long = "entry", required = true)]
    entries: Vec<String>,
}

pub fn execute_batch_mode(args: MemberBatchModeArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let mut cfg = team::read_config(&paths)?;
    let mut changed = 0;
    for entry in &args.entries {
        let Some((ident, mode)) = entry.split_once(':') else {
            bail!("invalid --entry format: {entry}");
        };
        if team::set_member_mode(&mut cfg, ident.trim(), mode.trim()) {
            changed += 1;
        }
    }
    if changed > 0 {
        team::write_config(&paths, &mut cfg)?;
    }
    println!("updated={changed}");
    Ok(())
}
