//! Filesystem control-request commands

use anyhow::{Result, bail};
use clap::Args;
use codex_teams_core::control::{
    self, ControlRequestInput, ControlResponseInput,
};
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::schema::ControlType;
use codex_teams_core::team;

#[derive(Args, Debug)]
pub struct ControlRequestArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long = "type", value_parser = ["plan_approval", "shutdown", "permission", "mode_set"])]
    req_type: String,
    #[arg(long = "from")]
    sender: String,
    #[arg(long = "to")]
    recipient: String,
    #[arg(long)]
    body: String,
    #[arg(long, default_value = "")]
    summary: String,
    #[arg(long, default_value = "")]
    request_id: String,
}

pub fn execute_request(args: ControlRequestArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let cfg = team::read_config(&paths)?;
    let req_type: ControlType = args.req_type.parse().map_err(anyhow::Error::msg)?;
    let rid = control::create_control_request(
        &paths,
        &cfg,
        ControlRequestInput {
            req_type,
            sender: args.sender,
            recipient: args.recipient,
            body: args.body,
            summary: args.summary,
            request_id: args.request_id,
        },
    )?;
    println!("request_id={rid}");
    Ok(())
}

#[derive(Args, Debug)]
pub struct ControlRespondArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    request_id: String,
    #[arg(long = "from")]
    sender: String,
    #[arg(long, conflicts_with = "reject")]
    approve: bool,
    #[arg(long, conflicts_with = "approve")]
    reject: bool,
    #[arg(long, default_value = "")]
    body: String,
    /// Response recipient override (default: the original sender)
    #[arg(long = "to", default_value = "")]
    recipient: String,
    /// Resolve a legacy message-only request without a record
    #[arg(long, default_value = "")]
    req_type: String,
}

pub fn execute_respond(args: ControlRespondArgs) -> Result<()> {
    if !args.approve && !args.reject {
        bail!("one of --approve or --reject is required");
    }
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let cfg = team::read_config(&paths)?;
    let approve = args.approve && !args.reject;
    let body = if args.body.is_empty() {
        if approve { "approved" } else { "rejected" }.to_string()
    } else {
        args.body
    };
    let req_type_override = if args.req_type.is_empty() {
        None
    } else {
        Some(ControlType::normalize(&args.req_type).map_err(anyhow::Error::msg)?)
    };

    let resolved = control::respond_control_request(
        &paths,
        &cfg,
        ControlResponseInput {
            request_id: args.request_id,
            responder: args.sender,
            approve,
            body,
            recipient_override: args.recipient,
            req_type_override,
        },
    )?;
    println!("request_id={}", resolved.request_id);
    println!("status={}", resolved.status);
    println!("req_type={}", resolved.req_type);
    println!("sender={}", resolved.sender);
    println!("recipient={}", resolved.recipient);
    Ok(())
}

#[derive(Args, Debug)]
pub struct ControlPendingArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    all_status: bool,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

pub fn execute_pending(args: ControlPendingArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let rows = control::list_control_requests(&paths, &args.agent, args.all_status, args.limit)?;
    if args.json {
        println!("{}", serde_json::to_string(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("(no requests)");
        return Ok(());
    }
    for r in rows {
        println!(
            "request_id={} type={} from={} to={} status={} created={}",
            r.request_id, r.req_type, r.sender, r.recipient, r.status, r.created_ts
        );
        println!("body={}", r.body);
        if !r.response_body.is_empty() {
            println!("response={}", r.response_body);
        }
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct ControlGetArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    request_id: String,
    #[arg(long)]
    json: bool,
}

pub fn execute_get(args: ControlGetArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let Some(req) = control::get_control_request(&paths, &args.request_id)? else {
        bail!("request not found: {}", args.request_id);
    };
    if args.json {
        println!("{}", serde_json::to_string(&req)?);
        return Ok(());
    }
    println!("request_id={}", req.request_id);
    println!("req_type={}", req.req_type);
    println!("sender={}", req.sender);
    println!("recipient={}", req.recipient);
    println!("status={}", req.status);
    println!("created_ts={}", req.created_ts);
    println!("updated_ts={}", req.updated_ts);
    println!("body={}", req.body);
    println!("response_body={}", req.response_body);
    Ok(())
}
