//! Mailbox commands: write, read, mark-read, format, dispatch helpers

use anyhow::{Result, bail};
use clap::Args;
use codex_teams_core::dispatch::{Outgoing, deliver_message};
use codex_teams_core::mailbox;
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::schema::MailboxMessage;
use codex_teams_core::team;
use serde_json::json;
use std::collections::HashMap;

fn parse_meta_object(raw: &str) -> Result<Option<serde_json::Value>> {
    if raw.trim().is_empty() || raw.trim() == "{}" {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        bail!("expected JSON object");
    }
    Ok(Some(value))
}

fn parse_approve(raw: &str) -> Option<bool> {
    Some(matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[derive(Args, Debug)]
pub struct MailboxWriteArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long = "from")]
    sender: String,
    #[arg(long)]
    text: String,
    #[arg(long, default_value = "")]
    summary: String,
    #[arg(long, default_value = "blue")]
    color: String,
    #[arg(long = "type")]
    msg_type: String,
    #[arg(long, default_value = "")]
    request_id: String,
    /// true/false
    #[arg(long)]
    approve: Option<String>,
    #[arg(long, default_value = "{}")]
    meta: String,
}

pub fn execute_write(args: MailboxWriteArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    paths.ensure_dirs()?;
    let message = MailboxMessage {
        msg_type: args.msg_type,
        from: args.sender,
        recipient: None,
        text: args.text,
        summary: args.summary,
        timestamp: String::new(),
        color: args.color,
        read: false,
        request_id: (!args.request_id.is_empty()).then_some(args.request_id),
        approve: args.approve.as_deref().and_then(parse_approve),
        meta: parse_meta_object(&args.meta)?,
        unknown_fields: HashMap::new(),
    };
    let index = mailbox::write_mailbox(&paths, &args.agent, message)?;
    println!("mailbox_index={index}");
    Ok(())
}

#[derive(Args, Debug)]
pub struct MailboxReadArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    unread: bool,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

pub fn execute_read(args: MailboxReadArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let mut values = mailbox::read_indexed(&paths, &args.agent, args.unread, 0, usize::MAX)?;
    if args.limit > 0 && values.len() > args.limit {
        values.drain(..values.len() - args.limit);
    }
    if args.json {
        let rows: Vec<serde_json::Value> = values
            .iter()
            .map(|(idx, msg)| {
                let mut obj = serde_json::to_value(msg).unwrap_or_else(|_| json!({}));
                obj["index"] = json!(idx);
                obj
            })
            .collect();
        println!("{}", serde_json::to_string(&rows)?);
        return Ok(());
    }
    for (idx, msg) in values {
        println!(
            "[{idx:04}] read={} type={} from={} summary={} text={}",
            msg.read, msg.msg_type, msg.from, msg.summary, msg.text
        );
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct MailboxMarkReadArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    /// Mailbox index (repeatable)
    #[arg(long = "index")]
    indexes: Vec<usize>,
    #[arg(long)]
    all: bool,
}

pub fn execute_mark_read(args: MailboxMarkReadArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let changed = mailbox::mark_read(&paths, &args.agent, &args.indexes, args.all)?;
    println!("marked={changed}");
    Ok(())
}

#[derive(Args, Debug)]
pub struct MailboxFormatArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    unread: bool,
    #[arg(long, default_value_t = 100)]
    limit: usize,
}

pub fn execute_format(args: MailboxFormatArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let mut values = mailbox::read_indexed(&paths, &args.agent, args.unread, 0, usize::MAX)?;
    if args.limit > 0 && values.len() > args.limit {
        values.drain(..values.len() - args.limit);
    }
    let lines: Vec<String> = values
        .iter()
        .map(|(_, msg)| {
            format!(
                "<teammate-message teammate_id=\"{}\" color=\"{}\" summary=\"{}\">{}</teammate-message>",
                msg.from, msg.color, msg.summary, msg.text
            )
        })
        .collect();
    println!("{}", lines.join("\n"));
    Ok(())
}

#[derive(Args, Debug)]
pub struct DispatchArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long = "type")]
    msg_type: String,
    #[arg(long = "from")]
    sender: String,
    #[arg(long, default_value = "")]
    recipient: String,
    #[arg(long)]
    content: String,
    #[arg(long, default_value = "")]
    summary: String,
    #[arg(long, default_value = "")]
    request_id: String,
    /// true/false
    #[arg(long)]
    approve: Option<String>,
    #[arg(long, default_value = "{}")]
    meta: String,
}

pub fn execute_dispatch(args: DispatchArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let cfg = team::read_config(&paths)?;
    let delivered = deliver_message(
        &paths,
        &cfg,
        &Outgoing {
            msg_type: args.msg_type,
            sender: args.sender,
            recipient: args.recipient,
            text: args.content,
            summary: args.summary,
            request_id: args.request_id,
            approve: args.approve.as_deref().and_then(parse_approve),
            meta: parse_meta_object(&args.meta)?,
        },
    )?;
    println!("{}", json!({"delivered": delivered}));
    Ok(())
}

#[derive(Args, Debug)]
pub struct SendToLeadArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long = "from")]
    sender: String,
    #[arg(long)]
    text: String,
    #[arg(long, default_value = "")]
    summary: String,
    #[arg(long, default_value = "blue")]
    color: String,
}

pub fn execute_send_to_lead(args: SendToLeadArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let cfg = team::read_config(&paths)?;
    let target = cfg.lead_name();
    let message = MailboxMessage {
        msg_type: "message".to_string(),
        from: args.sender,
        recipient: Some(target.clone()),
        text: args.text,
        summary: args.summary,
        timestamp: String::new(),
        color: args.color,
        read: false,
        request_id: None,
        approve: None,
        meta: None,
        unknown_fields: HashMap::new(),
    };
    mailbox::write_mailbox(&paths, &target, message)?;
    println!("{}", json!({"delivered": [target]}));
    Ok(())
}

#[derive(Args, Debug)]
pub struct SendIdleArgs {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    session: String,
    #[arg(long)]
    agent: String,
}

pub fn execute_send_idle(args: SendIdleArgs) -> Result<()> {
    let paths = SessionPaths::resolve(&args.repo, &args.session);
    let cfg = team::read_config(&paths)?;
    let target = cfg.lead_name();
    let message = MailboxMessage {
        msg_type: "idle_notification".to_string(),
        from: args.agent.clone(),
        recipient: Some(target.clone()),
        text: format!("idle notification from {}", args.agent),
        summary: "idle".to_string(),
        timestamp: String::new(),
        color: cfg.member_color(&args.agent),
        read: false,
        request_id: None,
        approve: None,
        meta: None,
        unknown_fields: HashMap::new(),
    };
    mailbox::write_mailbox(&paths, &target, message)?;
    println!("{}", json!({"delivered": [target]}));
    Ok(())
}
