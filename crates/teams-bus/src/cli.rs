//! team-bus CLI command dispatch

use codex_teams_bus::store::{BusStore, DEFAULT_ROOM, MarkReadSelector, parse_meta};
use codex_teams_bus::types::Message;
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// team-bus - local real-time message bus for codex-teams sessions
#[derive(Parser, Debug)]
#[command(
    name = "team-bus",
    version,
    about = "Local message bus for codex-teams sessions",
    long_about = "Room log, per-recipient mailboxes and control requests over one SQLite file"
)]
pub struct Cli {
    /// SQLite file path
    #[arg(long, global = true, default_value = ".codex-teams/bus.sqlite")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the database
    Init,

    /// Register or refresh a team member
    Register(RegisterArgs),

    /// List room members
    Members(MembersArgs),

    /// Send a message
    Send(SendArgs),

    /// Read recent messages
    Tail(TailArgs),

    /// Print bus statistics
    Status(StatusArgs),

    /// Read mailbox items
    Inbox(InboxArgs),

    /// Mark mailbox items as read
    MarkRead(MarkReadArgs),

    /// Create a control request
    ControlRequest(ControlRequestArgs),

    /// Respond to a control request
    ControlRespond(ControlRespondArgs),

    /// List control requests for an agent
    ControlPending(ControlPendingArgs),
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    #[arg(long)]
    agent: String,
    #[arg(long, default_value = "member")]
    role: String,
    #[arg(long, default_value = "active")]
    status: String,
}

#[derive(Args, Debug)]
struct MembersArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    #[arg(long = "from")]
    sender: String,
    #[arg(long = "to", default_value = "all")]
    recipient: String,
    /// note|task|question|answer|status|blocker|system|*_request|*_response
    #[arg(long, default_value = "note")]
    kind: String,
    #[arg(long)]
    body: String,
    /// JSON object
    #[arg(long, default_value = "{}")]
    meta: String,
    #[arg(long)]
    print_id: bool,
}

#[derive(Args, Debug)]
struct TailArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    /// Viewer identity for visibility filtering
    #[arg(long, default_value = "monitor")]
    agent: String,
    #[arg(long, default_value_t = 0)]
    since_id: i64,
    #[arg(long)]
    follow: bool,
    #[arg(long, default_value_t = 800)]
    poll_ms: u64,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    /// Ignore recipient filters
    #[arg(long)]
    all: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
}

#[derive(Args, Debug)]
struct InboxArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    unread: bool,
    #[arg(long, default_value_t = 0)]
    since_mailbox_id: i64,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    #[arg(long)]
    mark_read: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct MarkReadArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    #[arg(long)]
    agent: String,
    /// Mailbox id (repeatable)
    #[arg(long = "id")]
    ids: Vec<i64>,
    #[arg(long)]
    up_to: Option<i64>,
    #[arg(long)]
    all: bool,
}

#[derive(Args, Debug)]
struct ControlRequestArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
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

#[derive(Args, Debug)]
struct ControlRespondArgs {
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
}

#[derive(Args, Debug)]
struct ControlPendingArgs {
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    all_status: bool,
    #[arg(long, default_value_t = 100)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

fn emit_messages(messages: &[Message], as_json: bool) {
    for msg in messages {
        if as_json {
            println!("{}", msg.to_json());
        } else {
            println!("{}", msg.render_text());
        }
    }
}

impl Cli {
    /// Execute the CLI command.
    pub fn execute(self) -> Result<()> {
        let mut store = BusStore::open(&self.db)?;
        match self.command {
            Commands::Init => {
                println!("initialized bus: {}", self.db.display());
                Ok(())
            }
            Commands::Register(args) => {
                store.register(&args.room, &args.agent, &args.role, &args.status)?;
                println!(
                    "registered agent={} room={} role={} status={}",
                    args.agent, args.room, args.role, args.status
                );
                Ok(())
            }
            Commands::Members(args) => {
                let members = store.members(&args.room)?;
                if args.json {
                    println!("{}", serde_json::to_string(&members)?);
                    return Ok(());
                }
                println!("room={}", args.room);
                println!("members={}", members.len());
                for m in members {
                    println!(
                        "agent={} role={} status={} unread={} last_seen={}",
                        m.agent, m.role, m.status, m.unread, m.last_seen_ts
                    );
                }
                Ok(())
            }
            Commands::Send(args) => {
                let meta = parse_meta(&args.meta)?;
                let (message_id, fanout) = store.send(
                    &args.room,
                    &args.sender,
                    &args.recipient,
                    &args.kind,
                    &args.body,
                    &meta,
                )?;
                if args.print_id {
                    println!("{message_id}");
                } else {
                    println!("sent message #{message_id} fanout={fanout}");
                }
                Ok(())
            }
            Commands::Tail(args) => {
                let mut last_seen = args.since_id;
                loop {
                    let batch = store.fetch_messages(
                        &args.room,
                        last_seen,
                        &args.agent,
                        args.all,
                        args.limit,
                    )?;
                    if let Some(last) = batch.last() {
                        last_seen = last.id;
                    }
                    emit_messages(&batch, args.json);
                    if !args.follow {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(args.poll_ms));
                }
                Ok(())
            }
            Commands::Status(args) => {
                let status = store.status_summary(&args.room)?;
                println!("db={}", self.db.display());
                println!("room={}", status.room);
                println!("total_messages={}", status.total_messages);
                println!("last_id={}", status.last_id);
                for (recipient, n) in &status.per_recipient {
                    println!("recipient[{recipient}]={n}");
                }
                for (recipient, n) in &status.unread {
                    println!("unread[{recipient}]={n}");
                }
                println!("members={}", status.members.len());
                for m in &status.members {
                    println!(
                        "member[{}]={},{},{}",
                        m.agent, m.role, m.status, m.last_seen_ts
                    );
                }
                for (recipient, n) in &status.pending_requests {
                    println!("pending_request[{recipient}]={n}");
                }
                Ok(())
            }
            Commands::Inbox(args) => {
                let items = store.fetch_inbox(
                    &args.room,
                    &args.agent,
                    args.unread,
                    args.since_mailbox_id,
                    args.limit,
                )?;
                if args.mark_read && !items.is_empty() {
                    let ids: Vec<i64> = items.iter().map(|i| i.mailbox_id).collect();
                    store.mark_read(&args.room, &args.agent, &MarkReadSelector::Ids(ids))?;
                }
                if args.json {
                    for item in &items {
                        println!("{}", item.to_json());
                    }
                    return Ok(());
                }
                for item in &items {
                    println!("{}", item.render_text());
                }
                if args.mark_read {
                    println!("marked_read={}", items.len());
                }
                Ok(())
            }
            Commands::MarkRead(args) => {
                let selector = if !args.ids.is_empty() {
                    MarkReadSelector::Ids(args.ids)
                } else if let Some(up_to) = args.up_to {
                    MarkReadSelector::UpTo(up_to)
                } else if args.all {
                    MarkReadSelector::All
                } else {
                    println!("marked_read=0");
                    return Ok(());
                };
                let updated = store.mark_read(&args.room, &args.agent, &selector)?;
                println!("marked_read={updated}");
                Ok(())
            }
            Commands::ControlRequest(args) => {
                let rid = store.create_control_request(
                    &args.room,
                    &args.req_type,
                    &args.sender,
                    &args.recipient,
                    &args.body,
                    &args.summary,
                    &args.request_id,
                )?;
                println!("request_id={rid}");
                Ok(())
            }
            Commands::ControlRespond(args) => {
                if !args.approve && !args.reject {
                    bail!("one of --approve or --reject is required");
                }
                let body = if args.body.is_empty() {
                    if args.approve { "approved" } else { "rejected" }.to_string()
                } else {
                    args.body
                };
                let resolved = store.respond_control_request(
                    &args.request_id,
                    &args.sender,
                    args.approve,
                    &body,
                )?;
                println!("request_id={}", resolved.request_id);
                println!("status={}", resolved.status);
                Ok(())
            }
            Commands::ControlPending(args) => {
                let rows = store.list_control_requests(
                    &args.room,
                    &args.agent,
                    args.all_status,
                    args.limit,
                )?;
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
        }
    }
}
