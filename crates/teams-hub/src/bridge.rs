//! tmux mailbox bridge
//!
//! The alternate consumer: instead of spawning agent processes, it
//! renders each unread message as a scripted prompt and injects it into
//! the teammate's running tmux pane. Same mailbox contract as the worker
//! loops (actionable classification, mark-read on successful delivery),
//! different sink.

use crate::tmux;
use anyhow::Result;
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::schema::{MailboxMessage, message_type};
use codex_teams_core::text::trim_text;
use codex_teams_core::{mailbox, runtime};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bridge invocation options (parsed from the CLI).
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub repo: PathBuf,
    pub session: String,
    pub room: String,
    pub tmux_session: String,
    pub lead_name: String,
    pub poll_ms: u64,
    pub limit: usize,
    /// Kill a worker's pane when its done signal arrives at the lead.
    pub auto_kill: bool,
}

/// Suggested reply kind for an injected message.
fn reply_kind_for(msg_type: &str) -> &'static str {
    if msg_type == "question" {
        "answer"
    } else {
        "status"
    }
}

/// Tokens that mark a worker's status as a completion signal.
const DONE_TOKENS: [&str; 5] = ["done", "complete", "completed", "finish", "finished"];

/// Whether a message is a worker's done signal addressed to the lead.
///
/// Requires a `worker-*` sender, a lead (or empty) recipient, kind
/// `status`, and a summary containing a done token without the `not`
/// negator.
pub fn is_done_signal(msg: &MailboxMessage, lead: &str) -> bool {
    if !msg.from.starts_with("worker-") || msg.msg_type != "status" {
        return false;
    }
    if let Some(recipient) = msg.recipient.as_deref()
        && !recipient.is_empty()
        && recipient != lead
    {
        return false;
    }
    let summary = msg.summary.to_lowercase();
    let words: Vec<&str> = summary
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.iter().any(|w| *w == "not") {
        return false;
    }
    words
        .iter()
        .any(|w| DONE_TOKENS.iter().any(|token| w == token))
}

/// Render the injection prompt for one unread message.
pub fn build_prompt(
    agent: &str,
    lead: &str,
    room: &str,
    session: &str,
    msg: &MailboxMessage,
) -> String {
    let msg_type = if msg.msg_type.trim().is_empty() {
        "message"
    } else {
        msg.msg_type.trim()
    };
    let sender = if msg.from.trim().is_empty() {
        "unknown"
    } else {
        msg.from.trim()
    };
    let summary = trim_text(&msg.summary, 140);
    let text = trim_text(&msg.text, 1000);
    let suggested_kind = reply_kind_for(msg_type);

    let mut lines = vec![
        format!("[Mailbox] to={agent} from={sender} type={msg_type} summary={summary}"),
        text,
        String::new(),
        "Immediate action:".to_string(),
        format!(
            "1) Reply to sender with `codex-teams sendmessage --session \"{session}\" --room \"{room}\" \
             --type {suggested_kind} --from \"{agent}\" --to \"{sender}\" --summary \"<update>\" \
             --content \"<response>\"`"
        ),
    ];

    if let Some(request_id) = msg.request_id.as_deref().filter(|r| !r.is_empty()) {
        lines.push(format!(
            "2) request_id={request_id} (use matching response type if this is a control request)"
        ));
    } else {
        lines.push("2) Keep response concise and include next concrete step.".to_string());
    }

    if agent == lead && matches!(msg_type, "question" | "blocker" | "task" | "message") {
        lines.push(
            "3) If this needs unknown info, run focused research now and send refined guidance back to requester."
                .to_string(),
        );
    } else if agent != lead && matches!(msg_type, "question" | "blocker") {
        lines.push(format!(
            "3) If still unresolved after one attempt, escalate to lead with `codex-teams sendmessage \
             --session \"{session}\" --room \"{room}\" --type question --from \"{agent}\" --to \"{lead}\" \
             --summary \"research-request\" --content \"<what is missing>\"`"
        ));
    }

    lines.join("\n")
}

/// Inject one prompt into a pane: literal text, then a carriage return.
fn inject_prompt(pane_id: &str, prompt: &str) -> bool {
    tmux::send_literal(pane_id, prompt) && tmux::send_enter(pane_id)
}

/// Run the bridge until the tmux session disappears.
pub fn run(opts: &BridgeOptions) -> Result<i32> {
    let paths = SessionPaths::resolve(&opts.repo, &opts.session);
    let tmux_session = if opts.tmux_session.trim().is_empty() {
        opts.session.clone()
    } else {
        opts.tmux_session.trim().to_string()
    };
    let poll_ms = opts.poll_ms.max(100);
    let limit = opts.limit.max(1);

    info!("bridge watching tmux session {tmux_session}");
    while tmux::has_session(&tmux_session) {
        let table = match runtime::read_runtime(&paths) {
            Ok(table) => table,
            Err(e) => {
                warn!("runtime table read failed: {e}");
                std::thread::sleep(Duration::from_millis(poll_ms));
                continue;
            }
        };

        for (agent, pane_id) in table.running_tmux_agents() {
            let rows = match mailbox::read_indexed(&paths, &agent, true, 0, limit) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("mailbox read failed for {agent}: {e}");
                    continue;
                }
            };
            if rows.is_empty() {
                continue;
            }

            let mut marked: Vec<usize> = Vec::new();
            let mut pane_killed = false;
            for (index, msg) in &rows {
                if is_done_signal(msg, &opts.lead_name) {
                    marked.push(*index);
                    if opts.auto_kill && !pane_killed {
                        info!("worker {} reported done; killing pane {pane_id}", msg.from);
                        if tmux::kill_pane(&pane_id) {
                            pane_killed = true;
                        }
                        if let Err(e) = runtime::runtime_mark(&paths, &msg.from, "terminated", None) {
                            debug!("runtime mark failed for {}: {e}", msg.from);
                        }
                    }
                    continue;
                }
                if pane_killed {
                    // The sink is gone; leave the rest unread.
                    break;
                }
                if message_type::is_actionable(&msg.msg_type) {
                    let prompt =
                        build_prompt(&agent, &opts.lead_name, &opts.room, &opts.session, msg);
                    if inject_prompt(&pane_id, &prompt) {
                        marked.push(*index);
                    }
                } else {
                    // Non-actionable traffic needs no injection.
                    marked.push(*index);
                }
            }
            if !marked.is_empty()
                && let Err(e) = mailbox::mark_read(&paths, &agent, &marked, false)
            {
                warn!("mark-read failed for {agent}: {e}");
            }
        }

        std::thread::sleep(Duration::from_millis(poll_ms));
    }

    info!("tmux session {tmux_session} gone; bridge exiting");
    Ok(0)
}
