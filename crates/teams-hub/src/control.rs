//! Consumer-side control classification
//!
//! Control messages are resolved at the worker loop before anything can
//! reach the prompt queue: they are acknowledged immediately, answered
//! with a control response, and may mutate the worker (permission mode,
//! stop flag). Authorization failures fail closed: a rejected response
//! plus a status note naming the violated rule.

use crate::fabric::Fabric;
use crate::worker::WorkerState;
use anyhow::Result;
use codex_teams_core::dispatch::Outgoing;
use codex_teams_core::schema::{ControlType, MailboxMessage, PermissionMode};
use codex_teams_core::text::summarize;

/// Outcome of classifying one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Shutdown approved; the worker must stop.
    Stop,
    /// Control (or control-adjacent) traffic fully processed and acked.
    Done,
    /// Not a control message; the caller decides what to do with it.
    NotControl,
}

/// Classify and process one inbound message before it can reach the
/// prompt queue.
pub fn handle_message<F: Fabric>(
    fabric: &mut F,
    worker: &mut WorkerState,
    index: usize,
    msg: &MailboxMessage,
) -> Result<Handled> {
    match msg.msg_type.as_str() {
        "shutdown_request" => handle_shutdown(fabric, worker, index, msg),
        "mode_set_request" => handle_mode_set(fabric, worker, index, msg),
        "plan_approval_request" | "permission_request" => {
            forward_to_lead(fabric, worker, index, msg)
        }
        "plan_approval_response" | "permission_response" | "shutdown_response"
        | "shutdown_approved" | "shutdown_rejected" | "mode_set_response" => {
            note_response(fabric, worker, index, msg)
        }
        _ => Ok(Handled::NotControl),
    }
}

/// Lead-only authorization shared by shutdown and mode_set.
///
/// Checks, in order: envelope sender is the lead, envelope recipient is
/// this worker, and (when a record exists) the record's recipient/sender
/// match. Returns the violated rule on failure.
fn authorize_lead_control<F: Fabric>(
    fabric: &F,
    worker: &WorkerState,
    msg: &MailboxMessage,
    kind: &str,
) -> Result<Option<String>> {
    let lead = fabric.lead_name();
    let self_name = worker.name();
    let sender = msg.from.as_str();

    if sender != lead {
        return Ok(Some(format!(
            "{kind} allowed only from lead={lead}; got={sender}"
        )));
    }
    if let Some(recipient) = msg.recipient.as_deref()
        && !recipient.is_empty()
        && recipient != self_name
    {
        return Ok(Some(format!(
            "{kind} recipient must be self={self_name}; got={recipient}"
        )));
    }
    if let Some(request_id) = msg.request_id.as_deref()
        && let Some(record) = fabric.control_lookup(request_id)?
    {
        if record.recipient != self_name {
            return Ok(Some(format!(
                "{kind} record recipient must be self={self_name}; got={}",
                record.recipient
            )));
        }
        if record.sender != sender {
            return Ok(Some(format!(
                "{kind} record sender must match envelope sender={sender}; got={}",
                record.sender
            )));
        }
    }
    Ok(None)
}

/// Reject a control request, naming the violated rule to the sender and
/// the lead.
fn reject_with_rule<F: Fabric>(
    fabric: &mut F,
    worker: &mut WorkerState,
    index: usize,
    msg: &MailboxMessage,
    req_type: ControlType,
    rule: &str,
) -> Result<Handled> {
    let lead = fabric.lead_name();
    let reply_to = if msg.from.is_empty() { lead.clone() } else { msg.from.clone() };

    if let Some(request_id) = msg.request_id.as_deref() {
        fabric.control_respond(request_id, worker.name(), false, rule, &reply_to, req_type)?;
    } else {
        fabric.dispatch(&Outgoing {
            msg_type: req_type.response_kind(),
            sender: worker.name().to_string(),
            recipient: reply_to,
            text: rule.to_string(),
            summary: String::new(),
            request_id: String::new(),
            approve: Some(false),
            meta: None,
        })?;
    }
    fabric.log_send(
        worker.name(),
        &lead,
        "status",
        &format!("control rejected rule={rule}"),
    )?;
    ack(fabric, worker, index)?;
    Ok(Handled::Done)
}

fn handle_shutdown<F: Fabric>(
    fabric: &mut F,
    worker: &mut WorkerState,
    index: usize,
    msg: &MailboxMessage,
) -> Result<Handled> {
    if let Some(rule) = authorize_lead_control(fabric, worker, msg, "shutdown_request")? {
        return reject_with_rule(fabric, worker, index, msg, ControlType::Shutdown, &rule);
    }

    let lead = fabric.lead_name();
    let reply_to = if msg.from.is_empty() { lead.clone() } else { msg.from.clone() };
    let response_text = "shutdown approved";

    if let Some(request_id) = msg.request_id.as_deref() {
        fabric.control_respond(
            request_id,
            worker.name(),
            true,
            response_text,
            &reply_to,
            ControlType::Shutdown,
        )?;
    } else {
        // Compatibility path for direct mailbox shutdown messages without
        // request ids.
        fabric.dispatch(&Outgoing {
            msg_type: "shutdown_response".to_string(),
            sender: worker.name().to_string(),
            recipient: reply_to,
            text: response_text.to_string(),
            summary: String::new(),
            request_id: String::new(),
            approve: Some(true),
            meta: None,
        })?;
    }
    fabric.log_send(
        worker.name(),
        "all",
        "status",
        "shutdown requested; terminating agent loop",
    )?;
    ack(fabric, worker, index)?;
    Ok(Handled::Stop)
}

fn handle_mode_set<F: Fabric>(
    fabric: &mut F,
    worker: &mut WorkerState,
    index: usize,
    msg: &MailboxMessage,
) -> Result<Handled> {
    if let Some(rule) = authorize_lead_control(fabric, worker, msg, "mode_set_request")? {
        return reject_with_rule(fabric, worker, index, msg, ControlType::ModeSet, &rule);
    }

    let meta = msg.meta_object();
    let requested = meta
        .get("mode")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| msg.text.trim())
        .to_string();

    let mode = requested.parse::<PermissionMode>();
    let mut approved = mode.is_ok();
    let mut response_text = match &mode {
        Ok(_) => "mode updated".to_string(),
        Err(e) => e.clone(),
    };
    if let Ok(mode) = mode {
        worker.config.permission_mode = mode.as_str().to_string();
        match fabric.set_member_mode(worker.name(), mode.as_str()) {
            Ok(_) => {}
            Err(e) => {
                approved = false;
                response_text = format!("failed to set mode={requested}: {e}");
            }
        }
    }

    let lead = fabric.lead_name();
    let reply_to = if msg.from.is_empty() { lead.clone() } else { msg.from.clone() };
    if let Some(request_id) = msg.request_id.as_deref() {
        fabric.control_respond(
            request_id,
            worker.name(),
            approved,
            &response_text,
            &reply_to,
            ControlType::ModeSet,
        )?;
    } else {
        fabric.dispatch(&Outgoing {
            msg_type: "mode_set_response".to_string(),
            sender: worker.name().to_string(),
            recipient: reply_to,
            text: response_text.clone(),
            summary: msg.summary.clone(),
            request_id: String::new(),
            approve: Some(approved),
            meta: None,
        })?;
    }

    fabric.log_send(
        worker.name(),
        "all",
        "status",
        &format!("mode_set handled mode={requested} approved={approved}"),
    )?;
    if approved {
        fabric.log_send(
            worker.name(),
            "all",
            "status",
            &format!("teammate_mode_changed mode={requested}"),
        )?;
    }
    ack(fabric, worker, index)?;
    Ok(Handled::Done)
}

/// Plan-approval and permission requests are never auto-approved; they
/// are surfaced to the lead and left for an external responder.
fn forward_to_lead<F: Fabric>(
    fabric: &mut F,
    worker: &mut WorkerState,
    index: usize,
    msg: &MailboxMessage,
) -> Result<Handled> {
    let lead = fabric.lead_name();
    let label = {
        let s = summarize(&msg.text, 140);
        if s.is_empty() { msg.msg_type.clone() } else { s }
    };
    fabric.log_send(
        worker.name(),
        &lead,
        "status",
        &format!("received {} from={} summary={label}", msg.msg_type, msg.from),
    )?;
    ack(fabric, worker, index)?;
    Ok(Handled::Done)
}

/// Control responses carry no work; they are narrated as status traffic.
fn note_response<F: Fabric>(
    fabric: &mut F,
    worker: &mut WorkerState,
    index: usize,
    msg: &MailboxMessage,
) -> Result<Handled> {
    let summary = {
        let s = summarize(&msg.text, 140);
        if s.is_empty() { msg.msg_type.clone() } else { s }
    };
    fabric.log_send(
        worker.name(),
        "all",
        "status",
        &format!("received {} from={} summary={summary}", msg.msg_type, msg.from),
    )?;
    ack(fabric, worker, index)?;
    Ok(Handled::Done)
}

fn ack<F: Fabric>(fabric: &mut F, worker: &mut WorkerState, index: usize) -> Result<()> {
    match fabric.mark_read(worker.name(), &[index]) {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!("control ack failed for {}: {e}", worker.name());
            worker.force_scan = true;
            Ok(())
        }
    }
}
