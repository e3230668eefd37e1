//! Collaboration fan-out
//!
//! While a prompt is queued or executing, the worker remembers which peers
//! contributed messages (and of what kinds). When the run completes, each
//! peer gets a paired room-log entry and mailbox message describing the
//! outcome.

use crate::fabric::Fabric;
use anyhow::Result;
use codex_teams_core::dispatch::Outgoing;
use codex_teams_core::schema::MailboxMessage;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

/// Senders that never receive collaboration updates.
pub const SYSTEM_SENDERS: [&str; 3] = ["system", "monitor", "orchestrator"];

/// Per-peer set of message kinds that fed the current run.
pub type CollabTargets = BTreeMap<String, BTreeSet<String>>;

/// Collect collaboration targets from a batch of inbound messages.
pub fn collect_targets(messages: &[(usize, MailboxMessage)], self_agent: &str) -> CollabTargets {
    let mut targets = CollabTargets::new();
    for (_, msg) in messages {
        let sender = msg.from.trim();
        if sender.is_empty() || sender == self_agent || SYSTEM_SENDERS.contains(&sender) {
            continue;
        }
        let msg_type = if msg.msg_type.trim().is_empty() {
            "message"
        } else {
            msg.msg_type.trim()
        };
        targets
            .entry(sender.to_string())
            .or_default()
            .insert(msg_type.to_string());
    }
    targets
}

/// Merge freshly collected targets into the worker's accumulated set.
pub fn merge_targets(into: &mut CollabTargets, updates: CollabTargets) {
    for (sender, kinds) in updates {
        into.entry(sender).or_default().extend(kinds);
    }
}

/// Kinds and summary for one peer update.
fn update_shape(source_types: &BTreeSet<String>, exit_code: i32) -> (&'static str, &'static str, &'static str) {
    if exit_code != 0 {
        ("blocker", "blocker", "peer-blocker")
    } else if source_types.contains("question") {
        ("answer", "answer", "peer-answer")
    } else {
        // Room log has no `message` kind; plain updates land as notes.
        ("note", "message", "peer-update")
    }
}

/// Emit one paired (room-log, mailbox) update per collaboration peer.
///
/// Skips self, and skips the lead for non-lead senders (they already
/// report to the lead through the worker-result channel).
pub fn emit_updates<F: Fabric>(
    fabric: &mut F,
    sender: &str,
    lead: &str,
    targets: &CollabTargets,
    result_body: &str,
    exit_code: i32,
) -> Result<()> {
    for (peer, source_types) in targets {
        if peer.is_empty() || peer == sender {
            continue;
        }
        if sender != lead && peer == lead {
            continue;
        }

        let sorted: Vec<String> = source_types.iter().cloned().collect();
        let source_types_text = if sorted.is_empty() {
            "message".to_string()
        } else {
            sorted.join(",")
        };
        let (log_kind, mail_kind, summary) = update_shape(source_types, exit_code);
        let body =
            format!("collab_update from={sender} source_types={source_types_text} result={result_body}");

        fabric.log_send(sender, peer, log_kind, &body)?;
        fabric.dispatch(&Outgoing {
            msg_type: mail_kind.to_string(),
            sender: sender.to_string(),
            recipient: peer.clone(),
            text: body,
            summary: summary.to_string(),
            request_id: String::new(),
            approve: None,
            meta: Some(json!({
                "source": "collab-update",
                "source_types": sorted,
            })),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn msg(from: &str, msg_type: &str) -> (usize, MailboxMessage) {
        (
            0,
            MailboxMessage {
                msg_type: msg_type.to_string(),
                from: from.to_string(),
                recipient: None,
                text: "x".to_string(),
                summary: String::new(),
                timestamp: String::new(),
                color: String::new(),
                read: false,
                request_id: None,
                approve: None,
                meta: None,
                unknown_fields: HashMap::new(),
            },
        )
    }

    #[test]
    fn test_collect_skips_self_and_system() {
        let messages = vec![
            msg("worker-2", "question"),
            msg("worker-1", "task"),
            msg("system", "task"),
            msg("monitor", "status"),
            msg("worker-2", "task"),
        ];
        let targets = collect_targets(&messages, "worker-1");
        assert_eq!(targets.len(), 1);
        let kinds: Vec<&str> = targets["worker-2"].iter().map(String::as_str).collect();
        assert_eq!(kinds, vec!["question", "task"]);
    }

    #[test]
    fn test_merge_unions_kinds() {
        let mut into = CollabTargets::new();
        into.entry("peer".to_string())
            .or_default()
            .insert("task".to_string());
        let mut updates = CollabTargets::new();
        updates
            .entry("peer".to_string())
            .or_default()
            .insert("question".to_string());
        merge_targets(&mut into, updates);
        assert_eq!(into["peer"].len(), 2);
    }

    #[test]
    fn test_update_shape_selection() {
        let mut kinds = BTreeSet::new();
        kinds.insert("task".to_string());
        assert_eq!(update_shape(&kinds, 1), ("blocker", "blocker", "peer-blocker"));
        assert_eq!(update_shape(&kinds, 0), ("note", "message", "peer-update"));

        kinds.insert("question".to_string());
        assert_eq!(update_shape(&kinds, 0), ("answer", "answer", "peer-answer"));
    }
}
