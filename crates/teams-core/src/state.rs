//! Session state blob operations

use crate::io::{StoreError, read_json, write_json};
use crate::mailbox::{mark_read, unread_indexed};
use crate::paths::SessionPaths;
use crate::schema::state::{QueuedInboxItem, QueuedPermissionRequest, TeammateSnapshot};
use crate::schema::{StateBlob, TeamConfig, TeamContext, make_agent_id};
use std::collections::BTreeMap;

/// Read the state blob (defaults when absent).
pub fn read_state(paths: &SessionPaths) -> Result<StateBlob, StoreError> {
    read_json(&paths.state, StateBlob::default)
}

/// Write the state blob atomically.
pub fn write_state(paths: &SessionPaths, state: &StateBlob) -> Result<(), StoreError> {
    write_json(&paths.state, state)
}

/// Populate the team context for `self_name` from the config.
pub fn set_team_context(
    paths: &SessionPaths,
    cfg: &TeamConfig,
    self_name: &str,
) -> Result<(), StoreError> {
    let mut state = read_state(paths)?;

    let mut teammates = BTreeMap::new();
    for m in &cfg.members {
        if m.agent_id.is_empty() {
            continue;
        }
        teammates.insert(
            m.agent_id.clone(),
            TeammateSnapshot {
                name: m.name.clone(),
                agent_type: m.agent_type.clone(),
                color: m.color.clone(),
                backend_type: m.backend_type.clone(),
                mode: m.mode.clone(),
                plan_mode_required: m.plan_mode_required,
            },
        );
    }

    state.team_context = Some(TeamContext {
        team_name: cfg.name.clone(),
        team_config_path: paths.config.display().to_string(),
        task_list_path: paths.tasks.display().to_string(),
        lead_agent_id: cfg.lead_agent_id.clone(),
        lead_agent_name: cfg.lead_name(),
        self_agent_id: make_agent_id(self_name, &cfg.name),
        self_agent_name: self_name.to_string(),
        self_agent_color: cfg.member_color(self_name),
        teammates,
    });
    write_state(paths, &state)
}

/// Drop the team context.
pub fn clear_team_context(paths: &SessionPaths) -> Result<(), StoreError> {
    let mut state = read_state(paths)?;
    state.team_context = None;
    write_state(paths, &state)
}

/// Drain unread inbox rows for `agent` into the state replay queue.
///
/// `permission_request` rows are additionally mirrored into the
/// permission queue. Returns the queued items.
pub fn inbox_poll(
    paths: &SessionPaths,
    agent: &str,
    limit: usize,
    mark_as_read: bool,
) -> Result<Vec<QueuedInboxItem>, StoreError> {
    let mut indexed = unread_indexed(paths, agent)?;
    if limit > 0 && indexed.len() > limit {
        indexed.truncate(limit);
    }

    let mut state = read_state(paths)?;
    let mut queued = Vec::with_capacity(indexed.len());
    for (idx, msg) in &indexed {
        let item = QueuedInboxItem {
            mailbox_index: *idx,
            agent: agent.to_string(),
            message: serde_json::to_value(msg).map_err(|e| StoreError::Json {
                path: paths.state.clone(),
                source: e,
            })?,
        };
        state.inbox.messages.push(item.clone());
        queued.push(item);

        if msg.msg_type == "permission_request" {
            state
                .worker_sandbox_permissions
                .queue
                .push(QueuedPermissionRequest {
                    mailbox_index: *idx,
                    request_id: msg.request_id.clone().unwrap_or_default(),
                    from: msg.from.clone(),
                    summary: msg.summary.clone(),
                    text: msg.text.clone(),
                    timestamp: msg.timestamp.clone(),
                    color: if msg.color.is_empty() {
                        "blue".to_string()
                    } else {
                        msg.color.clone()
                    },
                    recipient: msg.recipient.clone().unwrap_or_default(),
                });
        }
    }

    if mark_as_read && !indexed.is_empty() {
        let indexes: Vec<usize> = indexed.iter().map(|(idx, _)| *idx).collect();
        mark_read(paths, agent, &indexes, false)?;
    }
    write_state(paths, &state)?;
    Ok(queued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::write_mailbox;
    use crate::schema::MailboxMessage;
    use crate::team::tests::fixture_config;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn message(msg_type: &str, request_id: Option<&str>) -> MailboxMessage {
        MailboxMessage {
            msg_type: msg_type.to_string(),
            from: "worker-1".to_string(),
            recipient: Some("lead".to_string()),
            text: "body".to_string(),
            summary: "sum".to_string(),
            timestamp: String::new(),
            color: "green".to_string(),
            read: false,
            request_id: request_id.map(str::to_string),
            approve: None,
            meta: None,
            unknown_fields: HashMap::new(),
        }
    }

    #[test]
    fn test_set_and_clear_team_context() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        paths.ensure_dirs().unwrap();
        let cfg = fixture_config(&["lead", "worker-1"]);

        set_team_context(&paths, &cfg, "worker-1").unwrap();
        let state = read_state(&paths).unwrap();
        let ctx = state.team_context.unwrap();
        assert_eq!(ctx.self_agent_name, "worker-1");
        assert_eq!(ctx.lead_agent_name, "lead");
        assert_eq!(ctx.teammates.len(), 2);

        clear_team_context(&paths).unwrap();
        assert!(read_state(&paths).unwrap().team_context.is_none());
    }

    #[test]
    fn test_inbox_poll_queues_and_marks() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        paths.ensure_dirs().unwrap();

        write_mailbox(&paths, "lead", message("message", None)).unwrap();
        write_mailbox(&paths, "lead", message("permission_request", Some("req-9"))).unwrap();

        let queued = inbox_poll(&paths, "lead", 0, true).unwrap();
        assert_eq!(queued.len(), 2);

        let state = read_state(&paths).unwrap();
        assert_eq!(state.inbox.messages.len(), 2);
        assert_eq!(state.worker_sandbox_permissions.queue.len(), 1);
        assert_eq!(state.worker_sandbox_permissions.queue[0].request_id, "req-9");

        // Second poll finds nothing unread.
        assert!(inbox_poll(&paths, "lead", 0, true).unwrap().is_empty());
    }
}
