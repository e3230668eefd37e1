//! Filesystem control-request lifecycle
//!
//! A control request is a bundle: one record in `control.json` plus one
//! `<type>_request` mailbox message. The record is written first; if the
//! mailbox delivery fails, the record is rolled back so observers never
//! see half a bundle. Responses mirror the same pairing.

use crate::dispatch::{Outgoing, deliver_message};
use crate::io::{StoreError, read_json, write_json};
use crate::paths::SessionPaths;
use crate::schema::{ControlRecord, ControlStatus, ControlTable, ControlType, TeamConfig};
use crate::time::{now_ms, utc_now_iso_ms};
use serde_json::json;
use uuid::Uuid;

/// 12-hex control request id.
pub fn make_request_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn read_table(paths: &SessionPaths) -> Result<ControlTable, StoreError> {
    read_json(&paths.control, ControlTable::default)
}

fn write_table(paths: &SessionPaths, table: &mut ControlTable) -> Result<(), StoreError> {
    table.updated_at = now_ms();
    write_json(&paths.control, table)
}

/// Parameters for creating a control request.
#[derive(Debug, Clone)]
pub struct ControlRequestInput {
    pub req_type: ControlType,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub summary: String,
    /// Empty = generate a 12-hex id.
    pub request_id: String,
}

/// Create a pending request and deliver its `<type>_request` message.
///
/// Returns the request id. Duplicate ids are a conflict and leave the
/// table untouched.
pub fn create_control_request(
    paths: &SessionPaths,
    cfg: &TeamConfig,
    input: ControlRequestInput,
) -> Result<String, StoreError> {
    let rid = if input.request_id.trim().is_empty() {
        make_request_id()
    } else {
        input.request_id.trim().to_string()
    };

    let mut table = read_table(paths)?;
    if table.requests.contains_key(&rid) {
        return Err(StoreError::conflict(format!("request already exists: {rid}")));
    }

    let now = utc_now_iso_ms();
    let record = ControlRecord {
        request_id: rid.clone(),
        req_type: input.req_type,
        sender: input.sender.clone(),
        recipient: input.recipient.clone(),
        body: input.body.clone(),
        summary: input.summary.clone(),
        status: ControlStatus::Pending,
        created_ts: now.clone(),
        updated_ts: now,
        response_body: String::new(),
        responder: String::new(),
    };
    table.requests.insert(rid.clone(), record);
    write_table(paths, &mut table)?;

    let delivery = deliver_message(
        paths,
        cfg,
        &Outgoing {
            msg_type: input.req_type.request_kind(),
            sender: input.sender,
            recipient: input.recipient,
            text: input.body,
            summary: input.summary.clone(),
            request_id: rid.clone(),
            approve: None,
            meta: Some(json!({
                "request_id": rid,
                "req_type": input.req_type.as_str(),
                "summary": input.summary,
                "state": "pending",
            })),
        },
    );

    if let Err(e) = delivery {
        // Roll the record back so the bundle stays all-or-nothing.
        let mut table = read_table(paths)?;
        table.requests.remove(&rid);
        write_table(paths, &mut table)?;
        return Err(e);
    }

    Ok(rid)
}

/// Look up a request record.
pub fn get_control_request(
    paths: &SessionPaths,
    request_id: &str,
) -> Result<Option<ControlRecord>, StoreError> {
    Ok(read_table(paths)?.requests.get(request_id).cloned())
}

/// Parameters for responding to a control request.
#[derive(Debug, Clone)]
pub struct ControlResponseInput {
    pub request_id: String,
    pub responder: String,
    pub approve: bool,
    pub body: String,
    /// Overrides the response recipient; empty = the original sender.
    pub recipient_override: String,
    /// Lets a responder resolve a legacy message-only request that has no
    /// record yet; empty = the record must exist.
    pub req_type_override: Option<ControlType>,
}

/// Resolve a pending request and deliver its `<type>_response` message.
pub fn respond_control_request(
    paths: &SessionPaths,
    cfg: &TeamConfig,
    input: ControlResponseInput,
) -> Result<ControlRecord, StoreError> {
    let mut table = read_table(paths)?;

    if !table.requests.contains_key(&input.request_id) {
        let Some(req_type) = input.req_type_override else {
            return Err(StoreError::NotFound {
                what: "control request",
                ident: input.request_id.clone(),
            });
        };
        // Synthesize a record for direct mailbox requests that never had
        // a table row.
        let now = utc_now_iso_ms();
        table.requests.insert(
            input.request_id.clone(),
            ControlRecord {
                request_id: input.request_id.clone(),
                req_type,
                sender: if input.recipient_override.is_empty() {
                    cfg.lead_name()
                } else {
                    input.recipient_override.clone()
                },
                recipient: input.responder.clone(),
                body: String::new(),
                summary: String::new(),
                status: ControlStatus::Pending,
                created_ts: now.clone(),
                updated_ts: now,
                response_body: String::new(),
                responder: String::new(),
            },
        );
    }
    let record = table
        .requests
        .get_mut(&input.request_id)
        .ok_or_else(|| StoreError::NotFound {
            what: "control request",
            ident: input.request_id.clone(),
        })?;

    if record.status != ControlStatus::Pending {
        return Err(StoreError::conflict(format!(
            "request already resolved: {} status={}",
            input.request_id, record.status
        )));
    }

    let status = if input.approve {
        ControlStatus::Approved
    } else {
        ControlStatus::Rejected
    };
    record.status = status;
    record.updated_ts = utc_now_iso_ms();
    record.response_body = input.body.clone();
    record.responder = input.responder.clone();
    let resolved = record.clone();
    write_table(paths, &mut table)?;

    let recipient = if input.recipient_override.trim().is_empty() {
        if resolved.sender.is_empty() {
            cfg.lead_name()
        } else {
            resolved.sender.clone()
        }
    } else {
        input.recipient_override.trim().to_string()
    };

    let body = if input.body.is_empty() {
        status.to_string()
    } else {
        input.body
    };
    deliver_message(
        paths,
        cfg,
        &Outgoing {
            msg_type: resolved.req_type.response_kind(),
            sender: input.responder,
            recipient,
            text: body,
            summary: resolved.summary.clone(),
            request_id: resolved.request_id.clone(),
            approve: Some(input.approve),
            meta: Some(json!({
                "request_id": resolved.request_id,
                "req_type": resolved.req_type.as_str(),
                "approve": input.approve,
                "state": status.as_str(),
            })),
        },
    )?;

    Ok(resolved)
}

/// Requests addressed to `recipient`, ordered by creation time ascending.
pub fn list_control_requests(
    paths: &SessionPaths,
    recipient: &str,
    include_resolved: bool,
    limit: usize,
) -> Result<Vec<ControlRecord>, StoreError> {
    let table = read_table(paths)?;
    let mut rows: Vec<ControlRecord> = table
        .requests
        .values()
        .filter(|r| recipient.is_empty() || r.recipient == recipient)
        .filter(|r| include_resolved || r.status == ControlStatus::Pending)
        .cloned()
        .collect();
    rows.sort_by(|a, b| a.created_ts.cmp(&b.created_ts));
    if limit > 0 {
        rows.truncate(limit);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::read_mailbox;
    use crate::team::tests::fixture_config;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SessionPaths, TeamConfig) {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        paths.ensure_dirs().unwrap();
        let cfg = fixture_config(&["lead", "worker-1", "worker-2"]);
        (temp_dir, paths, cfg)
    }

    fn shutdown_request(rid: &str) -> ControlRequestInput {
        ControlRequestInput {
            req_type: ControlType::Shutdown,
            sender: "lead".to_string(),
            recipient: "worker-1".to_string(),
            body: "stop".to_string(),
            summary: String::new(),
            request_id: rid.to_string(),
        }
    }

    #[test]
    fn test_create_writes_record_and_request_message() {
        let (_tmp, paths, cfg) = setup();
        let rid = create_control_request(&paths, &cfg, shutdown_request("req-a1b2")).unwrap();
        assert_eq!(rid, "req-a1b2");

        let record = get_control_request(&paths, "req-a1b2").unwrap().unwrap();
        assert_eq!(record.status, ControlStatus::Pending);
        assert_eq!(record.recipient, "worker-1");

        let inbox = read_mailbox(&paths, "worker-1").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].msg_type, "shutdown_request");
        assert_eq!(inbox[0].request_id.as_deref(), Some("req-a1b2"));
    }

    #[test]
    fn test_generated_id_is_12_hex() {
        let (_tmp, paths, cfg) = setup();
        let rid = create_control_request(&paths, &cfg, shutdown_request("")).unwrap();
        assert_eq!(rid.len(), 12);
        assert!(rid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_duplicate_id_conflicts() {
        let (_tmp, paths, cfg) = setup();
        create_control_request(&paths, &cfg, shutdown_request("req-a1b2")).unwrap();
        let err = create_control_request(&paths, &cfg, shutdown_request("req-a1b2")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        // Only the first delivery landed.
        assert_eq!(read_mailbox(&paths, "worker-1").unwrap().len(), 1);
    }

    #[test]
    fn test_approve_flow_end_to_end() {
        let (_tmp, paths, cfg) = setup();
        create_control_request(&paths, &cfg, shutdown_request("req-a1b2")).unwrap();

        let resolved = respond_control_request(
            &paths,
            &cfg,
            ControlResponseInput {
                request_id: "req-a1b2".to_string(),
                responder: "worker-1".to_string(),
                approve: true,
                body: "ok".to_string(),
                recipient_override: String::new(),
                req_type_override: None,
            },
        )
        .unwrap();
        assert_eq!(resolved.status, ControlStatus::Approved);
        assert_eq!(resolved.responder, "worker-1");
        assert_eq!(resolved.response_body, "ok");

        // worker-1 got exactly one shutdown_request; lead got exactly one
        // shutdown_response with the approved state in meta.
        let worker_inbox = read_mailbox(&paths, "worker-1").unwrap();
        assert_eq!(worker_inbox.len(), 1);
        assert_eq!(worker_inbox[0].msg_type, "shutdown_request");

        let lead_inbox = read_mailbox(&paths, "lead").unwrap();
        assert_eq!(lead_inbox.len(), 1);
        assert_eq!(lead_inbox[0].msg_type, "shutdown_response");
        let meta = lead_inbox[0].meta_object();
        assert_eq!(meta.get("state").and_then(|v| v.as_str()), Some("approved"));
        assert_eq!(
            meta.get("request_id").and_then(|v| v.as_str()),
            Some("req-a1b2")
        );
    }

    #[test]
    fn test_respond_leaves_pending_at_most_once() {
        let (_tmp, paths, cfg) = setup();
        create_control_request(&paths, &cfg, shutdown_request("req-a1b2")).unwrap();

        let respond = |approve: bool| {
            respond_control_request(
                &paths,
                &cfg,
                ControlResponseInput {
                    request_id: "req-a1b2".to_string(),
                    responder: "worker-1".to_string(),
                    approve,
                    body: String::new(),
                    recipient_override: String::new(),
                    req_type_override: None,
                },
            )
        };
        respond(false).unwrap();
        let err = respond(true).unwrap_err();
        assert!(err.to_string().contains("already resolved"));

        let record = get_control_request(&paths, "req-a1b2").unwrap().unwrap();
        assert_eq!(record.status, ControlStatus::Rejected);
    }

    #[test]
    fn test_respond_unknown_id_fails() {
        let (_tmp, paths, cfg) = setup();
        let err = respond_control_request(
            &paths,
            &cfg,
            ControlResponseInput {
                request_id: "ghost".to_string(),
                responder: "worker-1".to_string(),
                approve: true,
                body: String::new(),
                recipient_override: String::new(),
                req_type_override: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_respond_with_override_synthesizes_record() {
        let (_tmp, paths, cfg) = setup();
        let resolved = respond_control_request(
            &paths,
            &cfg,
            ControlResponseInput {
                request_id: "legacy-1".to_string(),
                responder: "worker-1".to_string(),
                approve: true,
                body: "shutdown approved".to_string(),
                recipient_override: "lead".to_string(),
                req_type_override: Some(ControlType::Shutdown),
            },
        )
        .unwrap();
        assert_eq!(resolved.status, ControlStatus::Approved);

        let lead_inbox = read_mailbox(&paths, "lead").unwrap();
        assert_eq!(lead_inbox.len(), 1);
        assert_eq!(lead_inbox[0].msg_type, "shutdown_response");
    }

    #[test]
    fn test_list_pending_ordering_and_filter() {
        let (_tmp, paths, cfg) = setup();
        create_control_request(&paths, &cfg, shutdown_request("req-1")).unwrap();
        let mut second = shutdown_request("req-2");
        second.req_type = ControlType::Permission;
        create_control_request(&paths, &cfg, second).unwrap();

        respond_control_request(
            &paths,
            &cfg,
            ControlResponseInput {
                request_id: "req-1".to_string(),
                responder: "worker-1".to_string(),
                approve: false,
                body: String::new(),
                recipient_override: String::new(),
                req_type_override: None,
            },
        )
        .unwrap();

        let pending = list_control_requests(&paths, "worker-1", false, 0).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_id, "req-2");

        let all = list_control_requests(&paths, "worker-1", true, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].request_id, "req-1");
    }
}
