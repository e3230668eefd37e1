//! Session state blob schema
//!
//! `state.json` carries the team context snapshot, the inbox replay queue
//! and the permission request queue consumed by pane-backed teammates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Teammate summary inside the team context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeammateSnapshot {
    pub name: String,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub backend_type: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub plan_mode_required: bool,
}

/// Team context snapshot for the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamContext {
    pub team_name: String,
    pub team_config_path: String,
    pub task_list_path: String,
    pub lead_agent_id: String,
    pub lead_agent_name: String,
    pub self_agent_id: String,
    pub self_agent_name: String,
    pub self_agent_color: String,
    pub teammates: BTreeMap<String, TeammateSnapshot>,
}

/// One queued inbox item awaiting replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedInboxItem {
    pub mailbox_index: usize,
    pub agent: String,
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxState {
    #[serde(default)]
    pub messages: Vec<QueuedInboxItem>,
}

/// One queued permission request awaiting a human verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedPermissionRequest {
    pub mailbox_index: usize,
    #[serde(default)]
    pub request_id: String,
    pub from: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionQueue {
    #[serde(default)]
    pub queue: Vec<QueuedPermissionRequest>,
    #[serde(default)]
    pub selected_index: i64,
}

impl Default for PermissionQueue {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            selected_index: 0,
        }
    }
}

/// Whole-session state blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBlob {
    #[serde(default)]
    pub team_context: Option<TeamContext>,

    #[serde(default)]
    pub inbox: InboxState,

    #[serde(default)]
    pub worker_sandbox_permissions: PermissionQueue,

    #[serde(default = "default_expanded_view")]
    pub expanded_view: String,

    #[serde(default = "default_selected_agent")]
    pub selected_ip_agent_index: i64,

    #[serde(default = "default_expanded_view")]
    pub view_selection_mode: String,

    #[serde(default)]
    pub viewing_agent_task_id: Option<String>,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

fn default_expanded_view() -> String {
    "none".to_string()
}

fn default_selected_agent() -> i64 {
    -1
}

impl Default for StateBlob {
    fn default() -> Self {
        Self {
            team_context: None,
            inbox: InboxState::default(),
            worker_sandbox_permissions: PermissionQueue::default(),
            expanded_view: default_expanded_view(),
            selected_ip_agent_index: default_selected_agent(),
            view_selection_mode: default_expanded_view(),
            viewing_agent_task_id: None,
            unknown_fields: HashMap::new(),
        }
    }
}
