//! Team configuration schema
//!
//! Stored at `<session>/config.json`, mirrored to `team.json` on every
//! write for consumers of the legacy name.

use crate::color::Color;
use crate::time::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One team member record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    /// Stable id, `name@team`
    pub agent_id: String,

    pub name: String,

    #[serde(default)]
    pub agent_type: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub prompt: String,

    #[serde(default)]
    pub color: String,

    #[serde(default)]
    pub plan_mode_required: bool,

    /// ms-epoch join timestamp
    pub joined_at: u64,

    #[serde(default)]
    pub tmux_pane_id: String,

    #[serde(default)]
    pub cwd: String,

    #[serde(default)]
    pub subscriptions: Vec<String>,

    #[serde(default)]
    pub backend_type: String,

    #[serde(default)]
    pub mode: String,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

/// Team configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// ms-epoch timestamps
    pub created_at: u64,
    pub updated_at: u64,

    pub lead_agent_id: String,

    #[serde(default)]
    pub lead_session_id: String,

    #[serde(default)]
    pub parent_session_id: String,

    pub members: Vec<TeamMember>,

    #[serde(default)]
    pub hidden_pane_ids: Vec<String>,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

/// `name@team` agent id.
pub fn make_agent_id(agent_name: &str, team_name: &str) -> String {
    format!("{agent_name}@{team_name}")
}

/// Sanitize a team name into a filesystem-safe slug.
pub fn sanitize_team_name(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    let out = out.trim_matches(|c| matches!(c, '-' | '_')).to_string();
    if out.is_empty() { "team".to_string() } else { out }
}

impl TeamConfig {
    /// Create a fresh config with the lead as the only member.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        team_name: &str,
        description: &str,
        lead_name: &str,
        lead_agent_type: &str,
        lead_model: &str,
        lead_cwd: &str,
        lead_session_id: &str,
        parent_session_id: &str,
        lead_backend_type: &str,
        lead_mode: &str,
    ) -> Self {
        let ts = now_ms();
        let safe_team = sanitize_team_name(team_name);
        let lead_id = make_agent_id(lead_name, &safe_team);
        Self {
            name: safe_team,
            description: description.to_string(),
            created_at: ts,
            updated_at: ts,
            lead_agent_id: lead_id.clone(),
            lead_session_id: lead_session_id.to_string(),
            parent_session_id: parent_session_id.to_string(),
            members: vec![TeamMember {
                agent_id: lead_id,
                name: lead_name.to_string(),
                agent_type: lead_agent_type.to_string(),
                model: lead_model.to_string(),
                prompt: String::new(),
                color: Color::assign(0).to_string(),
                plan_mode_required: false,
                joined_at: ts,
                tmux_pane_id: String::new(),
                cwd: lead_cwd.to_string(),
                subscriptions: Vec::new(),
                backend_type: lead_backend_type.to_string(),
                mode: lead_mode.to_string(),
                unknown_fields: HashMap::new(),
            }],
            hidden_pane_ids: Vec::new(),
            unknown_fields: HashMap::new(),
        }
    }

    /// Name of the team lead: the member matching `leadAgentId`, else the
    /// first member, else `team-lead`.
    pub fn lead_name(&self) -> String {
        if let Some(m) = self
            .members
            .iter()
            .find(|m| m.agent_id == self.lead_agent_id && !m.name.is_empty())
        {
            return m.name.clone();
        }
        self.members
            .first()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "team-lead".to_string())
    }

    /// Index of the member with this name or agent id.
    pub fn member_index(&self, ident: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.name == ident || m.agent_id == ident)
    }

    /// Palette color of a member, defaulting to blue.
    pub fn member_color(&self, name: &str) -> String {
        self.member_index(name)
            .map(|idx| self.members[idx].color.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "blue".to_string())
    }

    /// Member names in config order.
    pub fn member_names(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| !m.name.is_empty())
            .map(|m| m.name.clone())
            .collect()
    }
}
