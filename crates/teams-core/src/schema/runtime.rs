//! Runtime table schema: one record per spawned teammate process

use crate::process::pid_alive;
use crate::time::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Per-agent runtime record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRecord {
    pub agent: String,

    /// Backend that owns the process: `tmux`, `in-process`,
    /// `in-process-shared`
    #[serde(default)]
    pub backend: String,

    /// `running`, `terminated`, ...
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub pid: u32,

    #[serde(default)]
    pub pane_id: String,

    #[serde(default)]
    pub window: String,

    pub started_at: u64,
    pub updated_at: u64,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

/// On-disk runtime table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeTable {
    #[serde(default)]
    pub agents: BTreeMap<String, RuntimeRecord>,

    #[serde(default)]
    pub updated_at: u64,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl RuntimeTable {
    /// Flip `running` records whose pid is gone to `terminated`.
    /// Returns the number of records changed.
    pub fn prune(&mut self) -> usize {
        let mut changed = 0;
        for rec in self.agents.values_mut() {
            if rec.status == "running" && rec.pid > 0 && !pid_alive(rec.pid) {
                rec.status = "terminated".to_string();
                rec.updated_at = now_ms();
                changed += 1;
            }
        }
        changed
    }

    /// Names of agents with a live `running` record.
    pub fn active_agents(&self) -> Vec<String> {
        self.agents
            .values()
            .filter(|rec| rec.status == "running" && rec.pid > 0 && pid_alive(rec.pid))
            .map(|rec| rec.agent.clone())
            .collect()
    }

    /// `(agent, pane_id)` pairs for running tmux-backed agents.
    pub fn running_tmux_agents(&self) -> Vec<(String, String)> {
        self.agents
            .values()
            .filter(|rec| rec.backend == "tmux" && rec.status == "running" && !rec.pane_id.is_empty())
            .map(|rec| (rec.agent.clone(), rec.pane_id.clone()))
            .collect()
    }
}
