//! Runtime table store operations

use crate::io::{StoreError, read_json, write_json};
use crate::paths::SessionPaths;
use crate::process::pid_alive;
use crate::schema::{RuntimeRecord, RuntimeTable};
use crate::time::now_ms;
use std::collections::HashMap;

/// Read the runtime table (empty when absent).
pub fn read_runtime(paths: &SessionPaths) -> Result<RuntimeTable, StoreError> {
    read_json(&paths.runtime, RuntimeTable::default)
}

/// Write the runtime table, bumping `updatedAt`.
pub fn write_runtime(paths: &SessionPaths, table: &mut RuntimeTable) -> Result<(), StoreError> {
    table.updated_at = now_ms();
    write_json(&paths.runtime, table)
}

/// Upsert the record for `agent`.
pub fn runtime_set(
    paths: &SessionPaths,
    agent: &str,
    backend: &str,
    status: &str,
    pid: u32,
    pane_id: &str,
    window: &str,
) -> Result<RuntimeRecord, StoreError> {
    let mut table = read_runtime(paths)?;
    let now = now_ms();
    let rec = table
        .agents
        .entry(agent.to_string())
        .or_insert_with(|| RuntimeRecord {
            agent: agent.to_string(),
            backend: String::new(),
            status: String::new(),
            pid: 0,
            pane_id: String::new(),
            window: String::new(),
            started_at: now,
            updated_at: now,
            unknown_fields: HashMap::new(),
        });
    rec.backend = backend.to_string();
    rec.status = status.to_string();
    rec.pid = pid;
    rec.pane_id = pane_id.to_string();
    rec.window = window.to_string();
    rec.updated_at = now;
    let out = rec.clone();
    write_runtime(paths, &mut table)?;
    Ok(out)
}

/// Update the status (and optionally pid) of an existing record.
pub fn runtime_mark(
    paths: &SessionPaths,
    agent: &str,
    status: &str,
    pid: Option<u32>,
) -> Result<RuntimeRecord, StoreError> {
    let mut table = read_runtime(paths)?;
    let rec = table
        .agents
        .get_mut(agent)
        .ok_or_else(|| StoreError::NotFound {
            what: "runtime agent",
            ident: agent.to_string(),
        })?;
    rec.status = status.to_string();
    if let Some(pid) = pid {
        rec.pid = pid;
    }
    rec.updated_at = now_ms();
    let out = rec.clone();
    write_runtime(paths, &mut table)?;
    Ok(out)
}

/// Signal an agent's process (when alive) and mark it `terminated`.
#[cfg(unix)]
pub fn runtime_kill(
    paths: &SessionPaths,
    agent: &str,
    use_sigkill: bool,
) -> Result<RuntimeRecord, StoreError> {
    let table = read_runtime(paths)?;
    let rec = table.agents.get(agent).ok_or_else(|| StoreError::NotFound {
        what: "runtime agent",
        ident: agent.to_string(),
    })?;
    if rec.pid > 0 && pid_alive(rec.pid) {
        let sig = if use_sigkill { libc::SIGKILL } else { libc::SIGTERM };
        unsafe {
            libc::kill(rec.pid as libc::pid_t, sig);
        }
    }
    runtime_mark(paths, agent, "terminated", None)
}

#[cfg(not(unix))]
pub fn runtime_kill(
    paths: &SessionPaths,
    agent: &str,
    _use_sigkill: bool,
) -> Result<RuntimeRecord, StoreError> {
    let _ = pid_alive(0);
    runtime_mark(paths, agent, "terminated", None)
}
