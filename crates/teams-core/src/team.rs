//! Team configuration store and member CRUD

use crate::color::Color;
use crate::io::{StoreError, read_json, write_json};
use crate::mailbox::ensure_inbox;
use crate::paths::SessionPaths;
use crate::schema::{
    ControlTable, RuntimeTable, StateBlob, TeamConfig, TeamMember, make_agent_id,
};
use crate::time::now_ms;
use std::collections::HashMap;
use std::fs;

/// Read the session's team config; fails when no team exists.
pub fn read_config(paths: &SessionPaths) -> Result<TeamConfig, StoreError> {
    if !paths.config.exists() {
        return Err(StoreError::NotFound {
            what: "team config",
            ident: paths.config.display().to_string(),
        });
    }
    let content = fs::read(&paths.config).map_err(|e| StoreError::Io {
        path: paths.config.clone(),
        source: e,
    })?;
    serde_json::from_slice(&content).map_err(|e| StoreError::Json {
        path: paths.config.clone(),
        source: e,
    })
}

/// Write the config and its legacy `team.json` mirror, bumping `updatedAt`.
pub fn write_config(paths: &SessionPaths, cfg: &mut TeamConfig) -> Result<(), StoreError> {
    cfg.updated_at = now_ms();
    write_json(&paths.config, cfg)?;
    write_json(&paths.team_legacy, cfg)
}

/// Parameters for adding a member.
#[derive(Debug, Clone, Default)]
pub struct NewMember {
    pub name: String,
    pub agent_type: String,
    pub model: String,
    pub prompt: String,
    /// Empty = assign from the palette by joined order.
    pub color: String,
    pub plan_mode_required: bool,
    pub cwd: String,
    pub backend_type: String,
    pub mode: String,
    pub pane_id: String,
}

/// Add a member to the config. Fails on duplicate names.
pub fn add_member(cfg: &mut TeamConfig, new: NewMember) -> Result<TeamMember, StoreError> {
    if cfg.member_index(&new.name).is_some() {
        return Err(StoreError::conflict(format!(
            "member already exists: {}",
            new.name
        )));
    }
    let idx = cfg.members.len();
    let color = if new.color.is_empty() {
        Color::assign(idx).to_string()
    } else {
        new.color
    };
    let rec = TeamMember {
        agent_id: make_agent_id(&new.name, &cfg.name),
        name: new.name,
        agent_type: new.agent_type,
        model: new.model,
        prompt: new.prompt,
        color,
        plan_mode_required: new.plan_mode_required,
        joined_at: now_ms(),
        tmux_pane_id: new.pane_id,
        cwd: new.cwd,
        subscriptions: Vec::new(),
        backend_type: new.backend_type,
        mode: new.mode,
        unknown_fields: HashMap::new(),
    };
    cfg.members.push(rec.clone());
    Ok(rec)
}

/// Remove a member by name or agent id. The team lead may not be removed.
/// Returns whether anything changed.
pub fn remove_member(cfg: &mut TeamConfig, ident: &str) -> Result<bool, StoreError> {
    let Some(idx) = cfg.member_index(ident) else {
        return Ok(false);
    };
    if cfg.members[idx].agent_id == cfg.lead_agent_id {
        return Err(StoreError::conflict("cannot remove team lead"));
    }
    cfg.members.remove(idx);
    Ok(true)
}

/// Set a member's permission mode. Returns whether the member was found.
pub fn set_member_mode(cfg: &mut TeamConfig, ident: &str, mode: &str) -> bool {
    match cfg.member_index(ident) {
        Some(idx) => {
            cfg.members[idx].mode = mode.to_string();
            true
        }
        None => false,
    }
}

/// Reset inboxes, task dirs, logs and the runtime/state/control stores.
pub fn clear_runtime_artifacts(paths: &SessionPaths) -> Result<(), StoreError> {
    for dir in [&paths.inboxes, &paths.tasks, &paths.root.join("logs")] {
        if !dir.exists() {
            continue;
        }
        let entries = fs::read_dir(dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let _ = fs::remove_dir_all(&path);
            } else {
                let _ = fs::remove_file(&path);
            }
        }
    }

    write_json(&paths.runtime, &RuntimeTable::default())?;
    write_json(&paths.state, &StateBlob::default())?;
    write_json(&paths.control, &ControlTable::default())
}

/// Delete the session directory.
///
/// Refuses while runtime records still point at live processes, unless
/// `force` is set.
pub fn delete_team(paths: &SessionPaths, force: bool) -> Result<(), StoreError> {
    if !paths.root.exists() {
        return Ok(());
    }
    let mut runtime: RuntimeTable = read_json(&paths.runtime, RuntimeTable::default)?;
    runtime.prune();
    let running = runtime.active_agents();
    if !running.is_empty() && !force {
        return Err(StoreError::conflict(format!(
            "active members exist: {}",
            running.join(", ")
        )));
    }
    fs::remove_dir_all(&paths.root).map_err(|e| StoreError::Io {
        path: paths.root.clone(),
        source: e,
    })
}

/// Create a fresh team in this session.
///
/// With `replace`, an existing team's runtime artifacts are cleared first;
/// without it, an existing config is a conflict.
#[allow(clippy::too_many_arguments)]
pub fn create_team(
    paths: &SessionPaths,
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
    replace: bool,
) -> Result<TeamConfig, StoreError> {
    paths.ensure_dirs()?;
    if paths.config.exists() {
        if !replace {
            let existing = read_config(paths)?;
            return Err(StoreError::conflict(format!(
                "already leading team \"{}\"",
                existing.name
            )));
        }
        clear_runtime_artifacts(paths)?;
    }

    let mut cfg = TeamConfig::create(
        team_name,
        description,
        lead_name,
        lead_agent_type,
        lead_model,
        lead_cwd,
        lead_session_id,
        parent_session_id,
        lead_backend_type,
        lead_mode,
    );
    write_config(paths, &mut cfg)?;
    write_json(&paths.control, &ControlTable::default())?;
    ensure_inbox(paths, lead_name)?;
    crate::state::set_team_context(paths, &cfg, lead_name)?;
    Ok(cfg)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Config with the given members; the first is the lead.
    pub fn fixture_config(names: &[&str]) -> TeamConfig {
        let mut cfg = TeamConfig::create(
            "test-team",
            "",
            names[0],
            "team-lead",
            "",
            "/repo",
            "sess",
            "parent",
            "tmux",
            "auto",
        );
        for name in &names[1..] {
            add_member(
                &mut cfg,
                NewMember {
                    name: name.to_string(),
                    agent_type: "worker".to_string(),
                    backend_type: "tmux".to_string(),
                    mode: "auto".to_string(),
                    cwd: "/repo".to_string(),
                    ..NewMember::default()
                },
            )
            .unwrap();
        }
        cfg
    }

    #[test]
    fn test_add_member_assigns_palette_color() {
        let mut cfg = fixture_config(&["lead"]);
        let rec = add_member(
            &mut cfg,
            NewMember {
                name: "worker-1".to_string(),
                ..NewMember::default()
            },
        )
        .unwrap();
        assert_eq!(rec.color, "blue");
        assert_eq!(rec.agent_id, "worker-1@test-team");
    }

    #[test]
    fn test_add_duplicate_member_conflicts() {
        let mut cfg = fixture_config(&["lead", "worker-1"]);
        let err = add_member(
            &mut cfg,
            NewMember {
                name: "worker-1".to_string(),
                ..NewMember::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(cfg.members.len(), 2);
    }

    #[test]
    fn test_remove_member() {
        let mut cfg = fixture_config(&["lead", "worker-1"]);
        assert!(remove_member(&mut cfg, "worker-1").unwrap());
        assert_eq!(cfg.members.len(), 1);
        assert!(!remove_member(&mut cfg, "worker-1").unwrap());
    }

    #[test]
    fn test_remove_lead_is_rejected() {
        let mut cfg = fixture_config(&["lead", "worker-1"]);
        let err = remove_member(&mut cfg, "lead").unwrap_err();
        assert!(err.to_string().contains("cannot remove team lead"));
        assert!(cfg.member_index("lead").is_some());
    }

    #[test]
    fn test_set_member_mode() {
        let mut cfg = fixture_config(&["lead", "worker-1"]);
        assert!(set_member_mode(&mut cfg, "worker-1", "plan"));
        assert_eq!(cfg.members[1].mode, "plan");
        assert!(!set_member_mode(&mut cfg, "ghost", "plan"));
    }

    #[test]
    fn test_create_team_writes_config_and_mirror() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");

        let cfg = create_team(
            &paths, "demo", "", "lead", "team-lead", "", "/repo", "", "", "tmux", "auto", false,
        )
        .unwrap();
        assert!(paths.config.exists());
        assert!(paths.team_legacy.exists());
        assert!(paths.inbox("lead").exists());
        assert_eq!(cfg.lead_name(), "lead");

        let err = create_team(
            &paths, "demo", "", "lead", "team-lead", "", "/repo", "", "", "tmux", "auto", false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("already leading team"));
    }

    #[test]
    fn test_create_team_replace_clears_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");

        create_team(
            &paths, "demo", "", "lead", "team-lead", "", "/repo", "", "", "tmux", "auto", false,
        )
        .unwrap();
        crate::mailbox::write_mailbox(
            &paths,
            "worker-1",
            crate::schema::MailboxMessage {
                msg_type: "task".to_string(),
                from: "lead".to_string(),
                recipient: None,
                text: "stale".to_string(),
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
        .unwrap();

        create_team(
            &paths, "demo2", "", "lead", "team-lead", "", "/repo", "", "", "tmux", "auto", true,
        )
        .unwrap();
        assert!(!paths.inbox("worker-1").exists());
    }

    #[test]
    fn test_delete_team_refuses_active_members() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        create_team(
            &paths, "demo", "", "lead", "team-lead", "", "/repo", "", "", "tmux", "auto", false,
        )
        .unwrap();

        // Record pointing at this test process: definitely alive.
        crate::runtime::runtime_set(
            &paths,
            "lead",
            "in-process",
            "running",
            std::process::id(),
            "",
            "",
        )
        .unwrap();

        let err = delete_team(&paths, false).unwrap_err();
        assert!(err.to_string().contains("active members exist"));

        delete_team(&paths, true).unwrap();
        assert!(!paths.root.exists());
    }
}
