//! Session directory layout
//!
//! Every team session keeps its stores under `<repo>/.codex-teams/<session>/`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::io::StoreError;

/// Directory name under the repository root holding all sessions.
pub const SESSIONS_DIR: &str = ".codex-teams";

/// Resolved paths for one session's stores.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub repo: PathBuf,
    pub session: String,
    pub root: PathBuf,
    pub config: PathBuf,
    /// Legacy mirror of `config.json`, kept in sync on every config write.
    pub team_legacy: PathBuf,
    pub inboxes: PathBuf,
    pub tasks: PathBuf,
    pub state: PathBuf,
    pub runtime: PathBuf,
    pub control: PathBuf,
    pub bus_db: PathBuf,
    pub hub_log: PathBuf,
    pub heartbeat: PathBuf,
}

impl SessionPaths {
    /// Resolve store paths for `session` under `repo`.
    pub fn resolve(repo: impl AsRef<Path>, session: &str) -> Self {
        let repo = repo
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| repo.as_ref().to_path_buf());
        let root = repo.join(SESSIONS_DIR).join(session);
        Self {
            repo,
            session: session.to_string(),
            config: root.join("config.json"),
            team_legacy: root.join("team.json"),
            inboxes: root.join("inboxes"),
            tasks: root.join("tasks"),
            state: root.join("state.json"),
            runtime: root.join("runtime.json"),
            control: root.join("control.json"),
            bus_db: root.join("bus.sqlite"),
            hub_log: root.join("hub.log"),
            heartbeat: root.join("heartbeat.json"),
            root,
        }
    }

    /// Create the session root and its sub-directories.
    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        for dir in [&self.root, &self.inboxes, &self.tasks] {
            fs::create_dir_all(dir).map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Inbox file for one agent.
    pub fn inbox(&self, agent: &str) -> PathBuf {
        self.inboxes.join(format!("{agent}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_layout() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "pair-1");

        assert!(paths.root.ends_with(".codex-teams/pair-1"));
        assert_eq!(paths.config.file_name().unwrap(), "config.json");
        assert_eq!(paths.bus_db.file_name().unwrap(), "bus.sqlite");
        assert_eq!(
            paths.inbox("worker-1").file_name().unwrap(),
            "worker-1.json"
        );
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "pair-1");
        paths.ensure_dirs().unwrap();

        assert!(paths.inboxes.is_dir());
        assert!(paths.tasks.is_dir());
    }
}
