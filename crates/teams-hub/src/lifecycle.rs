//! Lifecycle log and heartbeat blob
//!
//! Both are best-effort: a failed write never takes the hub down.

use codex_teams_core::io::write_json;
use codex_teams_core::time::utc_now_iso;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Append one timestamped line to the lifecycle log, fsync'd.
pub fn append_lifecycle(log_path: Option<&Path>, message: &str) {
    let Some(path) = log_path else {
        return;
    };
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{} {message}", utc_now_iso())?;
        file.sync_all()
    };
    if let Err(e) = write() {
        tracing::warn!("lifecycle log write failed for {}: {e}", path.display());
    }
}

/// Hub liveness blob written at heartbeat cadence.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub ts: String,
    pub pid: u32,
    pub session: String,
    pub room: String,
    pub active_workers: usize,
    pub total_workers: usize,
    pub stop: bool,
}

/// Atomically replace the heartbeat file. Best-effort.
pub fn write_heartbeat(path: Option<&Path>, heartbeat: &Heartbeat) {
    let Some(path) = path else {
        return;
    };
    if let Err(e) = write_json(path, heartbeat) {
        tracing::warn!("heartbeat write failed for {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_lifecycle_creates_and_appends() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("logs/hub.log");

        append_lifecycle(Some(&log), "hub-start pid=1");
        append_lifecycle(Some(&log), "hub-stop reason=test");

        let content = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("hub-start pid=1"));
        assert!(lines[1].ends_with("hub-stop reason=test"));
    }

    #[test]
    fn test_append_lifecycle_none_is_noop() {
        append_lifecycle(None, "ignored");
    }

    #[test]
    fn test_write_heartbeat_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("heartbeat.json");

        write_heartbeat(
            Some(&path),
            &Heartbeat {
                ts: "2026-03-01T12:00:00Z".to_string(),
                pid: 42,
                session: "pair-1".to_string(),
                room: "main".to_string(),
                active_workers: 2,
                total_workers: 3,
                stop: false,
            },
        );

        let blob: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(blob["pid"], 42);
        assert_eq!(blob["active_workers"], 2);
        assert_eq!(blob["stop"], false);
    }
}
