//! Thin tmux command wrappers used by the pane bridge

use std::process::Command;
use tracing::debug;

fn run(args: &[&str]) -> bool {
    match Command::new("tmux").args(args).output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            debug!("tmux {:?} failed to run: {e}", args.first());
            false
        }
    }
}

/// Whether a tmux session with this name exists.
pub fn has_session(session: &str) -> bool {
    run(&["has-session", "-t", session])
}

/// Send literal text into a pane (no key interpretation).
pub fn send_literal(pane_id: &str, text: &str) -> bool {
    run(&["send-keys", "-t", pane_id, "-l", "--", text])
}

/// Send a carriage return into a pane.
pub fn send_enter(pane_id: &str) -> bool {
    run(&["send-keys", "-t", pane_id, "C-m"])
}

/// Kill a pane.
pub fn kill_pane(pane_id: &str) -> bool {
    run(&["kill-pane", "-t", pane_id])
}
