//! Worker-done tracking and the review-ready announcement
//!
//! The hub keeps one done bit per worker-role teammate. A bit turns true
//! when that worker's last run succeeded with nothing queued, in flight
//! or unread; it turns false again whenever fresh non-marker traffic from
//! that worker reaches the lead. When every bit is true at once and no
//! children remain, the review round is announced exactly once.

use codex_teams_core::schema::MailboxMessage;
use std::collections::BTreeMap;

/// Fixed prompt delivered to each reviewer when the review round opens.
pub const REVIEW_PROMPT: &str = "All workers report their tasks complete. Review the combined \
changes now: inspect each worker's result messages and their worktrees, verify the work against \
the task descriptions, and send findings to the team lead as `status` (pass) or `blocker` \
(must-fix) messages.";

/// Summary on the reviewer task message.
pub const REVIEW_TRIGGER_SUMMARY: &str = "review-round-trigger";

/// Summary on the lead's review-ready status message.
pub const REVIEW_READY_SUMMARY: &str = "review-ready";

/// Whether a lead-inbox row is a worker-result marker.
pub fn is_worker_result_marker(msg: &MailboxMessage) -> bool {
    msg.meta_object()
        .get("source")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s == "worker-result")
}

/// Whether a lead-inbox row is a peer collaboration update.
pub fn is_collab_update(msg: &MailboxMessage) -> bool {
    msg.meta_object()
        .get("source")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s == "collab-update")
}

/// Tracks the per-worker done predicate and the one-shot announcement.
pub struct ReviewTracker {
    done: BTreeMap<String, bool>,
    announced: bool,
}

impl ReviewTracker {
    /// Track the given worker-role teammates, all initially not done.
    pub fn new<I, S>(worker_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            done: worker_names.into_iter().map(|n| (n.into(), false)).collect(),
            announced: false,
        }
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.done.contains_key(name)
    }

    /// Update one worker's done bit.
    pub fn set_done(&mut self, name: &str, value: bool) {
        if let Some(bit) = self.done.get_mut(name) {
            *bit = value;
        }
    }

    /// Apply one freshly observed lead-inbox row.
    ///
    /// Any row from a `worker-*` sender that is neither a worker-result
    /// marker nor a collab update means that worker is still engaged.
    pub fn note_lead_row(&mut self, msg: &MailboxMessage) {
        if !msg.from.starts_with("worker-") {
            return;
        }
        if is_worker_result_marker(msg) || is_collab_update(msg) {
            return;
        }
        let sender = msg.from.clone();
        self.set_done(&sender, false);
    }

    /// Whether the announcement should fire now.
    ///
    /// Requires at least one tracked worker, every bit true, no active
    /// children, and no prior announcement.
    pub fn should_announce(&self, active_children: usize) -> bool {
        !self.announced
            && active_children == 0
            && !self.done.is_empty()
            && self.done.values().all(|done| *done)
    }

    /// Latch the announcement; it never fires again this hub lifetime.
    pub fn mark_announced(&mut self) {
        self.announced = true;
    }

    pub fn announced(&self) -> bool {
        self.announced
    }
}
