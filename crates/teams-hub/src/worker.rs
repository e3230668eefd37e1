//! Per-worker state machine
//!
//! One `WorkerState` per managed teammate: a token-gated mailbox cursor,
//! the pending prompt queue, the in-flight index set, and at most one
//! active child process. Acknowledgement is deferred until the run that
//! consumed a message completes; a short ack forces a cursor-resetting
//! re-scan on the next tick.

use crate::caps::{
    MAX_PROMPT_CHARS_PER_RUN, MAX_PROMPT_MESSAGES_PER_RUN, SUMMARY_LIMIT, WORKER_MAILBOX_BATCH,
};
use crate::child::{AgentChild, RunOutcome};
use crate::collab::{self, CollabTargets};
use crate::exec;
use crate::fabric::Fabric;
use anyhow::Result;
use codex_teams_core::dispatch::Outgoing;
use codex_teams_core::schema::{MailboxMessage, message_type};
use codex_teams_core::text::summarize;
use codex_teams_core::time::now_ms;
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;

/// Truncation sentinel appended to summaries of capped captures.
pub const TRUNCATION_SENTINEL: &str = "[output truncated]";

/// Static configuration for one managed teammate.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub role: String,
    pub cwd: PathBuf,
    pub profile: String,
    pub model: String,
    pub agent_bin: String,
    pub permission_mode: String,
    pub plan_mode_required: bool,
    pub idle_ms: u64,
    pub prompt_prefix: String,
}

/// One queued prompt line and the mailbox index it came from (`None` for
/// seeded work such as an initial task).
#[derive(Debug, Clone)]
pub struct PromptEntry {
    pub index: Option<usize>,
    pub text: String,
}

/// An executing child and the indexes that composed its prompt.
pub struct ActiveRun {
    pub child: AgentChild,
    pub indexes: Vec<usize>,
    pub started_ms: u64,
}

/// Mutable per-worker loop state.
pub struct WorkerState {
    pub config: WorkerConfig,
    pub scan_index: usize,
    pub last_token: u64,
    pub force_scan: bool,
    pub prompt_queue: VecDeque<PromptEntry>,
    pub in_flight: BTreeSet<usize>,
    pub active: Option<ActiveRun>,
    pub collab_targets: CollabTargets,
    pub stopped: bool,
    pub last_run_ok: bool,
    pub last_activity_ms: u64,
    pub last_idle_sent_ms: u64,
}

impl WorkerState {
    pub fn new(config: WorkerConfig, initial_token: u64) -> Self {
        Self {
            config,
            scan_index: 0,
            last_token: initial_token,
            force_scan: true,
            prompt_queue: VecDeque::new(),
            in_flight: BTreeSet::new(),
            active: None,
            collab_targets: CollabTargets::new(),
            stopped: false,
            last_run_ok: false,
            last_activity_ms: now_ms(),
            last_idle_sent_ms: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether this worker has nothing queued, executing or unacked.
    pub fn is_drained(&self) -> bool {
        self.prompt_queue.is_empty() && self.in_flight.is_empty() && self.active.is_none()
    }

    /// Token-gated mailbox scan.
    ///
    /// Returns unread rows at or past the cursor without marking them.
    /// An empty result with a nonzero cursor probes index 0 for older
    /// unread left behind by a partial ack and rescans from there.
    pub fn scan<F: Fabric>(&mut self, fabric: &F) -> Result<Vec<(usize, MailboxMessage)>> {
        let token = fabric.signal_token(self.name());
        if !self.force_scan && token == self.last_token {
            return Ok(Vec::new());
        }
        self.force_scan = false;
        self.last_token = token;

        let mut rows = fabric.fetch_unread(self.name(), self.scan_index, WORKER_MAILBOX_BATCH)?;
        if rows.is_empty() && self.scan_index > 0 {
            let probe = fabric.fetch_unread(self.name(), 0, 1)?;
            if let Some((oldest, _)) = probe.first()
                && *oldest < self.scan_index
            {
                self.scan_index = *oldest;
                rows = fabric.fetch_unread(self.name(), self.scan_index, WORKER_MAILBOX_BATCH)?;
            }
        }
        if let Some((last, _)) = rows.last() {
            self.scan_index = last + 1;
        }
        Ok(rows)
    }

    /// Queue one actionable message for the next prompt batch.
    ///
    /// Returns `true` when the message was queued; `false` when it was
    /// already in flight and must stay unread for retry.
    pub fn enqueue_actionable(&mut self, index: usize, msg: &MailboxMessage) -> bool {
        if self.in_flight.contains(&index) {
            return false;
        }
        let text = msg.text.trim();
        let line = format!(
            "from={} summary={} text={text}",
            msg.from,
            msg.summary.trim()
        );
        self.prompt_queue.push_back(PromptEntry {
            index: Some(index),
            text: line.trim().to_string(),
        });
        self.in_flight.insert(index);
        true
    }

    /// Seed the queue with work that has no mailbox backing (e.g. an
    /// initial task handed to a fresh agent).
    pub fn seed_task(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.prompt_queue.push_back(PromptEntry {
            index: None,
            text: text.to_string(),
        });
    }

    /// Pop the next prompt batch.
    ///
    /// Up to [`MAX_PROMPT_MESSAGES_PER_RUN`] lines under the
    /// [`MAX_PROMPT_CHARS_PER_RUN`] character cap; the first line is
    /// always taken so an oversized message cannot wedge the queue.
    pub fn pop_prompt_batch(&mut self) -> (String, Vec<usize>) {
        let mut lines: Vec<String> = Vec::new();
        let mut indexes: Vec<usize> = Vec::new();
        let mut chars = 0usize;
        while let Some(front) = self.prompt_queue.front() {
            if lines.len() >= MAX_PROMPT_MESSAGES_PER_RUN {
                break;
            }
            if !lines.is_empty() && chars + front.text.chars().count() > MAX_PROMPT_CHARS_PER_RUN {
                break;
            }
            let entry = self.prompt_queue.pop_front().expect("front checked");
            chars += entry.text.chars().count();
            lines.push(entry.text);
            if let Some(index) = entry.index {
                indexes.push(index);
            }
        }
        let prompt = format!("{}\n\n{}", self.config.prompt_prefix, lines.join("\n"));
        (prompt, indexes)
    }

    /// Spawn the external agent for the next batch, if idle and work is
    /// queued. On spawn failure the batch is published as a failed run
    /// (exit 127) so its indexes are acknowledged and reported.
    pub fn maybe_dispatch<F: Fabric>(&mut self, fabric: &mut F, lead: &str) -> Result<bool> {
        if self.active.is_some() || self.prompt_queue.is_empty() {
            return Ok(false);
        }
        let (prompt, indexes) = self.pop_prompt_batch();
        let mut cmd = exec::build_command(
            &self.config.agent_bin,
            &self.config.permission_mode,
            &self.config.model,
            &self.config.profile,
            &self.config.cwd,
            &prompt,
        );
        match AgentChild::spawn(&mut cmd) {
            Ok(child) => {
                self.active = Some(ActiveRun {
                    child,
                    indexes,
                    started_ms: now_ms(),
                });
                self.last_activity_ms = now_ms();
                Ok(true)
            }
            Err(e) => {
                let outcome = RunOutcome {
                    exit_code: 127,
                    output: format!("failed to execute {}: {e}", self.config.agent_bin),
                    truncated: false,
                };
                self.finish_run(fabric, lead, indexes, outcome)?;
                Ok(true)
            }
        }
    }

    /// Drain and reap the active child. Returns `true` when
    /// a run completed this tick.
    pub fn poll_active<F: Fabric>(&mut self, fabric: &mut F, lead: &str) -> Result<bool> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        active.child.drain_tick();
        let Some(exit_code) = active.child.poll_exit() else {
            return Ok(false);
        };
        let run = self.active.take().expect("active present");
        let outcome = run.child.finish(exit_code);
        self.finish_run(fabric, lead, run.indexes, outcome)?;
        Ok(true)
    }

    /// Publish the run result, fan out collaboration updates, then
    /// acknowledge the composing indexes, in that order.
    pub fn finish_run<F: Fabric>(
        &mut self,
        fabric: &mut F,
        lead: &str,
        indexes: Vec<usize>,
        outcome: RunOutcome,
    ) -> Result<()> {
        let summary = build_result_summary(&outcome.output, outcome.truncated);
        let state = if outcome.exit_code == 0 { "complete" } else { "failed" };
        let body = format!(
            "worker_result state={state} exit={} summary={summary}",
            outcome.exit_code
        );

        if self.name() != lead {
            let kind = if outcome.exit_code == 0 { "status" } else { "blocker" };
            fabric.log_send(self.name(), lead, kind, &body)?;
            fabric.dispatch(&Outgoing {
                msg_type: "message".to_string(),
                sender: self.name().to_string(),
                recipient: lead.to_string(),
                text: body.clone(),
                summary: if outcome.exit_code == 0 {
                    "worker-run-complete".to_string()
                } else {
                    "worker-run-failed".to_string()
                },
                request_id: String::new(),
                approve: None,
                meta: Some(json!({
                    "source": "worker-result",
                    "worker": self.name(),
                    "state": state,
                    "exit_code": outcome.exit_code,
                })),
            })?;
        }

        let targets = std::mem::take(&mut self.collab_targets);
        collab::emit_updates(fabric, self.name(), lead, &targets, &body, outcome.exit_code)?;

        self.acknowledge(fabric, &indexes)?;
        self.last_run_ok = outcome.exit_code == 0;
        self.last_activity_ms = now_ms();
        Ok(())
    }

    /// Mark the run's composing indexes read. Indexes leave the in-flight
    /// set before the transition so an index is never `read` while still
    /// in flight; a shortfall forces a re-scan next tick.
    fn acknowledge<F: Fabric>(&mut self, fabric: &mut F, indexes: &[usize]) -> Result<()> {
        for index in indexes {
            self.in_flight.remove(index);
        }
        if indexes.is_empty() {
            return Ok(());
        }
        let marked = match fabric.mark_read(self.name(), indexes) {
            Ok(marked) => marked,
            Err(e) => {
                tracing::warn!("ack failed for {}: {e}", self.name());
                self.force_scan = true;
                return Ok(());
            }
        };
        if marked < indexes.len() {
            tracing::warn!(
                "ack shortfall for {}: marked {marked} of {}",
                self.name(),
                indexes.len()
            );
            self.force_scan = true;
        }
        Ok(())
    }

    /// Idle heartbeat to the lead.
    pub fn maybe_send_idle<F: Fabric>(&mut self, fabric: &mut F, lead: &str) -> Result<bool> {
        let idle_ms = self.config.idle_ms;
        let current = now_ms();
        if current.saturating_sub(self.last_activity_ms) < idle_ms
            || current.saturating_sub(self.last_idle_sent_ms) < idle_ms
        {
            return Ok(false);
        }
        fabric.dispatch(&Outgoing {
            msg_type: "idle_notification".to_string(),
            sender: self.name().to_string(),
            recipient: lead.to_string(),
            text: format!("idle notification from {}", self.name()),
            summary: "idle".to_string(),
            request_id: String::new(),
            approve: None,
            meta: None,
        })?;
        fabric.log_send(self.name(), lead, "status", "idle notification sent")?;
        self.last_idle_sent_ms = current;
        Ok(true)
    }

    /// Terminate the active child, if any, returning its outcome.
    pub fn terminate_active(&mut self) -> Option<RunOutcome> {
        self.active.take().map(|run| run.child.terminate())
    }
}

/// Whether a message feeds the prompt queue.
pub fn is_actionable(msg: &MailboxMessage) -> bool {
    message_type::is_actionable(&msg.msg_type)
}

/// Classify and absorb one scan's worth of inbound messages.
///
/// Control messages are resolved and acked on the spot; actionable ones
/// join the prompt queue unless already in flight; the rest are acked
/// immediately. Returns `true` when a shutdown was approved and the
/// worker was stopped (the caller's backend announces it offline).
pub fn process_inbound<F: Fabric>(
    fabric: &mut F,
    worker: &mut WorkerState,
    backend: &str,
    rows: &[(usize, MailboxMessage)],
) -> Result<bool> {
    for (index, msg) in rows {
        match crate::control::handle_message(fabric, worker, *index, msg)? {
            crate::control::Handled::Stop => {
                if let Some(outcome) = worker.terminate_active() {
                    tracing::debug!(
                        "terminated child for {} exit={}",
                        worker.name(),
                        outcome.exit_code
                    );
                }
                worker.stopped = true;
                worker_offline(fabric, worker, backend)?;
                return Ok(true);
            }
            crate::control::Handled::Done => {}
            crate::control::Handled::NotControl => {
                if !is_actionable(msg) || msg.text.trim().is_empty() {
                    // Nothing to execute; acknowledge immediately.
                    if fabric.mark_read(worker.name(), &[*index]).is_err() {
                        worker.force_scan = true;
                    }
                } else if worker.enqueue_actionable(*index, msg) {
                    let singleton = vec![(*index, msg.clone())];
                    let targets = collab::collect_targets(&singleton, worker.name());
                    collab::merge_targets(&mut worker.collab_targets, targets);
                    worker.last_activity_ms = now_ms();
                }
            }
        }
    }
    Ok(false)
}

/// Compose the capped result summary, ending with the truncation sentinel
/// when the capture overflowed.
pub fn build_result_summary(output: &str, truncated: bool) -> String {
    if truncated {
        let budget = SUMMARY_LIMIT - TRUNCATION_SENTINEL.len() - 1;
        let base = summarize(output, budget);
        let base = if base.is_empty() { "empty output".to_string() } else { base };
        format!("{base} {TRUNCATION_SENTINEL}")
    } else {
        let base = summarize(output, SUMMARY_LIMIT);
        if base.is_empty() { "empty output".to_string() } else { base }
    }
}

/// Role derived from an agent name.
pub fn role_from_agent_name(name: &str, lead_name: &str) -> &'static str {
    if name == lead_name {
        "lead"
    } else if name.starts_with("reviewer-") {
        "reviewer"
    } else if name.starts_with("utility-") {
        "utility"
    } else {
        "worker"
    }
}

/// Announce a worker online: runtime record, bus membership, status
/// broadcast.
pub fn worker_online<F: Fabric>(fabric: &mut F, worker: &WorkerState, backend: &str) -> Result<()> {
    let pid = std::process::id();
    fabric.runtime_set_running(worker.name(), backend, pid, backend)?;
    fabric.bus_register(worker.name(), &worker.config.role)?;
    fabric.log_send(
        worker.name(),
        "all",
        "status",
        &format!(
            "online backend={backend} pid={pid} permission_mode={}",
            worker.config.permission_mode
        ),
    )
}

/// Announce a worker offline: runtime terminated, status broadcast.
pub fn worker_offline<F: Fabric>(fabric: &mut F, worker: &WorkerState, backend: &str) -> Result<()> {
    fabric.runtime_mark_terminated(worker.name())?;
    fabric.log_send(
        worker.name(),
        "all",
        "status",
        &format!("offline backend={backend}"),
    )
}
