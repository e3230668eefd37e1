//! Shared teammate hub
//!
//! One process drives N teammate mailbox loops with a single-threaded
//! cooperative scheduler. Each tick walks the workers in a fixed order
//! (scan, classify, enqueue, dispatch, drain, idle), then runs the
//! lead-side aggregation that decides when the review round opens.

use crate::caps::{ACTIVE_LOOP_SLEEP_MS, FAST_LOOP_SLEEP_MS, HEARTBEAT_MIN_MS, LEAD_SCAN_BATCH, MAX_LOOP_SLEEP_MS};
use crate::fabric::{Fabric, SessionFabric};
use crate::lifecycle::{Heartbeat, append_lifecycle, write_heartbeat};
use crate::review::{REVIEW_PROMPT, REVIEW_READY_SUMMARY, REVIEW_TRIGGER_SUMMARY, ReviewTracker};
use crate::signals;
use crate::worker::{self, WorkerConfig, WorkerState};
use anyhow::Result;
use codex_teams_core::dispatch::Outgoing;
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::time::{now_ms, utc_now_iso};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKEND: &str = "in-process-shared";

/// Hub invocation options (parsed from the CLI).
#[derive(Debug, Clone)]
pub struct HubOptions {
    pub repo: PathBuf,
    pub session: String,
    pub room: String,
    pub prefix: String,
    pub count: usize,
    pub agents_csv: String,
    pub worktrees_root: PathBuf,
    pub profile: String,
    pub model: String,
    pub lead_name: String,
    pub lead_cwd: String,
    pub lead_profile: String,
    pub lead_model: String,
    pub reviewer_name: String,
    pub reviewer_profile: String,
    pub reviewer_model: String,
    pub reviewer_permission_mode: String,
    pub agent_bin: String,
    pub poll_ms: u64,
    pub idle_ms: u64,
    pub permission_mode: String,
    pub plan_mode_required: bool,
    pub heartbeat_file: Option<PathBuf>,
    pub lifecycle_log: Option<PathBuf>,
}

/// Team-coordination preamble prepended to every worker prompt.
pub fn prompt_base(session: &str, paths: &SessionPaths, lead: &str) -> String {
    format!(
        "# Agent Teammate Communication\n\
         You are running as an agent in a team. Use codex-teams sendmessage types \
         `message` and `broadcast` for team communication.\n\n\
         # Team Coordination\n\
         You are a teammate in team `{session}`.\n\
         Team config: {}\n\
         Task list: {}\n\
         Team leader: {lead}\n",
        paths.config.display(),
        paths.tasks.display()
    )
}

fn worker_names(opts: &HubOptions) -> Vec<String> {
    if !opts.agents_csv.trim().is_empty() {
        opts.agents_csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        (1..=opts.count)
            .map(|i| format!("{}-{i}", opts.prefix))
            .collect()
    }
}

/// Run the hub until every worker stops or a termination signal lands.
/// Returns the process exit code.
pub fn run(opts: &HubOptions) -> Result<i32> {
    signals::install();

    let paths = SessionPaths::resolve(&opts.repo, &opts.session);
    let lifecycle = opts.lifecycle_log.as_deref();
    append_lifecycle(
        lifecycle,
        &format!(
            "hub-start pid={} repo={} session={} room={}",
            std::process::id(),
            paths.repo.display(),
            opts.session,
            opts.room
        ),
    );

    let mut fabric = SessionFabric::open(paths.clone(), &opts.room)?;
    let lead = if opts.lead_name.trim().is_empty() {
        fabric.lead_name()
    } else {
        opts.lead_name.trim().to_string()
    };
    let lead_cwd = if opts.lead_cwd.trim().is_empty() {
        paths.repo.clone()
    } else {
        PathBuf::from(opts.lead_cwd.trim())
    };
    let lead_profile = if opts.lead_profile.trim().is_empty() {
        opts.profile.clone()
    } else {
        opts.lead_profile.trim().to_string()
    };
    let lead_model = if opts.lead_model.trim().is_empty() {
        opts.model.clone()
    } else {
        opts.lead_model.trim().to_string()
    };
    let base = prompt_base(&opts.session, &paths, &lead);

    let mut workers: Vec<WorkerState> = Vec::new();
    for name in worker_names(opts) {
        let is_lead = name == lead;
        let is_reviewer = !opts.reviewer_name.is_empty() && name == opts.reviewer_name;
        let cwd = if is_lead {
            lead_cwd.clone()
        } else {
            opts.worktrees_root.join(&name)
        };
        if !cwd.is_dir() {
            // Bootstrap anomalies surface to the lead as blockers.
            fabric.log_send(
                "system",
                &lead,
                "blocker",
                &format!("skip worker bootstrap: missing worktree agent={name} cwd={}", cwd.display()),
            )?;
            continue;
        }
        let (profile, model, permission_mode) = if is_lead {
            (lead_profile.clone(), lead_model.clone(), opts.permission_mode.clone())
        } else if is_reviewer {
            (
                if opts.reviewer_profile.is_empty() { opts.profile.clone() } else { opts.reviewer_profile.clone() },
                if opts.reviewer_model.is_empty() { opts.model.clone() } else { opts.reviewer_model.clone() },
                opts.reviewer_permission_mode.clone(),
            )
        } else {
            (opts.profile.clone(), opts.model.clone(), opts.permission_mode.clone())
        };

        let config = WorkerConfig {
            role: worker::role_from_agent_name(&name, &lead).to_string(),
            prompt_prefix: format!("{base}\n**Your Identity:**\n- Name: {name}\n"),
            name,
            cwd,
            profile,
            model,
            agent_bin: opts.agent_bin.clone(),
            permission_mode,
            plan_mode_required: opts.plan_mode_required,
            idle_ms: opts.idle_ms,
        };
        let token = fabric.signal_token(&config.name);
        workers.push(WorkerState::new(config, token));
    }

    if workers.is_empty() {
        append_lifecycle(lifecycle, "hub-abort no-worker-worktrees");
        fabric.log_send(
            "system",
            "all",
            "blocker",
            "shared hub aborted: no worker worktrees available",
        )?;
        return Ok(2);
    }

    append_lifecycle(
        lifecycle,
        &format!(
            "hub-workers-ready count={} workers={}",
            workers.len(),
            workers.iter().map(|w| w.name().to_string()).collect::<Vec<_>>().join(",")
        ),
    );

    for worker_state in &workers {
        if let Err(e) = worker::worker_online(&mut fabric, worker_state, BACKEND) {
            warn!("worker online announcement failed for {}: {e}", worker_state.name());
        }
    }

    let mut tracker = ReviewTracker::new(
        workers
            .iter()
            .filter(|w| w.config.role == "worker")
            .map(|w| w.name().to_string()),
    );
    let mut lead_cursor: usize = 0;
    let mut last_heartbeat: u64 = 0;

    while !signals::stop_requested() && workers.iter().any(|w| !w.stopped) {
        let mut did_work = false;

        for worker_state in workers.iter_mut() {
            if signals::stop_requested() || worker_state.stopped {
                continue;
            }
            match tick_worker(&mut fabric, worker_state, &lead) {
                Ok(worked) => did_work |= worked,
                Err(e) => {
                    // Per-worker failures never take the hub down; the
                    // forced scan retries the work next tick.
                    warn!("worker {} tick failed: {e}", worker_state.name());
                    append_lifecycle(
                        lifecycle,
                        &format!("worker-tick-error agent={} error={e}", worker_state.name()),
                    );
                    worker_state.force_scan = true;
                }
            }
            update_done_bit(&fabric, worker_state, &mut tracker);
        }

        if let Err(e) = lead_aggregation(
            &mut fabric,
            &lead,
            &mut lead_cursor,
            &mut tracker,
            &workers,
        ) {
            warn!("lead aggregation failed: {e}");
        }

        let current = now_ms();
        if current.saturating_sub(last_heartbeat) >= HEARTBEAT_MIN_MS.max(opts.poll_ms) {
            write_heartbeat(
                opts.heartbeat_file.as_deref(),
                &Heartbeat {
                    ts: utc_now_iso(),
                    pid: std::process::id(),
                    session: opts.session.clone(),
                    room: opts.room.clone(),
                    active_workers: workers.iter().filter(|w| !w.stopped).count(),
                    total_workers: workers.len(),
                    stop: signals::stop_requested(),
                },
            );
            last_heartbeat = current;
        }

        let any_child = workers.iter().any(|w| w.active.is_some());
        let sleep_ms = if did_work {
            ACTIVE_LOOP_SLEEP_MS
        } else if any_child {
            FAST_LOOP_SLEEP_MS
        } else {
            FAST_LOOP_SLEEP_MS.max(opts.poll_ms).min(MAX_LOOP_SLEEP_MS)
        };
        std::thread::sleep(Duration::from_millis(sleep_ms));
    }

    // Shutdown: terminate children, drain, mark everyone offline.
    for worker_state in workers.iter_mut() {
        if let Some(outcome) = worker_state.terminate_active() {
            debug!(
                "terminated child for {} exit={}",
                worker_state.name(),
                outcome.exit_code
            );
        }
    }
    for worker_state in workers.iter_mut() {
        if !worker_state.stopped {
            if let Err(e) = worker::worker_offline(&mut fabric, worker_state, BACKEND) {
                warn!("worker offline announcement failed for {}: {e}", worker_state.name());
            }
            worker_state.stopped = true;
        }
    }

    let reason = match signals::stop_signal_name() {
        Some(name) => format!("signal:{name}"),
        None => "all-workers-stopped".to_string(),
    };
    append_lifecycle(
        lifecycle,
        &format!(
            "hub-stop reason={reason} active_workers={}",
            workers.iter().filter(|w| !w.stopped).count()
        ),
    );
    info!("hub stopped: {reason}");
    Ok(0)
}

/// One worker's share of a tick: scan, classify, dispatch, drain, idle.
fn tick_worker<F: Fabric>(fabric: &mut F, worker_state: &mut WorkerState, lead: &str) -> Result<bool> {
    let rows = worker_state.scan(fabric)?;
    let mut did_work = !rows.is_empty();

    if worker::process_inbound(fabric, worker_state, BACKEND, &rows)? {
        return Ok(true);
    }

    did_work |= worker_state.maybe_dispatch(fabric, lead)?;
    did_work |= worker_state.poll_active(fabric, lead)?;
    worker_state.maybe_send_idle(fabric, lead)?;
    Ok(did_work)
}

/// Refresh one worker's done bit after its tick.
fn update_done_bit<F: Fabric>(fabric: &F, worker_state: &WorkerState, tracker: &mut ReviewTracker) {
    if !tracker.is_tracked(worker_state.name()) {
        return;
    }
    if worker_state.stopped {
        // A cleanly stopped worker no longer blocks the review round.
        tracker.set_done(worker_state.name(), true);
        return;
    }
    if !(worker_state.last_run_ok && worker_state.is_drained()) {
        tracker.set_done(worker_state.name(), false);
        return;
    }
    let no_unread = fabric
        .fetch_unread(worker_state.name(), 0, 1)
        .map(|rows| rows.is_empty())
        .unwrap_or(false);
    tracker.set_done(worker_state.name(), no_unread);
}

/// Lead-side aggregation: scan the lead's mailbox with its own
/// cursor and fire the one-shot review announcement.
fn lead_aggregation<F: Fabric>(
    fabric: &mut F,
    lead: &str,
    lead_cursor: &mut usize,
    tracker: &mut ReviewTracker,
    workers: &[WorkerState],
) -> Result<()> {
    let rows = fabric.fetch_rows(lead, *lead_cursor, LEAD_SCAN_BATCH)?;
    if let Some((last, _)) = rows.last() {
        *lead_cursor = last + 1;
    }
    for (_, msg) in &rows {
        tracker.note_lead_row(msg);
    }

    let active_children = workers.iter().filter(|w| w.active.is_some()).count();
    if tracker.should_announce(active_children) {
        announce_review(fabric, lead, workers)?;
        tracker.mark_announced();
    }
    Ok(())
}

fn announce_review<F: Fabric>(fabric: &mut F, lead: &str, workers: &[WorkerState]) -> Result<()> {
    info!("all workers done; announcing review round");
    fabric.log_send("system", lead, "status", "review_ready all workers done")?;
    fabric.dispatch(&Outgoing {
        msg_type: "status".to_string(),
        sender: "system".to_string(),
        recipient: lead.to_string(),
        text: "review_ready all workers done".to_string(),
        summary: REVIEW_READY_SUMMARY.to_string(),
        request_id: String::new(),
        approve: None,
        meta: None,
    })?;

    let mut reviewers = fabric.reviewers();
    for worker_state in workers.iter().filter(|w| w.config.role == "reviewer") {
        if !reviewers.iter().any(|r| r == worker_state.name()) {
            reviewers.push(worker_state.name().to_string());
        }
    }
    for reviewer in reviewers {
        fabric.dispatch(&Outgoing {
            msg_type: "task".to_string(),
            sender: "system".to_string(),
            recipient: reviewer,
            text: REVIEW_PROMPT.to_string(),
            summary: REVIEW_TRIGGER_SUMMARY.to_string(),
            request_id: String::new(),
            approve: None,
            meta: None,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::memory::MemoryFabric;
    use crate::worker::WorkerConfig;
    use serde_json::json;

    fn worker(name: &str, role: &str) -> WorkerState {
        WorkerState::new(
            WorkerConfig {
                name: name.to_string(),
                role: role.to_string(),
                cwd: PathBuf::from("/tmp"),
                profile: String::new(),
                model: String::new(),
                agent_bin: "codex".to_string(),
                permission_mode: "default".to_string(),
                plan_mode_required: false,
                idle_ms: 12_000,
                prompt_prefix: String::new(),
            },
            0,
        )
    }

    #[test]
    fn test_review_announced_once_when_all_workers_done() {
        // Scenario: two workers finish their tasks; exactly one
        // review-ready status reaches the lead and exactly one task with
        // the review trigger reaches the reviewer.
        let mut fabric = MemoryFabric::new("lead");
        fabric.reviewers_list = vec!["reviewer-1".to_string()];
        let workers = vec![worker("worker-1", "worker"), worker("worker-2", "worker")];
        let mut tracker = ReviewTracker::new(["worker-1", "worker-2"]);
        let mut cursor = 0usize;

        // Workers still busy: no announcement.
        lead_aggregation(&mut fabric, "lead", &mut cursor, &mut tracker, &workers).unwrap();
        assert!(fabric.dispatched.is_empty());

        tracker.set_done("worker-1", true);
        tracker.set_done("worker-2", true);
        lead_aggregation(&mut fabric, "lead", &mut cursor, &mut tracker, &workers).unwrap();

        let ready: Vec<_> = fabric
            .dispatched
            .iter()
            .filter(|o| o.summary == REVIEW_READY_SUMMARY)
            .collect();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].recipient, "lead");
        assert_eq!(ready[0].msg_type, "status");
        assert_eq!(ready[0].sender, "system");

        let triggers: Vec<_> = fabric
            .dispatched
            .iter()
            .filter(|o| o.summary == REVIEW_TRIGGER_SUMMARY)
            .collect();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].recipient, "reviewer-1");
        assert_eq!(triggers[0].msg_type, "task");

        // Subsequent ticks never announce again.
        lead_aggregation(&mut fabric, "lead", &mut cursor, &mut tracker, &workers).unwrap();
        assert_eq!(
            fabric
                .dispatched
                .iter()
                .filter(|o| o.summary == REVIEW_READY_SUMMARY)
                .count(),
            1
        );
    }

    #[test]
    fn test_lead_scan_flips_done_and_blocks_announcement() {
        let mut fabric = MemoryFabric::new("lead");
        let workers = vec![worker("worker-1", "worker")];
        let mut tracker = ReviewTracker::new(["worker-1"]);
        let mut cursor = 0usize;
        tracker.set_done("worker-1", true);

        // A fresh question from worker-1 lands in the lead's inbox before
        // the aggregation pass: the done bit flips back.
        fabric.deliver(
            "lead",
            MemoryFabric::message("question", "worker-1", "lead", "what next?"),
        );
        lead_aggregation(&mut fabric, "lead", &mut cursor, &mut tracker, &workers).unwrap();
        assert!(fabric.dispatched.is_empty());
        assert!(!tracker.announced());

        // Worker-result markers do not flip the bit: the announcement
        // proceeds once the worker is done again.
        tracker.set_done("worker-1", true);
        let mut marker = MemoryFabric::message("message", "worker-1", "lead", "result");
        marker.meta = Some(json!({"source": "worker-result"}));
        fabric.deliver("lead", marker);
        lead_aggregation(&mut fabric, "lead", &mut cursor, &mut tracker, &workers).unwrap();
        assert!(tracker.announced());
    }

    #[test]
    fn test_announcement_waits_for_active_children() {
        let mut fabric = MemoryFabric::new("lead");
        let mut tracker = ReviewTracker::new(["worker-1"]);
        tracker.set_done("worker-1", true);

        // Simulate an active child on the worker.
        let mut busy = worker("worker-1", "worker");
        let mut cmd = std::process::Command::new("/bin/sh");
        cmd.arg("-c").arg("sleep 5");
        busy.active = Some(crate::worker::ActiveRun {
            child: crate::child::AgentChild::spawn(&mut cmd).unwrap(),
            indexes: Vec::new(),
            started_ms: 0,
        });
        let workers = vec![busy];
        let mut cursor = 0usize;

        lead_aggregation(&mut fabric, "lead", &mut cursor, &mut tracker, &workers).unwrap();
        assert!(!tracker.announced());

        // Reap the child and retry.
        let mut workers = workers;
        if let Some(outcome) = workers[0].terminate_active() {
            assert_ne!(outcome.exit_code, 0);
        }
        lead_aggregation(&mut fabric, "lead", &mut cursor, &mut tracker, &workers).unwrap();
        assert!(tracker.announced());
    }

    #[test]
    fn test_worker_names_from_csv_and_prefix() {
        let mut opts = HubOptions {
            repo: PathBuf::from("."),
            session: "s".to_string(),
            room: "main".to_string(),
            prefix: "worker".to_string(),
            count: 3,
            agents_csv: String::new(),
            worktrees_root: PathBuf::from("/tmp"),
            profile: String::new(),
            model: String::new(),
            lead_name: "lead".to_string(),
            lead_cwd: String::new(),
            lead_profile: String::new(),
            lead_model: String::new(),
            reviewer_name: String::new(),
            reviewer_profile: String::new(),
            reviewer_model: String::new(),
            reviewer_permission_mode: "plan".to_string(),
            agent_bin: "codex".to_string(),
            poll_ms: 1000,
            idle_ms: 12_000,
            permission_mode: "default".to_string(),
            plan_mode_required: false,
            heartbeat_file: None,
            lifecycle_log: None,
        };
        assert_eq!(worker_names(&opts), vec!["worker-1", "worker-2", "worker-3"]);

        opts.agents_csv = "lead, worker-1 ,reviewer-1".to_string();
        assert_eq!(worker_names(&opts), vec!["lead", "worker-1", "reviewer-1"]);
    }
}
