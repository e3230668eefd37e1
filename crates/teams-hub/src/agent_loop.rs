//! Single-agent teammate loop
//!
//! The same pipeline as one worker inside the hub, running as its own
//! process with its own signal handlers and runtime record. The one
//! operational difference: the external agent runs as a blocking child
//! invocation, drained to completion before the loop continues.

use crate::child::{AgentChild, RunOutcome};
use crate::exec;
use crate::fabric::{Fabric, SessionFabric};
use crate::signals;
use crate::worker::{self, WorkerConfig, WorkerState};
use anyhow::Result;
use codex_teams_core::paths::SessionPaths;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const BACKEND: &str = "in-process";

/// Single-agent loop options (parsed from the CLI).
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub repo: PathBuf,
    pub session: String,
    pub room: String,
    pub agent: String,
    pub role: String,
    pub cwd: PathBuf,
    pub profile: String,
    pub model: String,
    pub agent_bin: String,
    pub poll_ms: u64,
    pub idle_ms: u64,
    pub permission_mode: String,
    pub plan_mode_required: bool,
    pub initial_task: String,
}

fn prompt_prefix(opts: &AgentOptions, paths: &SessionPaths, lead: &str) -> String {
    format!(
        "# Agent Teammate Communication\n\
         You are running as an agent in a team. Use codex-teams sendmessage types \
         `message` and `broadcast` for team communication.\n\n\
         # Team Coordination\n\
         You are teammate `{}` in team `{}`.\n\
         Team config: {}\n\
         Task list: {}\n\
         Team leader: {lead}\n",
        opts.agent,
        opts.session,
        paths.config.display(),
        paths.tasks.display()
    )
}

/// Run the teammate loop until shutdown. Returns the process exit code.
pub fn run(opts: &AgentOptions) -> Result<i32> {
    signals::install();

    let paths = SessionPaths::resolve(&opts.repo, &opts.session);
    let mut fabric = SessionFabric::open(paths.clone(), &opts.room)?;
    let lead = fabric.lead_name();

    let config = WorkerConfig {
        name: opts.agent.clone(),
        role: if opts.role.is_empty() {
            worker::role_from_agent_name(&opts.agent, &lead).to_string()
        } else {
            opts.role.clone()
        },
        cwd: opts.cwd.clone(),
        profile: opts.profile.clone(),
        model: opts.model.clone(),
        agent_bin: opts.agent_bin.clone(),
        permission_mode: opts.permission_mode.clone(),
        plan_mode_required: opts.plan_mode_required,
        idle_ms: opts.idle_ms,
        prompt_prefix: prompt_prefix(opts, &paths, &lead),
    };
    let token = fabric.signal_token(&config.name);
    let mut worker_state = WorkerState::new(config, token);

    worker::worker_online(&mut fabric, &worker_state, BACKEND)?;
    info!("teammate {} online", worker_state.name());

    if !opts.initial_task.trim().is_empty() {
        worker_state.seed_task(&opts.initial_task);
        fabric.log_send(worker_state.name(), &lead, "status", "initial task accepted")?;
    }

    while !signals::stop_requested() && !worker_state.stopped {
        let rows = match worker_state.scan(&fabric) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("mailbox scan failed: {e}");
                worker_state.force_scan = true;
                Vec::new()
            }
        };
        if worker::process_inbound(&mut fabric, &mut worker_state, BACKEND, &rows)? {
            break;
        }

        if !worker_state.prompt_queue.is_empty() {
            let (prompt, indexes) = worker_state.pop_prompt_batch();
            let mut cmd = exec::build_command(
                &worker_state.config.agent_bin,
                &worker_state.config.permission_mode,
                &worker_state.config.model,
                &worker_state.config.profile,
                &worker_state.config.cwd,
                &prompt,
            );
            let outcome = match AgentChild::spawn(&mut cmd) {
                Ok(child) => child.wait_blocking(),
                Err(e) => RunOutcome {
                    exit_code: 127,
                    output: format!(
                        "failed to execute {}: {e}",
                        worker_state.config.agent_bin
                    ),
                    truncated: false,
                },
            };
            worker_state.finish_run(&mut fabric, &lead, indexes, outcome)?;
        }

        worker_state.maybe_send_idle(&mut fabric, &lead)?;
        std::thread::sleep(Duration::from_millis(opts.poll_ms.max(100)));
    }

    if !worker_state.stopped {
        worker::worker_offline(&mut fabric, &worker_state, BACKEND)?;
        worker_state.stopped = true;
    }
    info!("teammate {} offline", worker_state.name());
    Ok(0)
}
