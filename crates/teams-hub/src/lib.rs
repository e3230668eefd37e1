//! Teammate supervisors for codex-teams
//!
//! Three consumers over the same mailbox contract:
//! - the shared hub ([`hub`]), one process cooperatively driving N
//!   teammate loops with subprocess execution,
//! - the single-agent loop ([`agent_loop`]), the same pipeline for one
//!   teammate in its own process,
//! - the tmux bridge ([`bridge`]), which injects prompts into running
//!   panes instead of spawning agents.

pub mod agent_loop;
pub mod bridge;
pub mod caps;
pub mod child;
pub mod collab;
pub mod control;
pub mod exec;
pub mod fabric;
pub mod hub;
pub mod lifecycle;
pub mod review;
pub mod signals;
pub mod tmux;
pub mod worker;

pub use fabric::{Fabric, SessionFabric};
pub use worker::{WorkerConfig, WorkerState};
