//! Core types and stores for codex-teams
//!
//! This crate provides the session-store layer shared by every
//! codex-teams binary: atomic JSON stores under
//! `<repo>/.codex-teams/<session>/`, the per-recipient file mailboxes,
//! team configuration, runtime records and the filesystem side of the
//! control-request lifecycle.
//!
//! All schema types preserve unknown fields for forward compatibility and
//! round-trip through serde without data loss.

pub mod color;
pub mod control;
pub mod dispatch;
pub mod io;
pub mod logging;
pub mod mailbox;
pub mod paths;
pub mod process;
pub mod runtime;
pub mod schema;
pub mod state;
pub mod team;
pub mod text;
pub mod time;

pub use color::Color;
pub use io::StoreError;
pub use paths::SessionPaths;
pub use schema::{
    ControlRecord, ControlStatus, ControlType, InboxFile, MailboxMessage, MessageType,
    PermissionMode, RuntimeRecord, RuntimeTable, StateBlob, TeamConfig, TeamMember,
};
