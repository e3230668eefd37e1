//! SQLite-backed room log for codex-teams
//!
//! Provides ordered message delivery, per-recipient mailbox state and the
//! control-request lifecycle over one WAL database per session.

pub mod store;
pub mod types;

pub use store::{BusError, BusStore, DEFAULT_ROOM, MarkReadSelector, compact_ascii_json, parse_meta};
pub use types::{ControlRequestRow, MailItem, MemberRow, Message, RoomStatus};
