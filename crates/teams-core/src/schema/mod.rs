//! Schema types for the session stores
//!
//! All wire structs preserve unknown fields for forward compatibility and
//! round-trip through serde without data loss.

pub mod control;
pub mod mailbox_message;
pub mod message_type;
pub mod permission_mode;
pub mod runtime;
pub mod state;
pub mod team_config;

pub use control::{ControlRecord, ControlStatus, ControlTable, ControlType};
pub use mailbox_message::{InboxFile, MailboxMessage};
pub use message_type::{MessageType, is_actionable};
pub use permission_mode::PermissionMode;
pub use runtime::{RuntimeRecord, RuntimeTable};
pub use state::{StateBlob, TeamContext};
pub use team_config::{TeamConfig, TeamMember, make_agent_id, sanitize_team_name};
