//! Mailbox message schema
//!
//! Messages are stored in `<session>/inboxes/<agent>.json` as
//! `{"agent": ..., "messages": [MailboxMessage...]}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One message in an agent's file inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxMessage {
    /// Message type from the closed vocabulary
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Sender agent name
    pub from: String,

    /// Delivery target (present on fanned-out copies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Message content
    pub text: String,

    /// Brief summary
    #[serde(default)]
    pub summary: String,

    /// ISO 8601 UTC timestamp, millisecond precision
    pub timestamp: String,

    /// Sender's palette color
    #[serde(default)]
    pub color: String,

    /// Whether the message has been read; one-way transition
    pub read: bool,

    /// Control request correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Approval verdict on `*_response` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve: Option<bool>,

    /// Structured metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl MailboxMessage {
    /// Metadata object, or an empty object if absent/non-object.
    pub fn meta_object(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.meta {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        }
    }
}

/// On-disk inbox file shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxFile {
    pub agent: String,
    #[serde(default)]
    pub messages: Vec<MailboxMessage>,
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl InboxFile {
    pub fn empty(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            messages: Vec::new(),
            unknown_fields: HashMap::new(),
        }
    }
}
