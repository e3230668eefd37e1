//! Row types returned by the bus store

use serde::Serialize;
use serde_json::{Value, json};

/// One room-log message.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub ts: String,
    pub room: String,
    pub sender: String,
    pub recipient: String,
    pub kind: String,
    pub body: String,
    pub meta_json: String,
}

impl Message {
    /// JSON emission shape with `meta` parsed back into an object.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "ts": self.ts,
            "room": self.room,
            "kind": self.kind,
            "sender": self.sender,
            "recipient": self.recipient,
            "body": self.body,
            "meta": parse_meta_value(&self.meta_json),
        })
    }

    /// One-line text rendering for `tail`.
    pub fn render_text(&self) -> String {
        format!(
            "[{:06}] {} [{}] {} {} -> {}: {}",
            self.id, self.ts, self.room, self.kind, self.sender, self.recipient, self.body
        )
    }
}

/// One mailbox row joined with its message.
#[derive(Debug, Clone, Serialize)]
pub struct MailItem {
    pub mailbox_id: i64,
    pub state: String,
    pub created_ts: String,
    pub read_ts: Option<String>,
    pub message_id: i64,
    pub ts: String,
    pub kind: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub meta_json: String,
}

impl MailItem {
    pub fn to_json(&self) -> Value {
        json!({
            "mailbox_id": self.mailbox_id,
            "state": self.state,
            "created_ts": self.created_ts,
            "read_ts": self.read_ts,
            "message_id": self.message_id,
            "ts": self.ts,
            "kind": self.kind,
            "sender": self.sender,
            "recipient": self.recipient,
            "body": self.body,
            "meta": parse_meta_value(&self.meta_json),
        })
    }

    pub fn render_text(&self) -> String {
        format!(
            "[mb:{:06} msg:{:06}] {} {} {} {} -> {}: {}",
            self.mailbox_id,
            self.message_id,
            self.state,
            self.ts,
            self.kind,
            self.sender,
            self.recipient,
            self.body
        )
    }
}

/// One control request row.
#[derive(Debug, Clone, Serialize)]
pub struct ControlRequestRow {
    pub request_id: String,
    pub room: String,
    pub req_type: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub summary: String,
    pub status: String,
    pub created_ts: String,
    pub updated_ts: String,
    pub response_body: String,
    pub responder: String,
}

/// One member row with its unread count.
#[derive(Debug, Clone, Serialize)]
pub struct MemberRow {
    pub room: String,
    pub agent: String,
    pub role: String,
    pub status: String,
    pub joined_ts: String,
    pub last_seen_ts: String,
    pub unread: i64,
}

/// Per-room status summary.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room: String,
    pub total_messages: i64,
    pub last_id: i64,
    pub per_recipient: Vec<(String, i64)>,
    pub unread: Vec<(String, i64)>,
    pub members: Vec<MemberRow>,
    pub pending_requests: Vec<(String, i64)>,
}

fn parse_meta_value(raw: &str) -> Value {
    if raw.is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({}))
}
