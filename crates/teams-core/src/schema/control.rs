//! Control request schema: record side of the request/response lifecycle

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The four control request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    PlanApproval,
    Shutdown,
    Permission,
    ModeSet,
}

impl ControlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlanApproval => "plan_approval",
            Self::Shutdown => "shutdown",
            Self::Permission => "permission",
            Self::ModeSet => "mode_set",
        }
    }

    /// Mailbox kind for the request message.
    pub fn request_kind(self) -> String {
        format!("{}_request", self.as_str())
    }

    /// Mailbox kind for the response message.
    pub fn response_kind(self) -> String {
        format!("{}_response", self.as_str())
    }

    /// Parse a bare type or a `<type>_request`/`<type>_response` kind.
    pub fn normalize(raw: &str) -> Result<Self, String> {
        let mut val = raw.trim();
        if let Some(stripped) = val.strip_suffix("_request") {
            val = stripped;
        }
        if let Some(stripped) = val.strip_suffix("_response") {
            val = stripped;
        }
        val.parse()
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan_approval" => Ok(Self::PlanApproval),
            "shutdown" => Ok(Self::Shutdown),
            "permission" => Ok(Self::Permission),
            "mode_set" => Ok(Self::ModeSet),
            other => Err(format!("unsupported control type: {other}")),
        }
    }
}

/// Control request status; leaves `pending` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    Pending,
    Approved,
    Rejected,
}

impl ControlStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One control request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRecord {
    pub request_id: String,
    pub req_type: ControlType,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    #[serde(default)]
    pub summary: String,
    pub status: ControlStatus,
    pub created_ts: String,
    pub updated_ts: String,
    #[serde(default)]
    pub response_body: String,
    #[serde(default)]
    pub responder: String,
}

/// On-disk control table (`control.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlTable {
    #[serde(default)]
    pub requests: BTreeMap<String, ControlRecord>,

    #[serde(default)]
    pub updated_at: u64,

    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_suffixes() {
        assert_eq!(
            ControlType::normalize("shutdown_request").unwrap(),
            ControlType::Shutdown
        );
        assert_eq!(
            ControlType::normalize("plan_approval_response").unwrap(),
            ControlType::PlanApproval
        );
        assert_eq!(
            ControlType::normalize("mode_set").unwrap(),
            ControlType::ModeSet
        );
        assert!(ControlType::normalize("reboot_request").is_err());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(ControlType::Shutdown.request_kind(), "shutdown_request");
        assert_eq!(
            ControlType::Permission.response_kind(),
            "permission_response"
        );
    }

    #[test]
    fn test_record_roundtrip() {
        let rec = ControlRecord {
            request_id: "req-a1b2".to_string(),
            req_type: ControlType::Shutdown,
            sender: "lead".to_string(),
            recipient: "worker-1".to_string(),
            body: "stop".to_string(),
            summary: String::new(),
            status: ControlStatus::Pending,
            created_ts: "2026-03-01T12:00:00.000Z".to_string(),
            updated_ts: "2026-03-01T12:00:00.000Z".to_string(),
            response_body: String::new(),
            responder: String::new(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"req_type\":\"shutdown\""));
        assert!(json.contains("\"status\":\"pending\""));

        let reparsed: ControlRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed.req_type, ControlType::Shutdown);
        assert_eq!(reparsed.status, ControlStatus::Pending);
    }
}
