//! Closed mailbox message-type vocabulary

use std::fmt;
use std::str::FromStr;

/// Valid mailbox message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Message,
    Broadcast,
    Status,
    Task,
    Question,
    Answer,
    Blocker,
    IdleNotification,
    System,
    PlanApprovalRequest,
    PlanApprovalResponse,
    ShutdownRequest,
    ShutdownResponse,
    ShutdownApproved,
    ShutdownRejected,
    PermissionRequest,
    PermissionResponse,
    ModeSetRequest,
    ModeSetResponse,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Broadcast => "broadcast",
            Self::Status => "status",
            Self::Task => "task",
            Self::Question => "question",
            Self::Answer => "answer",
            Self::Blocker => "blocker",
            Self::IdleNotification => "idle_notification",
            Self::System => "system",
            Self::PlanApprovalRequest => "plan_approval_request",
            Self::PlanApprovalResponse => "plan_approval_response",
            Self::ShutdownRequest => "shutdown_request",
            Self::ShutdownResponse => "shutdown_response",
            Self::ShutdownApproved => "shutdown_approved",
            Self::ShutdownRejected => "shutdown_rejected",
            Self::PermissionRequest => "permission_request",
            Self::PermissionResponse => "permission_response",
            Self::ModeSetRequest => "mode_set_request",
            Self::ModeSetResponse => "mode_set_response",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "broadcast" => Ok(Self::Broadcast),
            "status" => Ok(Self::Status),
            "task" => Ok(Self::Task),
            "question" => Ok(Self::Question),
            "answer" => Ok(Self::Answer),
            "blocker" => Ok(Self::Blocker),
            "idle_notification" => Ok(Self::IdleNotification),
            "system" => Ok(Self::System),
            "plan_approval_request" => Ok(Self::PlanApprovalRequest),
            "plan_approval_response" => Ok(Self::PlanApprovalResponse),
            "shutdown_request" => Ok(Self::ShutdownRequest),
            "shutdown_response" => Ok(Self::ShutdownResponse),
            "shutdown_approved" => Ok(Self::ShutdownApproved),
            "shutdown_rejected" => Ok(Self::ShutdownRejected),
            "permission_request" => Ok(Self::PermissionRequest),
            "permission_response" => Ok(Self::PermissionResponse),
            "mode_set_request" => Ok(Self::ModeSetRequest),
            "mode_set_response" => Ok(Self::ModeSetResponse),
            other => Err(format!("unsupported message type: {other}")),
        }
    }
}

/// Whether a message of this type should feed a worker prompt.
///
/// Status traffic, idle pings, system notices and any `*_response` carry no
/// work; everything else does.
pub fn is_actionable(msg_type: &str) -> bool {
    !matches!(msg_type, "status" | "idle_notification" | "system") && !msg_type.ends_with("_response")
}
