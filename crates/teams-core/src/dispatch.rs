//! Mailbox message delivery with broadcast fan-out

use crate::io::StoreError;
use crate::mailbox::write_mailbox;
use crate::paths::SessionPaths;
use crate::schema::{MailboxMessage, MessageType, TeamConfig};
use crate::time::utc_now_iso_ms;
use std::collections::HashMap;

/// Everything needed to compose one outgoing mailbox message.
#[derive(Debug, Clone, Default)]
pub struct Outgoing {
    pub msg_type: String,
    pub sender: String,
    /// Ignored for `broadcast`; required otherwise.
    pub recipient: String,
    pub text: String,
    pub summary: String,
    pub request_id: String,
    pub approve: Option<bool>,
    pub meta: Option<serde_json::Value>,
}

/// Deliver a message to its recipient set.
///
/// `broadcast` fans out to every member except the sender, in config
/// order; any other type goes to exactly one recipient. Returns the list
/// of recipients written.
pub fn deliver_message(
    paths: &SessionPaths,
    cfg: &TeamConfig,
    outgoing: &Outgoing,
) -> Result<Vec<String>, StoreError> {
    let msg_type: MessageType = outgoing
        .msg_type
        .parse()
        .map_err(|e: String| StoreError::invalid(e))?;

    let targets: Vec<String> = if msg_type == MessageType::Broadcast {
        cfg.member_names()
            .into_iter()
            .filter(|name| name != &outgoing.sender)
            .collect()
    } else {
        if outgoing.recipient.is_empty() {
            return Err(StoreError::invalid(
                "recipient required for non-broadcast message",
            ));
        }
        vec![outgoing.recipient.clone()]
    };

    let timestamp = utc_now_iso_ms();
    let color = cfg.member_color(&outgoing.sender);

    let mut delivered = Vec::with_capacity(targets.len());
    for target in targets {
        let message = MailboxMessage {
            msg_type: outgoing.msg_type.clone(),
            from: outgoing.sender.clone(),
            recipient: Some(target.clone()),
            text: outgoing.text.clone(),
            summary: outgoing.summary.clone(),
            timestamp: timestamp.clone(),
            color: color.clone(),
            read: false,
            request_id: (!outgoing.request_id.is_empty()).then(|| outgoing.request_id.clone()),
            approve: outgoing.approve,
            meta: outgoing.meta.clone(),
            unknown_fields: HashMap::new(),
        };
        write_mailbox(paths, &target, message)?;
        delivered.push(target);
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::read_mailbox;
    use crate::team::tests::fixture_config;
    use tempfile::TempDir;

    fn outgoing(msg_type: &str, sender: &str, recipient: &str, text: &str) -> Outgoing {
        Outgoing {
            msg_type: msg_type.to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            text: text.to_string(),
            ..Outgoing::default()
        }
    }

    #[test]
    fn test_targeted_delivery() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        paths.ensure_dirs().unwrap();
        let cfg = fixture_config(&["lead", "worker-1", "worker-2"]);

        let delivered =
            deliver_message(&paths, &cfg, &outgoing("message", "lead", "worker-1", "hi")).unwrap();
        assert_eq!(delivered, vec!["worker-1".to_string()]);

        let inbox = read_mailbox(&paths, "worker-1").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].recipient.as_deref(), Some("worker-1"));
        assert!(read_mailbox(&paths, "worker-2").unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        paths.ensure_dirs().unwrap();
        let cfg = fixture_config(&["lead", "worker-1", "worker-2"]);

        let delivered =
            deliver_message(&paths, &cfg, &outgoing("broadcast", "worker-1", "", "all hands"))
                .unwrap();
        assert_eq!(delivered, vec!["lead".to_string(), "worker-2".to_string()]);
        assert!(read_mailbox(&paths, "worker-1").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_type_rejected_without_delivery() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        paths.ensure_dirs().unwrap();
        let cfg = fixture_config(&["lead", "worker-1"]);

        let err =
            deliver_message(&paths, &cfg, &outgoing("gossip", "lead", "worker-1", "x")).unwrap_err();
        assert!(err.to_string().contains("unsupported message type"));
        assert!(read_mailbox(&paths, "worker-1").unwrap().is_empty());
    }

    #[test]
    fn test_missing_recipient_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let paths = SessionPaths::resolve(temp_dir.path(), "s");
        paths.ensure_dirs().unwrap();
        let cfg = fixture_config(&["lead"]);

        let err = deliver_message(&paths, &cfg, &outgoing("message", "lead", "", "x")).unwrap_err();
        assert!(err.to_string().contains("recipient required"));
    }
}
