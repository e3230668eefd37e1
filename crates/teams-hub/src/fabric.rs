//! Store access seam for supervisor loops
//!
//! The worker tick logic talks to the session stores through [`Fabric`]
//! so tests can substitute failing or scripted stores. The production
//! implementation couples the file mailboxes with the SQLite room log and
//! wraps every call in the hub's retry discipline.

use crate::caps::{BUS_CMD_RETRIES, FS_CMD_RETRIES, RETRY_BASE_MS};
use anyhow::Result;
use codex_teams_bus::BusStore;
use codex_teams_core::dispatch::{Outgoing, deliver_message};
use codex_teams_core::paths::SessionPaths;
use codex_teams_core::schema::{ControlRecord, ControlStatus, ControlType, MailboxMessage, TeamConfig};
use codex_teams_core::{control, mailbox, runtime, team};
use std::time::Duration;

/// Everything a worker loop needs from the session stores.
pub trait Fabric {
    /// Room name for room-log sends.
    fn room(&self) -> &str;

    /// Current team lead.
    fn lead_name(&self) -> String;

    /// Reviewer-role team members.
    fn reviewers(&self) -> Vec<String>;

    /// Opaque mention token for `agent`'s file mailbox.
    fn signal_token(&self, agent: &str) -> u64;

    /// Unread file-mailbox rows with index `>= start_index`, ascending.
    fn fetch_unread(
        &self,
        agent: &str,
        start_index: usize,
        limit: usize,
    ) -> Result<Vec<(usize, MailboxMessage)>>;

    /// All file-mailbox rows (read or not) with index `>= start_index`.
    fn fetch_rows(
        &self,
        agent: &str,
        start_index: usize,
        limit: usize,
    ) -> Result<Vec<(usize, MailboxMessage)>>;

    /// Mark file-mailbox rows read; returns rows actually transitioned.
    fn mark_read(&mut self, agent: &str, indexes: &[usize]) -> Result<usize>;

    /// Append a room-log message (with mailbox fan-out on the bus side).
    fn log_send(&mut self, sender: &str, recipient: &str, kind: &str, body: &str) -> Result<()>;

    /// Upsert a bus member row.
    fn bus_register(&mut self, agent: &str, role: &str) -> Result<()>;

    /// Deliver a file-mailbox message (broadcast fan-out included).
    fn dispatch(&mut self, outgoing: &Outgoing) -> Result<Vec<String>>;

    /// Look up a control record by id (filesystem table first, then bus).
    fn control_lookup(&self, request_id: &str) -> Result<Option<ControlRecord>>;

    /// Resolve a control request on both stores and emit the paired
    /// response messages.
    fn control_respond(
        &mut self,
        request_id: &str,
        responder: &str,
        approve: bool,
        body: &str,
        recipient: &str,
        req_type: ControlType,
    ) -> Result<()>;

    /// Update a member's permission mode in the team config.
    fn set_member_mode(&mut self, ident: &str, mode: &str) -> Result<bool>;

    /// Mark an agent running in the runtime table.
    fn runtime_set_running(&mut self, agent: &str, backend: &str, pid: u32, window: &str) -> Result<()>;

    /// Mark an agent terminated in the runtime table.
    fn runtime_mark_terminated(&mut self, agent: &str) -> Result<()>;
}

fn with_retries<T>(retries: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt > retries {
                    return Err(e);
                }
                std::thread::sleep(Duration::from_millis(RETRY_BASE_MS * u64::from(attempt)));
            }
        }
    }
}

/// Production fabric over one session directory and its bus database.
pub struct SessionFabric {
    paths: SessionPaths,
    room: String,
    cfg: TeamConfig,
    bus: BusStore,
}

impl SessionFabric {
    /// Open the session's stores. The team config must already exist.
    pub fn open(paths: SessionPaths, room: &str) -> Result<Self> {
        let cfg = team::read_config(&paths)?;
        let bus = BusStore::open(&paths.bus_db)?;
        Ok(Self {
            paths,
            room: room.to_string(),
            cfg,
            bus,
        })
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn config(&self) -> &TeamConfig {
        &self.cfg
    }
}

impl Fabric for SessionFabric {
    fn room(&self) -> &str {
        &self.room
    }

    fn lead_name(&self) -> String {
        self.cfg.lead_name()
    }

    fn reviewers(&self) -> Vec<String> {
        self.cfg
            .members
            .iter()
            .filter(|m| m.agent_type == "reviewer" || m.name.starts_with("reviewer-"))
            .map(|m| m.name.clone())
            .collect()
    }

    fn signal_token(&self, agent: &str) -> u64 {
        mailbox::signal_token(&self.paths, agent)
    }

    fn fetch_unread(
        &self,
        agent: &str,
        start_index: usize,
        limit: usize,
    ) -> Result<Vec<(usize, MailboxMessage)>> {
        with_retries(FS_CMD_RETRIES, || {
            Ok(mailbox::read_indexed(&self.paths, agent, true, start_index, limit)?)
        })
    }

    fn fetch_rows(
        &self,
        agent: &str,
        start_index: usize,
        limit: usize,
    ) -> Result<Vec<(usize, MailboxMessage)>> {
        with_retries(FS_CMD_RETRIES, || {
            Ok(mailbox::read_indexed(&self.paths, agent, false, start_index, limit)?)
        })
    }

    fn mark_read(&mut self, agent: &str, indexes: &[usize]) -> Result<usize> {
        with_retries(FS_CMD_RETRIES, || {
            Ok(mailbox::mark_read(&self.paths, agent, indexes, false)?)
        })
    }

    fn log_send(&mut self, sender: &str, recipient: &str, kind: &str, body: &str) -> Result<()> {
        let room = self.room.clone();
        with_retries(BUS_CMD_RETRIES, || {
            self.bus.send(&room, sender, recipient, kind, body, "{}")?;
            Ok(())
        })
    }

    fn bus_register(&mut self, agent: &str, role: &str) -> Result<()> {
        let room = self.room.clone();
        with_retries(BUS_CMD_RETRIES, || {
            self.bus.register(&room, agent, role, "active")?;
            Ok(())
        })
    }

    fn dispatch(&mut self, outgoing: &Outgoing) -> Result<Vec<String>> {
        with_retries(FS_CMD_RETRIES, || {
            Ok(deliver_message(&self.paths, &self.cfg, outgoing)?)
        })
    }

    fn control_lookup(&self, request_id: &str) -> Result<Option<ControlRecord>> {
        if let Some(record) = control::get_control_request(&self.paths, request_id)? {
            return Ok(Some(record));
        }
        let Some(row) = self.bus.get_control_request(request_id)? else {
            return Ok(None);
        };
        let req_type = ControlType::normalize(&row.req_type)
            .map_err(anyhow::Error::msg)?;
        let status = match row.status.as_str() {
            "approved" => ControlStatus::Approved,
            "rejected" => ControlStatus::Rejected,
            _ => ControlStatus::Pending,
        };
        Ok(Some(ControlRecord {
            request_id: row.request_id,
            req_type,
            sender: row.sender,
            recipient: row.recipient,
            body: row.body,
            summary: row.summary,
            status,
            created_ts: row.created_ts,
            updated_ts: row.updated_ts,
            response_body: row.response_body,
            responder: row.responder,
        }))
    }

    fn control_respond(
        &mut self,
        request_id: &str,
        responder: &str,
        approve: bool,
        body: &str,
        recipient: &str,
        req_type: ControlType,
    ) -> Result<()> {
        // Bus side: only when the record lives there; a missing or
        // already-resolved bus row is not an error for the consumer.
        match self.bus.respond_control_request(request_id, responder, approve, body) {
            Ok(_) => {}
            Err(codex_teams_bus::BusError::RequestNotFound { .. }) => {}
            Err(codex_teams_bus::BusError::Conflict { message }) => {
                tracing::debug!("bus control respond skipped: {message}");
            }
            Err(e) => return Err(e.into()),
        }

        // Filesystem side: synthesizes a record for message-only requests.
        match control::respond_control_request(
            &self.paths,
            &self.cfg,
            control::ControlResponseInput {
                request_id: request_id.to_string(),
                responder: responder.to_string(),
                approve,
                body: body.to_string(),
                recipient_override: recipient.to_string(),
                req_type_override: Some(req_type),
            },
        ) {
            Ok(_) => Ok(()),
            Err(codex_teams_core::StoreError::Conflict { message }) => {
                tracing::debug!("fs control respond skipped: {message}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_member_mode(&mut self, ident: &str, mode: &str) -> Result<bool> {
        let changed = team::set_member_mode(&mut self.cfg, ident, mode);
        if changed {
            team::write_config(&self.paths, &mut self.cfg)?;
        }
        Ok(changed)
    }

    fn runtime_set_running(&mut self, agent: &str, backend: &str, pid: u32, window: &str) -> Result<()> {
        with_retries(FS_CMD_RETRIES, || {
            runtime::runtime_set(&self.paths, agent, backend, "running", pid, "", window)?;
            Ok(())
        })
    }

    fn runtime_mark_terminated(&mut self, agent: &str) -> Result<()> {
        with_retries(FS_CMD_RETRIES, || {
            runtime::runtime_mark(&self.paths, agent, "terminated", None)?;
            Ok(())
        })
    }
}

/// Scripted in-memory fabric for worker-loop tests.
#[cfg(test)]
pub mod memory {
    use super::Fabric;
    use anyhow::{Result, bail};
    use codex_teams_core::dispatch::Outgoing;
    use codex_teams_core::schema::{ControlRecord, ControlType, MailboxMessage};
    use std::collections::{BTreeMap, BTreeSet, HashMap};

    /// One recorded control response.
    #[derive(Debug, Clone)]
    pub struct RespondedControl {
        pub request_id: String,
        pub responder: String,
        pub approve: bool,
        pub body: String,
        pub recipient: String,
    }

    #[derive(Default)]
    pub struct MemoryFabric {
        pub room: String,
        pub lead: String,
        pub inboxes: BTreeMap<String, Vec<MailboxMessage>>,
        /// (sender, recipient, kind, body)
        pub log: Vec<(String, String, String, String)>,
        pub dispatched: Vec<Outgoing>,
        pub control_records: BTreeMap<String, ControlRecord>,
        pub responded: Vec<RespondedControl>,
        pub member_modes: Vec<(String, String)>,
        pub reviewers_list: Vec<String>,
        /// Mailbox indexes that silently refuse to transition to read.
        pub fail_mark_for: BTreeSet<usize>,
        /// When set, mark_read errors outright instead of shorting.
        pub mark_read_errors: bool,
        pub runtime_events: Vec<(String, String)>,
    }

    impl MemoryFabric {
        pub fn new(lead: &str) -> Self {
            Self {
                room: "main".to_string(),
                lead: lead.to_string(),
                ..Self::default()
            }
        }

        pub fn deliver(&mut self, agent: &str, msg: MailboxMessage) -> usize {
            let inbox = self.inboxes.entry(agent.to_string()).or_default();
            inbox.push(msg);
            inbox.len() - 1
        }

        pub fn message(
            msg_type: &str,
            from: &str,
            recipient: &str,
            text: &str,
        ) -> MailboxMessage {
            MailboxMessage {
                msg_type: msg_type.to_string(),
                from: from.to_string(),
                recipient: (!recipient.is_empty()).then(|| recipient.to_string()),
                text: text.to_string(),
                summary: "s".to_string(),
                timestamp: String::new(),
                color: String::new(),
                read: false,
                request_id: None,
                approve: None,
                meta: None,
                unknown_fields: HashMap::new(),
            }
        }
    }

    impl Fabric for MemoryFabric {
        fn room(&self) -> &str {
            &self.room
        }

        fn lead_name(&self) -> String {
            self.lead.clone()
        }

        fn reviewers(&self) -> Vec<String> {
            self.reviewers_list.clone()
        }

        fn signal_token(&self, agent: &str) -> u64 {
            let Some(inbox) = self.inboxes.get(agent) else {
                return 0;
            };
            let unread = inbox.iter().filter(|m| !m.read).count() as u64;
            ((inbox.len() as u64) << 32) ^ unread
        }

        fn fetch_unread(
            &self,
            agent: &str,
            start_index: usize,
            limit: usize,
        ) -> Result<Vec<(usize, MailboxMessage)>> {
            let Some(inbox) = self.inboxes.get(agent) else {
                return Ok(Vec::new());
            };
            Ok(inbox
                .iter()
                .enumerate()
                .skip(start_index)
                .filter(|(_, m)| !m.read)
                .take(limit)
                .map(|(i, m)| (i, m.clone()))
                .collect())
        }

        fn fetch_rows(
            &self,
            agent: &str,
            start_index: usize,
            limit: usize,
        ) -> Result<Vec<(usize, MailboxMessage)>> {
            let Some(inbox) = self.inboxes.get(agent) else {
                return Ok(Vec::new());
            };
            Ok(inbox
                .iter()
                .enumerate()
                .skip(start_index)
                .take(limit)
                .map(|(i, m)| (i, m.clone()))
                .collect())
        }

        fn mark_read(&mut self, agent: &str, indexes: &[usize]) -> Result<usize> {
            if self.mark_read_errors {
                bail!("mark_read store failure");
            }
            let Some(inbox) = self.inboxes.get_mut(agent) else {
                return Ok(0);
            };
            let mut marked = 0;
            for index in indexes {
                if self.fail_mark_for.contains(index) {
                    continue;
                }
                if let Some(msg) = inbox.get_mut(*index)
                    && !msg.read
                {
                    msg.read = true;
                    marked += 1;
                }
            }
            Ok(marked)
        }

        fn log_send(&mut self, sender: &str, recipient: &str, kind: &str, body: &str) -> Result<()> {
            self.log.push((
                sender.to_string(),
                recipient.to_string(),
                kind.to_string(),
                body.to_string(),
            ));
            Ok(())
        }

        fn bus_register(&mut self, agent: &str, role: &str) -> Result<()> {
            self.runtime_events
                .push((agent.to_string(), format!("register:{role}")));
            Ok(())
        }

        fn dispatch(&mut self, outgoing: &Outgoing) -> Result<Vec<String>> {
            self.dispatched.push(outgoing.clone());
            Ok(vec![outgoing.recipient.clone()])
        }

        fn control_lookup(&self, request_id: &str) -> Result<Option<ControlRecord>> {
            Ok(self.control_records.get(request_id).cloned())
        }

        fn control_respond(
            &mut self,
            request_id: &str,
            responder: &str,
            approve: bool,
            body: &str,
            recipient: &str,
            _req_type: ControlType,
        ) -> Result<()> {
            self.responded.push(RespondedControl {
                request_id: request_id.to_string(),
                responder: responder.to_string(),
                approve,
                body: body.to_string(),
                recipient: recipient.to_string(),
            });
            Ok(())
        }

        fn set_member_mode(&mut self, ident: &str, mode: &str) -> Result<bool> {
            self.member_modes.push((ident.to_string(), mode.to_string()));
            Ok(true)
        }

        fn runtime_set_running(&mut self, agent: &str, backend: &str, _pid: u32, _window: &str) -> Result<()> {
            self.runtime_events
                .push((agent.to_string(), format!("running:{backend}")));
            Ok(())
        }

        fn runtime_mark_terminated(&mut self, agent: &str) -> Result<()> {
            self.runtime_events
                .push((agent.to_string(), "terminated".to_string()));
            Ok(())
        }
    }
}
