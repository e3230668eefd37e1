//! SQLite room-log store
//!
//! Three coupled layers in one WAL database: the append-only message log,
//! per-recipient mailbox state, and the control-request lifecycle. The
//! message insert inside `send` is the serialization point for concurrent
//! writers; mailbox fan-out commits in the same transaction.

use crate::types::{ControlRequestRow, MailItem, MemberRow, Message, RoomStatus};
use codex_teams_core::time::utc_now_iso;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Default room name.
pub const DEFAULT_ROOM: &str = "main";

/// Errors surfaced by bus operations.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("request not found: {request_id}")]
    RequestNotFound { request_id: String },
}

impl BusError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Validate a raw `--meta` value into compact, ASCII-escaped JSON.
///
/// Empty input becomes `{}`; anything that does not decode to a JSON
/// object is rejected.
pub fn parse_meta(raw: &str) -> Result<String, BusError> {
    if raw.trim().is_empty() {
        return Ok("{}".to_string());
    }
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| BusError::invalid(format!("invalid --meta JSON: {e}")))?;
    if !value.is_object() {
        return Err(BusError::invalid("--meta must decode to a JSON object"));
    }
    Ok(compact_ascii_json(&value))
}

/// Compact serialization with non-ASCII chars escaped as `\uXXXX`.
///
/// Non-ASCII bytes only occur inside string literals, so escaping them in
/// the serialized text is safe.
pub fn compact_ascii_json(value: &serde_json::Value) -> String {
    let compact = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut out = String::with_capacity(compact.len());
    let mut units = [0u16; 2];
    for ch in compact.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// Mark-read target selector.
#[derive(Debug, Clone)]
pub enum MarkReadSelector {
    Ids(Vec<i64>),
    UpTo(i64),
    All,
}

/// Handle over the bus database.
pub struct BusStore {
    conn: Connection,
}

impl BusStore {
    /// Open (creating parents as needed) and migrate the database.
    pub fn open(path: &Path) -> Result<Self, BusError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| BusError::invalid(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, BusError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), BusError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                room TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                meta_json TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS members (
                room TEXT NOT NULL,
                agent TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member',
                status TEXT NOT NULL DEFAULT 'active',
                joined_ts TEXT NOT NULL,
                last_seen_ts TEXT NOT NULL,
                PRIMARY KEY (room, agent)
            );

            CREATE TABLE IF NOT EXISTS mailbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                room TEXT NOT NULL,
                recipient TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'unread',
                created_ts TEXT NOT NULL,
                read_ts TEXT,
                FOREIGN KEY(message_id) REFERENCES messages(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS control_requests (
                request_id TEXT PRIMARY KEY,
                room TEXT NOT NULL,
                req_type TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                body TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                created_ts TEXT NOT NULL,
                updated_ts TEXT NOT NULL,
                response_body TEXT NOT NULL DEFAULT '',
                responder TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_messages_room_id ON messages(room, id);
            CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages(recipient, id);
            CREATE INDEX IF NOT EXISTS idx_members_room_role ON members(room, role, status);
            CREATE INDEX IF NOT EXISTS idx_mailbox_room_recipient_state ON mailbox(room, recipient, state, id);
            CREATE INDEX IF NOT EXISTS idx_control_requests_room_recipient_status ON control_requests(room, recipient, status, created_ts);",
        )?;
        Ok(())
    }

    /// Upsert a member row.
    ///
    /// Default role/status never overwrite explicit values already stored;
    /// non-default values win. `last_seen_ts` always advances.
    pub fn touch_member(
        &self,
        room: &str,
        agent: &str,
        role: &str,
        status: &str,
    ) -> Result<(), BusError> {
        let now = utc_now_iso();
        self.conn.execute(
            "INSERT INTO members(room, agent, role, status, joined_ts, last_seen_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(room, agent)
             DO UPDATE SET
                 role=CASE WHEN excluded.role='member' THEN members.role ELSE excluded.role END,
                 status=CASE WHEN excluded.status='active' THEN members.status ELSE excluded.status END,
                 last_seen_ts=excluded.last_seen_ts",
            params![room, agent, role, status, now],
        )?;
        Ok(())
    }

    /// Register or refresh a member (CLI `register`).
    pub fn register(
        &self,
        room: &str,
        agent: &str,
        role: &str,
        status: &str,
    ) -> Result<(), BusError> {
        self.touch_member(room, agent, role, status)
    }

    fn resolve_recipients(
        &self,
        room: &str,
        sender: &str,
        recipient: &str,
    ) -> Result<Vec<String>, BusError> {
        if recipient != "all" {
            return Ok(vec![recipient.to_string()]);
        }
        let mut stmt = self.conn.prepare(
            "SELECT agent FROM members
             WHERE room=?1 AND status='active' AND agent<>?2
             ORDER BY agent ASC",
        )?;
        let rows = stmt
            .query_map(params![room, sender], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Append one message and its mailbox fan-out atomically.
    ///
    /// Returns `(message_id, fanout_count)`. On any failure nothing is
    /// observable.
    pub fn send(
        &mut self,
        room: &str,
        sender: &str,
        recipient: &str,
        kind: &str,
        body: &str,
        meta_json: &str,
    ) -> Result<(i64, usize), BusError> {
        let tx = self.conn.transaction()?;
        let result = Self::send_in_tx(&tx, room, sender, recipient, kind, body, meta_json)?;
        tx.commit()?;
        Ok(result)
    }

    fn send_in_tx(
        tx: &rusqlite::Transaction<'_>,
        room: &str,
        sender: &str,
        recipient: &str,
        kind: &str,
        body: &str,
        meta_json: &str,
    ) -> Result<(i64, usize), BusError> {
        let now = utc_now_iso();
        let touch = |agent: &str| -> Result<(), rusqlite::Error> {
            tx.execute(
                "INSERT INTO members(room, agent, role, status, joined_ts, last_seen_ts)
                 VALUES (?1, ?2, 'member', 'active', ?3, ?3)
                 ON CONFLICT(room, agent)
                 DO UPDATE SET last_seen_ts=excluded.last_seen_ts",
                params![room, agent, now],
            )
            .map(|_| ())
        };
        touch(sender)?;
        if recipient != "all" {
            touch(recipient)?;
        }

        tx.execute(
            "INSERT INTO messages (ts, room, sender, recipient, kind, body, meta_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![now, room, sender, recipient, kind, body, meta_json],
        )?;
        let message_id = tx.last_insert_rowid();

        let recipients: Vec<String> = if recipient != "all" {
            vec![recipient.to_string()]
        } else {
            let mut stmt = tx.prepare(
                "SELECT agent FROM members
                 WHERE room=?1 AND status='active' AND agent<>?2
                 ORDER BY agent ASC",
            )?;
            stmt.query_map(params![room, sender], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        for rcpt in &recipients {
            tx.execute(
                "INSERT INTO mailbox(message_id, room, recipient, state, created_ts, read_ts)
                 VALUES (?1, ?2, ?3, 'unread', ?4, NULL)",
                params![message_id, room, rcpt, now],
            )?;
        }
        Ok((message_id, recipients.len()))
    }

    /// Messages strictly after `since_id`, id ascending, capped at `limit`.
    ///
    /// Without `include_all`, restricted to rows addressed to everyone, to
    /// the viewer, or sent by the viewer.
    pub fn fetch_messages(
        &self,
        room: &str,
        since_id: i64,
        viewer: &str,
        include_all: bool,
        limit: usize,
    ) -> Result<Vec<Message>, BusError> {
        let sql = if include_all {
            "SELECT id, ts, room, sender, recipient, kind, body, meta_json
             FROM messages WHERE room=?1 AND id>?2
             ORDER BY id ASC LIMIT ?3"
        } else {
            "SELECT id, ts, room, sender, recipient, kind, body, meta_json
             FROM messages WHERE room=?1 AND id>?2
               AND (recipient='all' OR recipient=?4 OR sender=?4)
             ORDER BY id ASC LIMIT ?3"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(Message {
                id: row.get(0)?,
                ts: row.get(1)?,
                room: row.get(2)?,
                sender: row.get(3)?,
                recipient: row.get(4)?,
                kind: row.get(5)?,
                body: row.get(6)?,
                meta_json: row.get(7)?,
            })
        };
        let rows = if include_all {
            stmt.query_map(params![room, since_id, limit as i64], map_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![room, since_id, limit as i64, viewer], map_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Mailbox rows for `agent` joined with their messages, mailbox id
    /// ascending, capped at `limit`.
    pub fn fetch_inbox(
        &self,
        room: &str,
        agent: &str,
        unread_only: bool,
        since_mailbox_id: i64,
        limit: usize,
    ) -> Result<Vec<MailItem>, BusError> {
        let sql = format!(
            "SELECT mb.id, mb.state, mb.created_ts, mb.read_ts,
                    m.id, m.ts, m.kind, m.sender, m.recipient, m.body, m.meta_json
             FROM mailbox mb
             JOIN messages m ON m.id=mb.message_id
             WHERE mb.room=?1 AND mb.recipient=?2 AND mb.id>?3{}
             ORDER BY mb.id ASC
             LIMIT ?4",
            if unread_only { " AND mb.state='unread'" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![room, agent, since_mailbox_id, limit as i64],
                |row| {
                    Ok(MailItem {
                        mailbox_id: row.get(0)?,
                        state: row.get(1)?,
                        created_ts: row.get(2)?,
                        read_ts: row.get(3)?,
                        message_id: row.get(4)?,
                        ts: row.get(5)?,
                        kind: row.get(6)?,
                        sender: row.get(7)?,
                        recipient: row.get(8)?,
                        body: row.get(9)?,
                        meta_json: row.get(10)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Transition `unread → read` rows for `agent`. Returns rows updated;
    /// already-read rows never revert and count zero.
    pub fn mark_read(
        &self,
        room: &str,
        agent: &str,
        selector: &MarkReadSelector,
    ) -> Result<usize, BusError> {
        let now = utc_now_iso();
        let updated = match selector {
            MarkReadSelector::Ids(ids) => {
                if ids.is_empty() {
                    return Ok(0);
                }
                if ids.iter().any(|id| *id <= 0) {
                    return Err(BusError::invalid("invalid mailbox id"));
                }
                let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "UPDATE mailbox SET state='read', read_ts=?1
                     WHERE room=?2 AND recipient=?3 AND state='unread' AND id IN ({placeholders})"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![
                    Box::new(now.clone()),
                    Box::new(room.to_string()),
                    Box::new(agent.to_string()),
                ];
                for id in ids {
                    bound.push(Box::new(*id));
                }
                stmt.execute(rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())))?
            }
            MarkReadSelector::UpTo(up_to) => self.conn.execute(
                "UPDATE mailbox SET state='read', read_ts=?1
                 WHERE room=?2 AND recipient=?3 AND state='unread' AND id<=?4",
                params![now, room, agent, up_to],
            )?,
            MarkReadSelector::All => self.conn.execute(
                "UPDATE mailbox SET state='read', read_ts=?1
                 WHERE room=?2 AND recipient=?3 AND state='unread'",
                params![now, room, agent],
            )?,
        };
        Ok(updated)
    }

    /// Opaque per-recipient mention token.
    ///
    /// Changes whenever a new mail item is inserted for `agent`; consumers
    /// must treat any change as "re-scan" and nothing more. The max
    /// mailbox id strictly grows on insert and occupies the high bits, so
    /// an insert can never reproduce the previous token.
    pub fn mention_token(&self, room: &str, agent: &str) -> Result<i64, BusError> {
        let (max_id, unread): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0),
                    COALESCE(SUM(CASE WHEN state='unread' THEN 1 ELSE 0 END), 0)
             FROM mailbox WHERE room=?1 AND recipient=?2",
            params![room, agent],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((max_id << 20) ^ unread)
    }

    /// Create a pending control request plus its `<type>_request` message
    /// in one transaction. Returns the request id.
    pub fn create_control_request(
        &mut self,
        room: &str,
        req_type: &str,
        sender: &str,
        recipient: &str,
        body: &str,
        summary: &str,
        request_id: &str,
    ) -> Result<String, BusError> {
        let rid = if request_id.trim().is_empty() {
            Uuid::new_v4().simple().to_string()[..12].to_string()
        } else {
            request_id.trim().to_string()
        };

        let tx = self.conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM control_requests WHERE request_id=?1",
                params![rid],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(BusError::conflict(format!("request already exists: {rid}")));
        }

        let now = utc_now_iso();
        tx.execute(
            "INSERT INTO control_requests(request_id, room, req_type, sender, recipient, body,
                                          summary, status, created_ts, updated_ts, response_body, responder)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8, '', '')",
            params![rid, room, req_type, sender, recipient, body, summary, now],
        )?;

        let meta = compact_ascii_json(&serde_json::json!({
            "request_id": rid,
            "req_type": req_type,
            "summary": summary,
            "state": "pending",
        }));
        Self::send_in_tx(
            &tx,
            room,
            sender,
            recipient,
            &format!("{req_type}_request"),
            body,
            &meta,
        )?;
        tx.commit()?;
        Ok(rid)
    }

    /// Look up one control request.
    pub fn get_control_request(
        &self,
        request_id: &str,
    ) -> Result<Option<ControlRequestRow>, BusError> {
        let row = self
            .conn
            .query_row(
                "SELECT request_id, room, req_type, sender, recipient, body, summary,
                        status, created_ts, updated_ts, response_body, responder
                 FROM control_requests WHERE request_id=?1",
                params![request_id],
                map_control_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Resolve a pending request and emit its `<type>_response` message in
    /// one transaction.
    pub fn respond_control_request(
        &mut self,
        request_id: &str,
        responder: &str,
        approve: bool,
        response_body: &str,
    ) -> Result<ControlRequestRow, BusError> {
        let tx = self.conn.transaction()?;
        let req = tx
            .query_row(
                "SELECT request_id, room, req_type, sender, recipient, body, summary,
                        status, created_ts, updated_ts, response_body, responder
                 FROM control_requests WHERE request_id=?1",
                params![request_id],
                map_control_row,
            )
            .optional()?
            .ok_or_else(|| BusError::RequestNotFound {
                request_id: request_id.to_string(),
            })?;
        if req.status != "pending" {
            return Err(BusError::conflict(format!(
                "request already resolved: {request_id} status={}",
                req.status
            )));
        }

        let status = if approve { "approved" } else { "rejected" };
        let now = utc_now_iso();
        tx.execute(
            "UPDATE control_requests
             SET status=?1, updated_ts=?2, response_body=?3, responder=?4
             WHERE request_id=?5",
            params![status, now, response_body, responder, request_id],
        )?;

        let body = if response_body.is_empty() {
            status.to_string()
        } else {
            response_body.to_string()
        };
        let meta = compact_ascii_json(&serde_json::json!({
            "request_id": request_id,
            "req_type": req.req_type,
            "approve": approve,
            "state": status,
        }));
        Self::send_in_tx(
            &tx,
            &req.room,
            responder,
            &req.sender,
            &format!("{}_response", req.req_type),
            &body,
            &meta,
        )?;
        tx.commit()?;

        self.get_control_request(request_id)?
            .ok_or_else(|| BusError::RequestNotFound {
                request_id: request_id.to_string(),
            })
    }

    /// Requests addressed to `recipient`, created_ts ascending.
    pub fn list_control_requests(
        &self,
        room: &str,
        recipient: &str,
        include_resolved: bool,
        limit: usize,
    ) -> Result<Vec<ControlRequestRow>, BusError> {
        let sql = format!(
            "SELECT request_id, room, req_type, sender, recipient, body, summary,
                    status, created_ts, updated_ts, response_body, responder
             FROM control_requests
             WHERE room=?1 AND recipient=?2{}
             ORDER BY created_ts ASC
             LIMIT ?3",
            if include_resolved { "" } else { " AND status='pending'" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![room, recipient, limit as i64], map_control_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Room roster with unread counts, agent ascending.
    pub fn members(&self, room: &str) -> Result<Vec<MemberRow>, BusError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.room, m.agent, m.role, m.status, m.joined_ts, m.last_seen_ts,
                    COALESCE((SELECT COUNT(*) FROM mailbox mb
                              WHERE mb.room=m.room AND mb.recipient=m.agent
                                AND mb.state='unread'), 0)
             FROM members m WHERE m.room=?1 ORDER BY m.agent ASC",
        )?;
        let rows = stmt
            .query_map(params![room], |row| {
                Ok(MemberRow {
                    room: row.get(0)?,
                    agent: row.get(1)?,
                    role: row.get(2)?,
                    status: row.get(3)?,
                    joined_ts: row.get(4)?,
                    last_seen_ts: row.get(5)?,
                    unread: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Aggregate room statistics for `status` output.
    pub fn status_summary(&self, room: &str) -> Result<RoomStatus, BusError> {
        let (total, last_id): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(MAX(id), 0) FROM messages WHERE room=?1",
            params![room],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let count_pairs = |sql: &str| -> Result<Vec<(String, i64)>, BusError> {
            let mut stmt = self.conn.prepare(sql)?;
            let rows = stmt
                .query_map(params![room], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        };

        Ok(RoomStatus {
            room: room.to_string(),
            total_messages: total,
            last_id,
            per_recipient: count_pairs(
                "SELECT recipient, COUNT(*) FROM messages WHERE room=?1
                 GROUP BY recipient ORDER BY COUNT(*) DESC, recipient ASC",
            )?,
            unread: count_pairs(
                "SELECT recipient, COUNT(*) FROM mailbox WHERE room=?1 AND state='unread'
                 GROUP BY recipient ORDER BY COUNT(*) DESC, recipient ASC",
            )?,
            members: self.members(room)?,
            pending_requests: count_pairs(
                "SELECT recipient, COUNT(*) FROM control_requests
                 WHERE room=?1 AND status='pending'
                 GROUP BY recipient ORDER BY COUNT(*) DESC, recipient ASC",
            )?,
        })
    }
}

fn map_control_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ControlRequestRow> {
    Ok(ControlRequestRow {
        request_id: row.get(0)?,
        room: row.get(1)?,
        req_type: row.get(2)?,
        sender: row.get(3)?,
        recipient: row.get(4)?,
        body: row.get(5)?,
        summary: row.get(6)?,
        status: row.get(7)?,
        created_ts: row.get(8)?,
        updated_ts: row.get(9)?,
        response_body: row.get(10)?,
        responder: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_members(members: &[&str]) -> BusStore {
        let store = BusStore::open_in_memory().unwrap();
        for agent in members {
            store.register("main", agent, "member", "active").unwrap();
        }
        store
    }

    #[test]
    fn test_broadcast_fanout_excludes_sender_in_name_order() {
        let mut store = store_with_members(&["lead", "worker-2", "worker-1"]);

        let (msg_id, fanout) = store
            .send("main", "lead", "all", "task", "hello", "{}")
            .unwrap();
        assert!(msg_id > 0);
        assert_eq!(fanout, 2);

        let w1 = store.fetch_inbox("main", "worker-1", true, 0, 100).unwrap();
        assert_eq!(w1.len(), 1);
        assert_eq!(w1[0].body, "hello");

        let w2 = store.fetch_inbox("main", "worker-2", true, 0, 100).unwrap();
        assert_eq!(w2.len(), 1);
        // Stable fan-out order: ascending member name gets the lower
        // mailbox id.
        assert!(w1[0].mailbox_id < w2[0].mailbox_id);

        assert!(store.fetch_inbox("main", "lead", true, 0, 100).unwrap().is_empty());
    }

    #[test]
    fn test_targeted_send_single_mail_item() {
        let mut store = store_with_members(&["lead", "worker-1", "worker-2"]);
        let (_, fanout) = store
            .send("main", "lead", "worker-1", "task", "just you", "{}")
            .unwrap();
        assert_eq!(fanout, 1);
        assert!(store.fetch_inbox("main", "worker-2", true, 0, 100).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_messages_order_and_presence() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        let mut ids = Vec::new();
        for i in 0..5 {
            let (id, _) = store
                .send("main", "lead", "worker-1", "note", &format!("m{i}"), "{}")
                .unwrap();
            ids.push(id);
        }

        // Each message appears exactly once, id ascending, strictly after
        // since_id.
        for &id in &ids {
            let rows = store.fetch_messages("main", id - 1, "", true, 10).unwrap();
            assert_eq!(rows.iter().filter(|m| m.id == id).count(), 1);
            assert_eq!(rows[0].id, id);
        }
        let all = store.fetch_messages("main", 0, "", true, 100).unwrap();
        let fetched: Vec<i64> = all.iter().map(|m| m.id).collect();
        assert_eq!(fetched, ids);
    }

    #[test]
    fn test_fetch_messages_visibility_filter() {
        let mut store = store_with_members(&["lead", "worker-1", "worker-2"]);
        store.send("main", "lead", "worker-1", "note", "private", "{}").unwrap();
        store.send("main", "worker-2", "all", "status", "public", "{}").unwrap();
        store.send("main", "worker-1", "lead", "answer", "mine", "{}").unwrap();

        let visible = store.fetch_messages("main", 0, "worker-1", false, 100).unwrap();
        let bodies: Vec<&str> = visible.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["private", "public", "mine"]);

        let for_lead = store.fetch_messages("main", 0, "lead", false, 100).unwrap();
        let bodies: Vec<&str> = for_lead.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["private", "public", "mine"]);

        let for_w2 = store.fetch_messages("main", 0, "worker-2", false, 100).unwrap();
        let bodies: Vec<&str> = for_w2.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["public"]);
    }

    #[test]
    fn test_mark_read_idempotent() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        store.send("main", "lead", "worker-1", "task", "a", "{}").unwrap();
        store.send("main", "lead", "worker-1", "task", "b", "{}").unwrap();

        let items = store.fetch_inbox("main", "worker-1", true, 0, 100).unwrap();
        let ids: Vec<i64> = items.iter().map(|i| i.mailbox_id).collect();

        let first = store
            .mark_read("main", "worker-1", &MarkReadSelector::Ids(ids.clone()))
            .unwrap();
        assert_eq!(first, 2);
        let second = store
            .mark_read("main", "worker-1", &MarkReadSelector::Ids(ids))
            .unwrap();
        assert_eq!(second, 0);

        let after = store.fetch_inbox("main", "worker-1", false, 0, 100).unwrap();
        assert!(after.iter().all(|i| i.state == "read" && i.read_ts.is_some()));
    }

    #[test]
    fn test_mark_read_up_to_and_all() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        for i in 0..3 {
            store.send("main", "lead", "worker-1", "task", &format!("m{i}"), "{}").unwrap();
        }
        let items = store.fetch_inbox("main", "worker-1", true, 0, 100).unwrap();
        let mid = items[1].mailbox_id;

        let updated = store
            .mark_read("main", "worker-1", &MarkReadSelector::UpTo(mid))
            .unwrap();
        assert_eq!(updated, 2);

        let updated = store.mark_read("main", "worker-1", &MarkReadSelector::All).unwrap();
        assert_eq!(updated, 1);
    }

    #[test]
    fn test_mention_token_changes_on_new_mail() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        let t0 = store.mention_token("main", "worker-1").unwrap();
        store.send("main", "lead", "worker-1", "task", "a", "{}").unwrap();
        let t1 = store.mention_token("main", "worker-1").unwrap();
        assert_ne!(t0, t1);

        store.send("main", "lead", "worker-1", "task", "b", "{}").unwrap();
        let t2 = store.mention_token("main", "worker-1").unwrap();
        assert_ne!(t1, t2);

        // Other recipients' mail leaves this token alone.
        store.send("main", "worker-1", "lead", "status", "c", "{}").unwrap();
        assert_eq!(store.mention_token("main", "worker-1").unwrap(), t2);
    }

    #[test]
    fn test_member_upsert_default_loses() {
        let store = store_with_members(&[]);
        store.register("main", "lead", "lead", "active").unwrap();
        // Default role must not clobber the explicit one.
        store.register("main", "lead", "member", "active").unwrap();
        let members = store.members("main").unwrap();
        assert_eq!(members[0].role, "lead");

        // Non-default overwrites.
        store.register("main", "lead", "utility", "inactive").unwrap();
        let members = store.members("main").unwrap();
        assert_eq!(members[0].role, "utility");
        assert_eq!(members[0].status, "inactive");
    }

    #[test]
    fn test_inactive_members_excluded_from_fanout() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        store.register("main", "worker-2", "member", "inactive").unwrap();

        let (_, fanout) = store.send("main", "lead", "all", "task", "x", "{}").unwrap();
        assert_eq!(fanout, 1);
    }

    #[test]
    fn test_control_request_lifecycle() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        let rid = store
            .create_control_request("main", "shutdown", "lead", "worker-1", "stop", "", "req-a1b2")
            .unwrap();
        assert_eq!(rid, "req-a1b2");

        // Request row pending, request message in worker-1's mailbox.
        let req = store.get_control_request("req-a1b2").unwrap().unwrap();
        assert_eq!(req.status, "pending");
        let inbox = store.fetch_inbox("main", "worker-1", true, 0, 100).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, "shutdown_request");

        let resolved = store
            .respond_control_request("req-a1b2", "worker-1", true, "ok")
            .unwrap();
        assert_eq!(resolved.status, "approved");
        assert_eq!(resolved.responder, "worker-1");

        // Exactly one shutdown_response lands at the original sender with
        // the approved state in meta.
        let lead_inbox = store.fetch_inbox("main", "lead", true, 0, 100).unwrap();
        assert_eq!(lead_inbox.len(), 1);
        assert_eq!(lead_inbox[0].kind, "shutdown_response");
        let meta: serde_json::Value = serde_json::from_str(&lead_inbox[0].meta_json).unwrap();
        assert_eq!(meta["state"], "approved");
        assert_eq!(meta["request_id"], "req-a1b2");
    }

    #[test]
    fn test_control_respond_non_pending_fails() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        store
            .create_control_request("main", "shutdown", "lead", "worker-1", "stop", "", "req-1")
            .unwrap();
        store.respond_control_request("req-1", "worker-1", false, "").unwrap();

        let err = store
            .respond_control_request("req-1", "worker-1", true, "")
            .unwrap_err();
        assert!(matches!(err, BusError::Conflict { .. }));
        assert_eq!(store.get_control_request("req-1").unwrap().unwrap().status, "rejected");
    }

    #[test]
    fn test_control_duplicate_id_leaves_no_trace() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        store
            .create_control_request("main", "shutdown", "lead", "worker-1", "stop", "", "req-1")
            .unwrap();
        let err = store
            .create_control_request("main", "shutdown", "lead", "worker-1", "again", "", "req-1")
            .unwrap_err();
        assert!(matches!(err, BusError::Conflict { .. }));
        // The rolled-back transaction emitted no second request message.
        let inbox = store.fetch_inbox("main", "worker-1", true, 0, 100).unwrap();
        assert_eq!(inbox.len(), 1);
    }

    #[test]
    fn test_control_unknown_request_fails() {
        let mut store = store_with_members(&["lead"]);
        let err = store
            .respond_control_request("ghost", "lead", true, "")
            .unwrap_err();
        assert!(matches!(err, BusError::RequestNotFound { .. }));
    }

    #[test]
    fn test_list_control_requests_order() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        store
            .create_control_request("main", "shutdown", "lead", "worker-1", "a", "", "req-1")
            .unwrap();
        store
            .create_control_request("main", "permission", "lead", "worker-1", "b", "", "req-2")
            .unwrap();
        store.respond_control_request("req-1", "worker-1", true, "").unwrap();

        let pending = store.list_control_requests("main", "worker-1", false, 100).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_id, "req-2");

        let all = store.list_control_requests("main", "worker-1", true, 100).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_parse_meta_validation() {
        assert_eq!(parse_meta("").unwrap(), "{}");
        assert_eq!(parse_meta("{\"a\": 1}").unwrap(), "{\"a\":1}");
        assert!(parse_meta("[1, 2]").is_err());
        assert!(parse_meta("{broken").is_err());
    }

    #[test]
    fn test_compact_ascii_json_escapes_non_ascii() {
        let value = serde_json::json!({"note": "héllo"});
        let out = compact_ascii_json(&value);
        assert!(out.is_ascii());
        assert!(out.contains("\\u00e9"));
        let back: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(back["note"], "héllo");
    }

    #[test]
    fn test_status_summary_counts() {
        let mut store = store_with_members(&["lead", "worker-1"]);
        store.send("main", "lead", "worker-1", "task", "a", "{}").unwrap();
        store.send("main", "lead", "all", "status", "b", "{}").unwrap();
        store
            .create_control_request("main", "permission", "worker-1", "lead", "x", "", "req-1")
            .unwrap();

        let status = store.status_summary("main").unwrap();
        assert_eq!(status.total_messages, 3);
        assert!(status.last_id >= 3);
        assert_eq!(status.members.len(), 2);
        assert_eq!(status.pending_requests, vec![("lead".to_string(), 1)]);
    }
}
