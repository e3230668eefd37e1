//! File mailbox operations
//!
//! One JSON file per recipient under `<session>/inboxes/`. Writers hold an
//! exclusive lock for the whole read-modify-write, and the file is replaced
//! atomically, so concurrent senders and readers never see torn state.
//!
//! A message's mailbox id is its array index: the file is append-only, so
//! indexes are monotone per recipient.

use crate::io::{StoreError, read_json, write_json};
use crate::paths::SessionPaths;
use crate::schema::{InboxFile, MailboxMessage};
use crate::time::utc_now_iso_ms;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

/// Total budget a writer spends waiting on a contended inbox before the
/// operation fails with [`StoreError::LockTimeout`].
const LOCK_WAIT: Duration = Duration::from_millis(1500);

/// Poll cadence while another writer holds the lock.
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Exclusive hold on one recipient's `<agent>.lock` sidecar file for the
/// duration of a read-modify-write. Inbox mutations are short (parse,
/// mutate, rewrite), so contention is resolved by polling until
/// [`LOCK_WAIT`] runs out rather than backing off.
struct InboxGuard {
    lock_file: File,
}

impl InboxGuard {
    fn acquire(inbox_path: &Path) -> Result<Self, StoreError> {
        let lock_path = inbox_path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::Io {
                path: lock_path.clone(),
                source: e,
            })?;

        let started = Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { lock_file }),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if started.elapsed() >= LOCK_WAIT {
                        return Err(StoreError::LockTimeout {
                            path: lock_path,
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(StoreError::Io {
                        path: lock_path,
                        source: e,
                    });
                }
            }
        }
    }
}

impl Drop for InboxGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

/// Create an empty inbox file for `agent` if none exists.
pub fn ensure_inbox(paths: &SessionPaths, agent: &str) -> Result<(), StoreError> {
    let path = paths.inbox(agent);
    if !path.exists() {
        write_json(&path, &InboxFile::empty(agent))?;
    }
    Ok(())
}

/// Read all messages in `agent`'s inbox (empty when the file is absent).
pub fn read_mailbox(paths: &SessionPaths, agent: &str) -> Result<Vec<MailboxMessage>, StoreError> {
    let inbox: InboxFile = read_json(&paths.inbox(agent), || InboxFile::empty(agent))?;
    Ok(inbox.messages)
}

/// Append a message to `agent`'s inbox, returning its mailbox index.
///
/// Fills in `timestamp` (ms precision) when empty and forces `read: false`.
pub fn write_mailbox(
    paths: &SessionPaths,
    agent: &str,
    mut message: MailboxMessage,
) -> Result<usize, StoreError> {
    if message.timestamp.is_empty() {
        message.timestamp = utc_now_iso_ms();
    }
    message.read = false;

    let mut index = 0;
    update_mailbox(paths, agent, |messages| {
        messages.push(message);
        index = messages.len() - 1;
    })?;
    Ok(index)
}

/// Locked read-modify-write over `agent`'s inbox.
pub fn update_mailbox<F>(paths: &SessionPaths, agent: &str, update_fn: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut Vec<MailboxMessage>),
{
    let inbox_path = paths.inbox(agent);
    if let Some(parent) = inbox_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let _guard = InboxGuard::acquire(&inbox_path)?;

    let mut inbox: InboxFile = read_json(&inbox_path, || InboxFile::empty(agent))?;
    update_fn(&mut inbox.messages);
    write_json(&inbox_path, &inbox)
}

/// Unread messages with their mailbox indexes, ascending.
pub fn unread_indexed(
    paths: &SessionPaths,
    agent: &str,
) -> Result<Vec<(usize, MailboxMessage)>, StoreError> {
    read_indexed(paths, agent, true, 0, usize::MAX)
}

/// Indexed read over `agent`'s inbox.
///
/// Returns up to `limit` messages whose index is `>= start_index`, in
/// ascending index order, optionally restricted to unread rows. Never
/// mutates read state.
pub fn read_indexed(
    paths: &SessionPaths,
    agent: &str,
    unread_only: bool,
    start_index: usize,
    limit: usize,
) -> Result<Vec<(usize, MailboxMessage)>, StoreError> {
    let messages = read_mailbox(paths, agent)?;
    Ok(messages
        .into_iter()
        .enumerate()
        .skip(start_index)
        .filter(|(_, msg)| !unread_only || !msg.read)
        .take(limit)
        .collect())
}

/// Mark messages read by index (or all). Returns the number of rows that
/// actually transitioned; already-read rows are left untouched.
pub fn mark_read(
    paths: &SessionPaths,
    agent: &str,
    indexes: &[usize],
    mark_all: bool,
) -> Result<usize, StoreError> {
    let mut changed = 0;
    update_mailbox(paths, agent, |messages| {
        for (idx, msg) in messages.iter_mut().enumerate() {
            if (mark_all || indexes.contains(&idx)) && !msg.read {
                msg.read = true;
                changed += 1;
            }
        }
    })?;
    Ok(changed)
}

/// Opaque per-recipient mention token.
///
/// Changes whenever a new mail item lands for `agent` (appends grow the
/// message count); consumers must treat any change as "re-scan" and read
/// nothing else into the value.
pub fn signal_token(paths: &SessionPaths, agent: &str) -> u64 {
    signal_token_at(&paths.inbox(agent))
}

fn signal_token_at(inbox_path: &Path) -> u64 {
    let inbox: InboxFile = match read_json(inbox_path, || InboxFile::empty("")) {
        Ok(inbox) => inbox,
        Err(_) => return 0,
    };
    let total = inbox.messages.len() as u64;
    let unread = inbox.messages.iter().filter(|m| !m.read).count() as u64;
    // The message count strictly grows on insert and occupies the high
    // bits, so the token cannot collide with its previous value.
    (total << 32) ^ unread
}
