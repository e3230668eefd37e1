//! Resource caps and loop timing constants

/// Maximum bytes of child output retained per run.
pub const MAX_CAPTURE_BYTES: usize = 200_000;

/// Maximum bytes drained from a child pipe per tick.
pub const MAX_DRAIN_BYTES_PER_TICK: usize = 64_000;

/// Maximum non-blocking reads from a child pipe per tick.
pub const MAX_DRAIN_CHUNKS_PER_TICK: usize = 16;

/// Maximum queued messages composed into one prompt.
pub const MAX_PROMPT_MESSAGES_PER_RUN: usize = 8;

/// Character cap across one prompt's message lines (the first line is
/// always taken so the queue can make progress).
pub const MAX_PROMPT_CHARS_PER_RUN: usize = 12_000;

/// Unread rows pulled per worker mailbox scan.
pub const WORKER_MAILBOX_BATCH: usize = 200;

/// Rows pulled per lead-side aggregation scan.
pub const LEAD_SCAN_BATCH: usize = 500;

/// Result summary cap in characters.
pub const SUMMARY_LIMIT: usize = 220;

/// Sleep when any worker did work this tick.
pub const ACTIVE_LOOP_SLEEP_MS: u64 = 20;

/// Sleep while a child process is still running.
pub const FAST_LOOP_SLEEP_MS: u64 = 50;

/// Upper clamp on the idle sleep.
pub const MAX_LOOP_SLEEP_MS: u64 = 250;

/// Grace period between SIGTERM and SIGKILL for children.
pub const CHILD_GRACE_SECS: u64 = 5;

/// Retry budget for filesystem-store calls.
pub const FS_CMD_RETRIES: u32 = 2;

/// Retry budget for bus-store calls.
pub const BUS_CMD_RETRIES: u32 = 3;

/// Retry backoff base: `RETRY_BASE_MS * attempt` between tries.
pub const RETRY_BASE_MS: u64 = 80;

/// Minimum heartbeat cadence.
pub const HEARTBEAT_MIN_MS: u64 = 500;
