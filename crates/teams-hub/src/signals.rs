//! Signal-driven stop flag
//!
//! SIGTERM/SIGINT set a process-global flag the supervisor loops poll at
//! every tick; the handler does nothing else.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static STOP: AtomicBool = AtomicBool::new(false);
static STOP_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Whether a termination signal has been received.
pub fn stop_requested() -> bool {
    STOP.load(Ordering::SeqCst)
}

/// Name of the signal that requested the stop, if any.
pub fn stop_signal_name() -> Option<&'static str> {
    match STOP_SIGNAL.load(Ordering::SeqCst) {
        0 => None,
        #[cfg(unix)]
        s if s == libc::SIGTERM => Some("SIGTERM"),
        #[cfg(unix)]
        s if s == libc::SIGINT => Some("SIGINT"),
        _ => Some("unknown"),
    }
}

/// Request a stop programmatically (used by tests and shutdown handling).
pub fn request_stop() {
    STOP.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
extern "C" fn on_signal(signum: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
    STOP_SIGNAL.store(signum, Ordering::SeqCst);
}

/// Install SIGTERM/SIGINT handlers.
#[cfg(unix)]
pub fn install() {
    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
pub fn install() {}
