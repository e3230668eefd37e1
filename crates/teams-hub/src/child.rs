//! Child process handling for external agent runs
//!
//! stdout and stderr share one pipe so output stays interleaved the way
//! the agent produced it. The supervisor drains that pipe non-blockingly
//! with per-tick byte/chunk caps and retains at most
//! [`MAX_CAPTURE_BYTES`](crate::caps::MAX_CAPTURE_BYTES); overflow sets a
//! truncation flag instead of growing the buffer.

use crate::caps::{
    CHILD_GRACE_SECS, MAX_CAPTURE_BYTES, MAX_DRAIN_BYTES_PER_TICK, MAX_DRAIN_CHUNKS_PER_TICK,
};
use std::fs::File;
use std::io::{self, Read};
use std::process::{Child, Command};
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd};

/// A spawned agent run with its combined-output pipe.
pub struct AgentChild {
    child: Child,
    reader: Option<File>,
    capture: Vec<u8>,
    truncated: bool,
    eof: bool,
}

/// Final outcome of one agent run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub output: String,
    pub truncated: bool,
}

#[cfg(unix)]
fn make_pipe() -> io::Result<(File, File)> {
    let mut fds = [0; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // Safety: both fds are fresh and owned here.
    let (read, write) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    Ok((read, write))
}

#[cfg(unix)]
fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl AgentChild {
    /// Spawn `cmd` with stdout and stderr merged into one non-blocking
    /// pipe.
    #[cfg(unix)]
    pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
        let (reader, writer) = make_pipe()?;
        let writer_clone = writer.try_clone()?;
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(writer);
        cmd.stderr(writer_clone);
        let child = cmd.spawn()?;
        // The Stdio handles were moved into the child; our read end is the
        // only parent-side fd left, so EOF arrives when the child exits.
        set_nonblocking(&reader)?;
        Ok(Self {
            child,
            reader: Some(reader),
            capture: Vec::new(),
            truncated: false,
            eof: false,
        })
    }

    #[cfg(not(unix))]
    pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::null());
        let child = cmd.spawn()?;
        Ok(Self {
            child,
            reader: None,
            capture: Vec::new(),
            truncated: false,
            eof: true,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn push_capture(&mut self, chunk: &[u8]) {
        if self.capture.len() >= MAX_CAPTURE_BYTES {
            self.truncated = true;
            return;
        }
        let room = MAX_CAPTURE_BYTES - self.capture.len();
        if chunk.len() > room {
            self.capture.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        } else {
            self.capture.extend_from_slice(chunk);
        }
    }

    /// Drain the pipe non-blockingly, bounded by the per-tick caps.
    /// Returns the number of bytes consumed this tick.
    pub fn drain_tick(&mut self) -> usize {
        if self.eof {
            return 0;
        }
        let Some(mut reader) = self.reader.take() else {
            return 0;
        };
        let mut consumed = 0;
        let mut buf = [0u8; 8192];
        for _ in 0..MAX_DRAIN_CHUNKS_PER_TICK {
            if consumed >= MAX_DRAIN_BYTES_PER_TICK {
                break;
            }
            let want = buf.len().min(MAX_DRAIN_BYTES_PER_TICK - consumed);
            match reader.read(&mut buf[..want]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => {
                    consumed += n;
                    self.push_capture(&buf[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.eof = true;
                    break;
                }
            }
        }
        self.reader = Some(reader);
        consumed
    }

    /// Non-blocking exit check.
    pub fn poll_exit(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(exit_code_of(status)),
            Ok(None) => None,
            Err(_) => Some(-1),
        }
    }

    /// Drain everything left in the pipe after exit and return the run
    /// outcome.
    pub fn finish(mut self, exit_code: i32) -> RunOutcome {
        self.drain_remaining();
        RunOutcome {
            exit_code,
            output: String::from_utf8_lossy(&self.capture).to_string(),
            truncated: self.truncated,
        }
    }

    fn drain_remaining(&mut self) {
        // The child has exited, so every writer fd is closed: reads return
        // buffered data and then EOF. The deadline is a backstop only.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !self.eof && Instant::now() < deadline {
            if self.drain_tick() == 0 && !self.eof {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    /// Wait for natural exit, draining along the way (blocking variant).
    pub fn wait_blocking(mut self) -> RunOutcome {
        loop {
            self.drain_tick();
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    let code = exit_code_of(status);
                    return self.finish(code);
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                Err(_) => return self.finish(-1),
            }
        }
    }

    /// SIGTERM, a grace period, then SIGKILL. Returns the run outcome with
    /// whatever output was captured.
    pub fn terminate(mut self) -> RunOutcome {
        if self.poll_exit().is_none() {
            self.signal(term_signal());
            let deadline = Instant::now() + Duration::from_secs(CHILD_GRACE_SECS);
            loop {
                self.drain_tick();
                if self.poll_exit().is_some() {
                    break;
                }
                if Instant::now() >= deadline {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        let code = self.poll_exit().unwrap_or(-1);
        self.finish(code)
    }

    #[cfg(unix)]
    fn signal(&self, sig: i32) {
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, sig);
        }
    }

    #[cfg(not(unix))]
    fn signal(&mut self, _sig: i32) {
        let _ = self.child.kill();
    }
}

#[cfg(unix)]
fn term_signal() -> i32 {
    libc::SIGTERM
}

#[cfg(not(unix))]
fn term_signal() -> i32 {
    0
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
