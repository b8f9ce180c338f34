//! Process utilities for keeper
//!
//! Liveness checks and graceful-then-forced termination, both for children the
//! supervisor spawned itself (owned [`Child`] handles) and for processes it only
//! knows by PID (records adopted after a supervisor restart).

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Interval between liveness polls while waiting for a PID to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process was already gone before any signal was sent
    AlreadyExited,
    /// The process exited after SIGTERM within the timeout
    Graceful,
    /// The process ignored SIGTERM and was killed
    Killed,
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Check if a process with the given PID is alive
///
/// Uses the null signal, so `EPERM` (exists but not ours) counts as alive and
/// `ESRCH` as gone. PIDs that do not fit in an `i32` are treated as gone.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(pid_i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => false,
    }
}

/// Send a signal to a process by PID.
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let target = to_pid(pid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;
    kill(target, signal).map_err(io::Error::from)
}

/// Terminate a process known only by PID.
///
/// Sends SIGTERM, polls for exit up to `timeout`, then sends SIGKILL.
pub fn terminate_pid(pid: u32, timeout: Duration) -> StopOutcome {
    if !is_process_alive(pid) {
        return StopOutcome::AlreadyExited;
    }

    if let Err(e) = send_signal(pid, Signal::SIGTERM) {
        if e.raw_os_error() == Some(libc::ESRCH) {
            return StopOutcome::AlreadyExited;
        }
        tracing::warn!(pid, error = %e, "SIGTERM failed");
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return StopOutcome::Graceful;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }

    // Already gone between the last poll and now
    let _ = send_signal(pid, Signal::SIGKILL);
    StopOutcome::Killed
}

/// Terminate an owned child process and reap it.
///
/// Sends SIGTERM, waits up to `timeout` for the child to exit, then kills it.
/// The child is always reaped so no zombie is left behind.
pub fn stop_child(child: &mut Child, timeout: Duration) -> io::Result<StopOutcome> {
    if child.try_wait()?.is_some() {
        return Ok(StopOutcome::AlreadyExited);
    }

    if let Err(e) = send_signal(child.id(), Signal::SIGTERM) {
        tracing::warn!(pid = child.id(), error = %e, "SIGTERM failed");
    }

    if child.wait_timeout(timeout)?.is_some() {
        return Ok(StopOutcome::Graceful);
    }

    // Attempt to kill - ignore errors since the process may have just exited
    let _ = child.kill();
    child.wait()?;
    Ok(StopOutcome::Killed)
}
