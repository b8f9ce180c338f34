//! Cooperative control flags driven by OS signals.
//!
//! Handlers never do work themselves. They set a flag that the supervisor
//! checks between sleep ticks, so a signal arriving mid-reconcile is deferred
//! until the pass finishes.
//!
//! | signal | meaning |
//! |---|---|
//! | `SIGUSR1` | rescan now |
//! | `SIGUSR2` | process the restart queue |
//! | `SIGTERM`, `SIGINT`, `SIGHUP` | shut down |

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Signal asking the supervisor to reconcile immediately.
pub const RESCAN_SIGNAL: Signal = Signal::SIGUSR1;

/// Signal asking the supervisor to drain the restart queue.
pub const RESTART_QUEUE_SIGNAL: Signal = Signal::SIGUSR2;

/// Granularity of [`Control::wait`].
const WAIT_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Flags {
    rescan: AtomicBool,
    restart_queue: AtomicBool,
    shutdown: AtomicBool,
}

/// Outcome of the one process-wide handler installation. A failure is kept
/// as its message so later callers see the same error.
static INSTALLED: OnceLock<Result<Arc<Flags>, String>> = OnceLock::new();

extern "C" fn on_signal(signum: libc::c_int) {
    let Some(Ok(flags)) = INSTALLED.get() else {
        return;
    };
    if signum == libc::SIGUSR1 {
        flags.rescan.store(true, Ordering::SeqCst);
    } else if signum == libc::SIGUSR2 {
        flags.restart_queue.store(true, Ordering::SeqCst);
    }
}

/// Pending control requests for one supervisor loop.
#[derive(Debug, Clone, Default)]
pub struct Control {
    flags: Arc<Flags>,
}

impl Control {
    /// Detached flags, not wired to any signal. Used by tests and embedders
    /// that deliver requests in-process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the process-wide signal handlers to a shared set of flags.
    ///
    /// Installation runs at most once per process, even under concurrent
    /// callers. Later calls get the flags (or the error) from that run.
    pub fn install() -> io::Result<Self> {
        match INSTALLED.get_or_init(|| install_handlers().map_err(|e| e.to_string())) {
            Ok(flags) => Ok(Self {
                flags: Arc::clone(flags),
            }),
            Err(msg) => Err(io::Error::other(msg.clone())),
        }
    }

    pub fn request_rescan(&self) {
        self.flags.rescan.store(true, Ordering::SeqCst);
    }

    pub fn request_restart_queue(&self) {
        self.flags.restart_queue.store(true, Ordering::SeqCst);
    }

    pub fn request_shutdown(&self) {
        self.flags.shutdown.store(true, Ordering::SeqCst);
    }

    /// Consume a pending rescan request.
    pub fn take_rescan(&self) -> bool {
        self.flags.rescan.swap(false, Ordering::SeqCst)
    }

    /// Consume a pending restart-queue request.
    pub fn take_restart_queue(&self) -> bool {
        self.flags.restart_queue.swap(false, Ordering::SeqCst)
    }

    /// Shutdown is sticky; it is never consumed.
    pub fn shutdown_requested(&self) -> bool {
        self.flags.shutdown.load(Ordering::SeqCst)
    }

    fn any_pending(&self) -> bool {
        self.shutdown_requested()
            || self.flags.rescan.load(Ordering::SeqCst)
            || self.flags.restart_queue.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, returning early once any request is pending.
    ///
    /// Returns `true` when woken by a request.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.any_pending() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(WAIT_TICK.min(deadline - now));
        }
    }

    /// Sleep for the full `duration` unless shutdown is requested.
    ///
    /// Rescan and restart-queue requests do not shorten the pause. Returns
    /// `false` when cut short by shutdown.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(WAIT_TICK.min(deadline - now));
        }
    }
}

fn install_handlers() -> io::Result<Arc<Flags>> {
    let flags = Arc::new(Flags::default());

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only performs atomic stores.
    unsafe {
        sigaction(RESCAN_SIGNAL, &action).map_err(io::Error::from)?;
        sigaction(RESTART_QUEUE_SIGNAL, &action).map_err(io::Error::from)?;
    }

    let shutdown = Arc::clone(&flags);
    ctrlc::set_handler(move || {
        shutdown.shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(io::Error::other)?;

    Ok(flags)
}
