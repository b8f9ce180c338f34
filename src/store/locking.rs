//! Advisory locking for the state store.
//!
//! A sidecar lock file carries an `fs2` lock: shared for readers, exclusive for
//! writers. Acquisition never blocks indefinitely; it polls `try_lock_*` until a
//! deadline and then reports the store as busy.
//!
//! Advisory locks are cooperative - every process touching the store must go
//! through [`StoreLock`] for the locking to be effective.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use super::error::StoreError;

/// Delay between lock attempts while the lock is contended.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// A held lock. Released when dropped.
#[derive(Debug)]
pub(crate) struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Acquire the lock at `path`, retrying while contended for at most `timeout`.
    pub(crate) fn acquire(
        path: &Path,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        let deadline = Instant::now() + timeout;
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Busy {
                            path: PathBuf::from(path),
                            waited: timeout,
                        });
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
