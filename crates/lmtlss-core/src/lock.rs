//! Advisory file locking for the state directory.
//!
//! Enforces the sole-writer-per-process invariant: exactly one process may
//! hold an open [`ArchiveStore`](crate::archive::ArchiveStore) or
//! [`LatticeStore`](crate::lattice::LatticeStore) against a given state
//! directory at a time, for the duration of a [`crate::circulation::run`]
//! call or a cron tick. The lock file lives at `<state_dir>/.lmtlss.lock`
//! and is never written to; it exists purely to be locked.

use crate::error::LockError;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// RAII guard for the exclusive state-directory lock.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Acquire the exclusive lock at `<state_dir>/.lmtlss.lock`, retrying
    /// until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock is still held by another
    /// process when `timeout` elapses.
    pub fn acquire(state_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        fs::create_dir_all(state_dir).map_err(io_err)?;
        let path = state_dir.join(".lmtlss.lock");

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(io_err)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file, path });
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Also happens automatically on drop.
    pub fn release(self) {
        let _ = FileExt::unlock(&self.file);
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn io_err(err: io::Error) -> LockError {
    LockError::Io {
        reason: err.to_string(),
    }
}
