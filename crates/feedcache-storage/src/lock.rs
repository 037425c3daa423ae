use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

/// Advisory lock shared by every process writing one cache database.
///
/// Several sync processes may target the same SQLite file; this lock keeps a
/// whole multi-statement write batch (begin, N writes, commit) from
/// interleaving with another process's batch. It does not exclude readers;
/// SQLite's own locking arbitrates those against the active writer.
///
/// The lock is an exclusive `flock` on a sidecar `<database>.lock` file, so
/// it can never collide with SQLite's fcntl locks on the database file
/// itself. `lock()` blocks until the lock is acquired; there is no timeout.
pub struct CrossProcessLock {
    lock_path: PathBuf,
    held: Option<Flock<File>>,
}

impl CrossProcessLock {
    /// Create a lock keyed by the resolved database path. No file is touched
    /// until the first [`lock`](Self::lock) call.
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        let mut lock_path = database_path.as_ref().as_os_str().to_os_string();
        lock_path.push(".lock");
        Self {
            lock_path: PathBuf::from(lock_path),
            held: None,
        }
    }

    /// Block until the exclusive lock is held. Returns `false` when the lock
    /// file cannot be created or the flock call fails; a lock already held
    /// by this handle is reported as success.
    pub fn lock(&mut self) -> bool {
        if self.held.is_some() {
            return true;
        }
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
        {
            Ok(file) => file,
            Err(err) => {
                tracing::error!(path = %self.lock_path.display(), %err, "failed to create lock file");
                return false;
            }
        };
        match Flock::lock(file, FlockArg::LockExclusive) {
            Ok(guard) => {
                self.held = Some(guard);
                true
            }
            Err((_, errno)) => {
                tracing::error!(path = %self.lock_path.display(), %errno, "failed to acquire cross-process lock");
                false
            }
        }
    }

    /// Release the lock if held. Safe to call when not holding it.
    pub fn unlock(&mut self) {
        if let Some(guard) = self.held.take() {
            if let Err((guard, errno)) = guard.unlock() {
                tracing::warn!(path = %self.lock_path.display(), %errno, "failed to release cross-process lock");
                // Closing the descriptor releases the flock regardless.
                drop(guard);
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.held.is_some()
    }

    /// Path of the sidecar lock file.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}
