//! # Solution Locks
//!
//! Writers must hold the lock of a solution directory before touching it.
//! A lock has two layers:
//!
//! - an in-process registry of held directories, so threads of one process
//!   never race each other, and
//! - a lock file (`.depot.lck`) created exclusively inside the directory, so
//!   separate processes sharing one local repository exclude each other too.
//!
//! Acquisition never blocks. Whoever finds the lock taken skips the work; the
//! holder is doing it already. Lock files left behind by a crashed process
//! are broken once they are older than the configured staleness.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[cfg(test)]
mod test;

/// Name of the lock file inside a locked directory.
pub const LOCK_FILE: &str = ".depot.lck";

//================================================================================================
// Types
//================================================================================================

/// Registry of solution directories locked by this process.
#[derive(Debug)]
pub struct SolutionLocks {
    held: Mutex<HashSet<PathBuf>>,
    stale_after: Duration,
}

/// Proof of holding the lock of one solution directory, released on drop.
#[derive(Debug)]
pub struct SolutionLock {
    locks: Arc<SolutionLocks>,
    dir: PathBuf,
}

/// Errors that can occur while acquiring a lock.
#[derive(thiserror::Error, Debug)]
#[error("cannot lock `{path}`: {source}")]
pub struct LockError {
    /// The directory that could not be locked.
    pub path: PathBuf,
    /// The underlying failure.
    #[source]
    pub source: std::io::Error,
}

//================================================================================================
// Impls
//================================================================================================

impl SolutionLocks {
    /// Creates an empty registry breaking lock files older than `stale_after`.
    pub fn new(stale_after: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            stale_after,
        }
    }

    /// Tries to lock `dir`, creating it if needed.
    ///
    /// Returns `Ok(None)` when another thread or process holds the lock.
    pub fn try_acquire(self: &Arc<Self>, dir: &Path) -> Result<Option<SolutionLock>, LockError> {
        let err = |source| LockError {
            path: dir.to_owned(),
            source,
        };

        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.contains(dir) {
            return Ok(None);
        }

        std::fs::create_dir_all(dir).map_err(err)?;
        let path = dir.join(LOCK_FILE);
        match create_lock_file(&path) {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !self.is_stale(&path).map_err(err)? {
                    return Ok(None);
                }
                tracing::warn!(
                    message = "breaking stale solution lock",
                    path = %path.display(),
                    stale_after = ?self.stale_after
                );
                match std::fs::remove_file(&path) {
                    Ok(()) => {},
                    Err(e) if e.kind() == ErrorKind::NotFound => {},
                    Err(e) => return Err(err(e)),
                }
                match create_lock_file(&path) {
                    Ok(()) => {},
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
                    Err(e) => return Err(err(e)),
                }
            },
            Err(e) => return Err(err(e)),
        }

        held.insert(dir.to_owned());
        tracing::trace!(dir = %dir.display(), "acquired solution lock");
        Ok(Some(SolutionLock {
            locks: Arc::clone(self),
            dir: dir.to_owned(),
        }))
    }

    /// Whether this process holds the lock of `dir`.
    pub fn is_held(&self, dir: &Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(dir)
    }

    fn is_stale(&self, path: &Path) -> std::io::Result<bool> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(meta
                .modified()?
                .elapsed()
                .is_ok_and(|age| age >= self.stale_after)),
            // vanished in between, whoever held it is done
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }
}

impl Default for SolutionLocks {
    fn default() -> Self {
        let stale = depot_config::Config::default().enrichment.stale_lock_secs;
        Self::new(Duration::from_secs(stale))
    }
}

impl SolutionLock {
    /// The locked directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for SolutionLock {
    fn drop(&mut self) {
        let path = self.dir.join(LOCK_FILE);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    message = "could not remove solution lock file",
                    path = %path.display(),
                    error = %e
                );
            }
        }
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.dir);
    }
}

//================================================================================================
// Functions
//================================================================================================

fn create_lock_file(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())
}
