//! Durable PID record for the managed inference server.
//!
//! The record outlives the daemon: existence of the file plus a successful
//! liveness probe on the stored PID is the sole source of truth for "is the
//! server running". `reconcile` re-validates the stored value with a
//! signal-0 probe rather than trusting it, so a stale record (file present,
//! process gone or recycled to another owner) reads as "not running" and
//! self-heals on the next start.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Handle over the on-disk PID record.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create a handle for the record at `path`. Does not touch the disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `pid` to the record, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn write(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, pid.to_string())?;
        Ok(())
    }

    /// Read the recorded PID.
    ///
    /// `None` when the record is absent, unreadable, or malformed — every
    /// failure mode collapses to "no record".
    pub fn read(&self) -> Option<u32> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match content.trim().parse() {
            Ok(pid) => Some(pid),
            Err(_) => {
                debug!("malformed PID record at {}", self.path.display());
                None
            }
        }
    }

    /// Remove the record. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only when an existing record cannot be deleted.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-validate the record against the live process table.
    ///
    /// Returns the recorded PID iff the record exists, parses, and the PID
    /// passes a liveness probe. A present-but-dead record returns `None`.
    pub fn reconcile(&self) -> Option<u32> {
        let pid = self.read()?;
        probe(pid).then_some(pid)
    }
}

/// Best-effort liveness probe: does `pid` refer to a live process this user
/// may signal?
///
/// Delivers signal 0, which performs permission and existence checks without
/// affecting the target. A foreign process (exists, but owned by someone
/// else) deliberately reads as dead — it cannot be ours.
pub fn probe(pid: u32) -> bool {
    // SAFETY: kill(2) with signal 0 only validates the target; no signal is
    // delivered and no memory is involved.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
