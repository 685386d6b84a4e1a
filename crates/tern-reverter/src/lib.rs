//! Configuration transactions.
//!
//! A [`Reverter`] records every file a mutating operation creates, edits in
//! place, or activates, so that a failure halfway through can put the host
//! back the way it was. One reverter per top-level operation, finished by
//! exactly one [`Reverter::commit`] or a successful [`Reverter::rollback`].

mod error;
mod host;
mod lock;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use error::ReverterError;
pub use host::{HostManager, NoopHostManager};

use lock::PathLock;

/// Suffix appended to a file's path to name its backup copy.
pub const BACKUP_SUFFIX: &str = ".back";

/// Path of the backup copy for `path` (`<path>.back`).
pub fn backup_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(BACKUP_SUFFIX);
    PathBuf::from(raw)
}

pub struct Reverter {
    host: Arc<dyn HostManager>,
    /// Files created by this transaction; removed on rollback.
    pending_deletions: Vec<PathBuf>,
    /// Original path → backup path for files edited in place.
    pending_restores: BTreeMap<PathBuf, PathBuf>,
    /// Paths activated by this transaction, in activation order.
    pending_disables: Vec<PathBuf>,
    locks: Vec<PathLock>,
    finished: bool,
}

impl Reverter {
    pub fn new(host: Arc<dyn HostManager>) -> Self {
        Self {
            host,
            pending_deletions: Vec::new(),
            pending_restores: BTreeMap::new(),
            pending_disables: Vec::new(),
            locks: Vec::new(),
            finished: false,
        }
    }

    /// Register a file this transaction created. Duplicates are tolerated.
    ///
    /// A path already backed up for restore stays a restore: deleting it on
    /// rollback would lose the original.
    pub fn add_config_to_deletion(&mut self, path: &Path) -> Result<(), ReverterError> {
        if self.pending_restores.contains_key(path) {
            tracing::warn!(
                path = %path.display(),
                "Path already pending restore, not registering for deletion"
            );
            return Ok(());
        }
        if self.pending_deletions.iter().any(|p| p == path) {
            return Ok(());
        }
        self.acquire(path)?;
        self.pending_deletions.push(path.to_path_buf());
        Ok(())
    }

    /// Copy `path` to `<path>.back` before it is edited in place.
    ///
    /// No-op when the path is already pending restore (the first backup
    /// wins) or pending deletion (the file did not exist before).
    pub fn backup_config(&mut self, path: &Path) -> Result<(), ReverterError> {
        if self.pending_restores.contains_key(path)
            || self.pending_deletions.iter().any(|p| p == path)
        {
            return Ok(());
        }
        self.acquire(path)?;

        let bytes = std::fs::read(path).map_err(|source| ReverterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let backup = backup_path(path);
        std::fs::write(&backup, bytes).map_err(|source| ReverterError::Io {
            path: backup.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), backup = %backup.display(), "Backed up config");
        self.pending_restores.insert(path.to_path_buf(), backup);
        Ok(())
    }

    /// Register a path activated during this transaction. Rollback
    /// deactivates it through the host manager.
    pub fn add_config_to_disable(&mut self, path: &Path) {
        self.pending_disables.push(path.to_path_buf());
    }

    /// Undo everything recorded so far.
    ///
    /// Disables run first and only log their failures. Deletions skip files
    /// that are already gone; failing to remove an existing file stops the
    /// rollback. Restores are cleared one by one, so a failed restore leaves
    /// the remaining entries pending and the call can be retried. Disables
    /// and deletions already performed are not repeated.
    pub fn rollback(&mut self) -> Result<(), ReverterError> {
        for path in std::mem::take(&mut self.pending_disables) {
            if let Err(e) = self.host.disable(&path) {
                tracing::warn!(error = %e, path = %path.display(), "Failed to disable config during rollback");
            }
        }

        while let Some(path) = self.pending_deletions.first().cloned() {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed new config");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ReverterError::Rollback { path, source }),
            }
            self.pending_deletions.remove(0);
        }

        while let Some((original, backup)) = self
            .pending_restores
            .iter()
            .next()
            .map(|(o, b)| (o.clone(), b.clone()))
        {
            let bytes = std::fs::read(&backup).map_err(|source| ReverterError::Rollback {
                path: backup.clone(),
                source,
            })?;
            std::fs::write(&original, bytes).map_err(|source| ReverterError::Rollback {
                path: original.clone(),
                source,
            })?;
            if let Err(e) = std::fs::remove_file(&backup) {
                tracing::warn!(error = %e, path = %backup.display(), "Failed to remove backup after restore");
            }
            tracing::debug!(path = %original.display(), "Restored config");
            self.pending_restores.remove(&original);
        }

        self.finish();
        Ok(())
    }

    /// Keep every change. Deletes backups; never touches pending disables.
    pub fn commit(mut self) {
        for backup in self.pending_restores.values() {
            if let Err(e) = std::fs::remove_file(backup) {
                tracing::warn!(error = %e, path = %backup.display(), "Failed to remove backup on commit");
            }
        }
        self.pending_restores.clear();
        self.pending_deletions.clear();
        self.finish();
    }

    pub fn pending_deletions(&self) -> &[PathBuf] {
        &self.pending_deletions
    }

    pub fn pending_restores(&self) -> &BTreeMap<PathBuf, PathBuf> {
        &self.pending_restores
    }

    pub fn pending_disables(&self) -> &[PathBuf] {
        &self.pending_disables
    }

    /// Nothing recorded (or everything already rolled back).
    pub fn is_clean(&self) -> bool {
        self.pending_deletions.is_empty()
            && self.pending_restores.is_empty()
            && self.pending_disables.is_empty()
    }

    fn acquire(&mut self, path: &Path) -> Result<(), ReverterError> {
        if self.locks.iter().any(|l| l.path() == path) {
            return Ok(());
        }
        let lock = PathLock::acquire(path).ok_or_else(|| ReverterError::Busy(path.to_path_buf()))?;
        self.locks.push(lock);
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        self.locks.clear();
    }
}

impl Drop for Reverter {
    fn drop(&mut self) {
        if !self.finished && !self.is_clean() {
            tracing::warn!(
                deletions = self.pending_deletions.len(),
                restores = self.pending_restores.len(),
                disables = self.pending_disables.len(),
                "Config transaction dropped without commit or rollback"
            );
        }
    }
}
