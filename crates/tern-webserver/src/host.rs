//! `sites-available` → `sites-enabled` symlink management.

use std::io;
use std::path::{Path, PathBuf};

use tern_reverter::HostManager;

use crate::site::canonical;

#[derive(Debug, Clone)]
pub struct SitesHostManager {
    available: PathBuf,
    enabled: PathBuf,
}

impl SitesHostManager {
    pub fn new(available: impl Into<PathBuf>, enabled: impl Into<PathBuf>) -> Self {
        Self {
            available: available.into(),
            enabled: enabled.into(),
        }
    }

    /// Files outside `sites-available` are already active.
    fn is_managed(&self, path: &Path) -> bool {
        if path.starts_with(&self.available) {
            return true;
        }
        match path.parent() {
            Some(parent) => canonical(parent).starts_with(canonical(&self.available)),
            None => false,
        }
    }

    fn link_for(&self, path: &Path) -> Option<PathBuf> {
        path.file_name().map(|name| self.enabled.join(name))
    }

    pub fn is_enabled(&self, path: &Path) -> bool {
        if !self.is_managed(path) {
            return true;
        }
        self.link_for(path)
            .is_some_and(|link| std::fs::symlink_metadata(link).is_ok())
    }
}

impl HostManager for SitesHostManager {
    fn enable(&self, path: &Path) -> io::Result<bool> {
        if !self.is_managed(path) {
            return Ok(false);
        }
        let Some(link) = self.link_for(path) else {
            return Ok(false);
        };
        if std::fs::symlink_metadata(&link).is_ok() {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.enabled)?;
        make_link(path, &link)?;
        tracing::debug!(path = %path.display(), link = %link.display(), "Enabled site");
        Ok(true)
    }

    fn disable(&self, path: &Path) -> io::Result<()> {
        if !self.is_managed(path) {
            return Ok(());
        }
        let Some(link) = self.link_for(path) else {
            return Ok(());
        };
        match std::fs::remove_file(&link) {
            Ok(()) => {
                tracing::debug!(link = %link.display(), "Disabled site");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn make_link(target: &Path, link: &Path) -> io::Result<()> {
    std::fs::copy(target, link).map(|_| ())
}
