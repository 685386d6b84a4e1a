//! Process-wide registry of paths owned by a live transaction.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

fn table() -> &'static Mutex<HashSet<PathBuf>> {
    static TABLE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Held for as long as the owning transaction lives; released on drop.
#[derive(Debug)]
pub(crate) struct PathLock {
    path: PathBuf,
}

impl PathLock {
    /// `None` when another transaction already holds `path`.
    pub(crate) fn acquire(path: &Path) -> Option<Self> {
        let mut held = table().lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(path.to_path_buf()) {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let mut held = table().lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.path);
    }
}
