use std::io;
use std::path::Path;

/// Activates and deactivates configuration files on the host.
///
/// For Debian-style layouts this is the `sites-available` → `sites-enabled`
/// symlink; files outside such a layout are always active.
pub trait HostManager: Send + Sync {
    /// Returns `true` only when this call activated `path`.
    fn enable(&self, path: &Path) -> io::Result<bool>;
    fn disable(&self, path: &Path) -> io::Result<()>;
}

/// Host manager for layouts where every config file is always active.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostManager;

impl HostManager for NoopHostManager {
    fn enable(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }

    fn disable(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}
