//! `update`: self-replace from a release server.
//!
//! The server publishes `<url>/version` (plain text, e.g. `0.5.1`) and one
//! binary per platform at `<url>/tern-<os>-<arch>`.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::format::{print, OutputFormat};
use tern::modules::AGENT_VERSION;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct UpdateReport {
    current: String,
    latest: String,
    available: bool,
    updated: bool,
}

/// Dotted numeric version, ignoring a leading `v` and any `-suffix`.
fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let core = raw.trim().trim_start_matches('v');
    let core = core.split(['-', '+']).next().unwrap_or_default();
    core.split('.').map(|part| part.parse().ok()).collect()
}

pub fn is_newer(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(latest), Some(current)) => latest > current,
        _ => false,
    }
}

fn asset_name() -> String {
    let ext = if cfg!(windows) { ".exe" } else { "" };
    format!(
        "tern-{}-{}{ext}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

pub fn update(url: Option<&str>, check: bool, format: OutputFormat) -> anyhow::Result<()> {
    let base = url
        .context("no update URL configured; set [update] url or pass --url")?
        .trim_end_matches('/');

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let latest = client
        .get(format!("{base}/version"))
        .send()?
        .error_for_status()?
        .text()?
        .trim()
        .to_string();

    let available = is_newer(&latest, AGENT_VERSION);
    let mut report = UpdateReport {
        current: AGENT_VERSION.to_string(),
        latest,
        available,
        updated: false,
    };
    if !available || check {
        return print(format, &report);
    }

    let asset = asset_name();
    tracing::info!(version = %report.latest, asset = %asset, "Downloading update");
    let bytes = client
        .get(format!("{base}/{asset}"))
        .send()?
        .error_for_status()?
        .bytes()?;
    if bytes.is_empty() {
        anyhow::bail!("release asset {asset} is empty");
    }

    let exe = std::env::current_exe().context("locating the running binary")?;
    replace_binary(&exe, &bytes)?;
    tracing::info!(path = %exe.display(), version = %report.latest, "Binary replaced; restart the service to finish");
    report.updated = true;
    print(format, &report)
}

/// Write next to `exe`, then rename over it.
fn replace_binary(exe: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let staged = exe.with_extension("new");
    std::fs::write(&staged, bytes)
        .with_context(|| format!("writing {}", staged.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o755))?;
    }

    #[cfg(windows)]
    {
        // A running executable cannot be overwritten, but it can be renamed.
        let old = exe.with_extension("old");
        let _ = std::fs::remove_file(&old);
        std::fs::rename(exe, &old)?;
    }

    std::fs::rename(&staged, exe).with_context(|| format!("replacing {}", exe.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_numeric_versions() {
        assert!(is_newer("0.10.0", "0.9.3"));
        assert!(is_newer("v1.0.0", "0.4.0"));
        assert!(!is_newer("0.4.0", "0.4.0"));
        assert!(!is_newer("0.3.9-rc1", "0.4.0"));
        assert!(!is_newer("garbage", "0.4.0"));
    }

    #[test]
    fn replace_binary_swaps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tern");
        std::fs::write(&exe, b"old").unwrap();
        replace_binary(&exe, b"new").unwrap();
        assert_eq!(std::fs::read(&exe).unwrap(), b"new");
        assert!(!dir.path().join("tern.new").exists());
    }

    #[test]
    fn update_without_url_fails() {
        assert!(update(None, true, OutputFormat::Json).is_err());
    }
}
