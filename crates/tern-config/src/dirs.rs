//! Agent data directory initialization.
//!
//! Ensures the data directory tree exists and contains a default
//! `config.toml` if not already present. Called once during startup.

use std::path::Path;

use tern_common::paths;

/// Default content for a freshly created config.toml.
const DEFAULT_CONFIG_TOML: &str = "\
# tern agent configuration

[server]
# listen = \"0.0.0.0\"
# port = 8787
# token is written by `tern generate-token`

# [statistics]
# interval_secs = 60
# retention_days = 30

# [acme]
# client = \"certbot\"
# email = \"ops@example.com\"

# [nginx]
# root_config = \"/etc/nginx/nginx.conf\"
# sites_available = \"/etc/nginx/sites-available\"
# sites_enabled = \"/etc/nginx/sites-enabled\"
# binary = \"nginx\"
";

/// Ensure the agent data directory structure exists.
///
/// Creates `statistics/`, `certificates/`, `acme/` and `logs/` under the
/// data root, plus `config.toml` if absent.
///
/// Errors are logged but not fatal; individual subsystems report their
/// own failures when they touch a missing directory.
pub fn ensure_data_dir() {
    ensure_dir_tree(&paths::tern_data_dir());
}

fn ensure_dir_tree(data_dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        tracing::warn!(
            path = %data_dir.display(),
            error = %e,
            "Could not create data directory"
        );
        return;
    }

    for subdir in &["statistics", "certificates", "acme", "logs"] {
        let path = data_dir.join(subdir);
        if let Err(e) = std::fs::create_dir_all(&path) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not create subdirectory"
            );
        }
    }

    let config_path = data_dir.join("config.toml");
    if !config_path.exists() {
        match std::fs::write(&config_path, DEFAULT_CONFIG_TOML) {
            Ok(()) => tracing::debug!(path = %config_path.display(), "Created default config"),
            Err(e) => tracing::warn!(
                path = %config_path.display(),
                error = %e,
                "Could not write default config"
            ),
        }
    }

    tracing::debug!(path = %data_dir.display(), "Data directory ready");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentConfig;

    #[test]
    fn default_config_parses_as_agent_config() {
        let config: AgentConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn creates_tree_and_keeps_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");

        ensure_dir_tree(&root);
        for subdir in ["statistics", "certificates", "acme", "logs"] {
            assert!(root.join(subdir).is_dir(), "{subdir} missing");
        }

        std::fs::write(root.join("config.toml"), "[server]\nport = 1\n").unwrap();
        ensure_dir_tree(&root);
        let raw = std::fs::read_to_string(root.join("config.toml")).unwrap();
        assert!(raw.contains("port = 1"));
    }
}
