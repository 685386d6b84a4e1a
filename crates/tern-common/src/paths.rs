use std::path::PathBuf;

/// Environment variable that relocates every piece of agent state.
pub const DATA_DIR_ENV: &str = "TERN_DATA_DIR";

/// Root data directory for the agent.
///
/// The agent runs as a system service, so state lives in a system
/// location rather than a home directory:
///
/// - Linux and other Unix: `/var/lib/tern/`
/// - Windows: `%PROGRAMDATA%\tern\`
///
/// `TERN_DATA_DIR` overrides the default (used by tests and containers).
pub fn tern_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    #[cfg(windows)]
    {
        if let Some(program_data) = std::env::var_os("PROGRAMDATA") {
            return PathBuf::from(program_data).join("tern");
        }
    }

    #[cfg(unix)]
    {
        PathBuf::from("/var/lib/tern")
    }

    #[cfg(not(unix))]
    {
        PathBuf::from(".tern")
    }
}

/// Default location of the agent configuration file.
pub fn tern_config_path() -> PathBuf {
    tern_data_dir().join("config.toml")
}

/// Per-metric statistics files.
pub fn tern_statistics_dir() -> PathBuf {
    tern_data_dir().join("statistics")
}

/// Stored certificates (`<name>.pem`, `.crt`, `.key`, `.issuer.crt`, `.json`).
pub fn tern_certificates_dir() -> PathBuf {
    tern_data_dir().join("certificates")
}

/// Shared webroot answering ACME HTTP-01 challenges.
pub fn tern_common_dir() -> PathBuf {
    tern_data_dir().join("acme")
}

/// Log directory.
pub fn tern_log_dir() -> PathBuf {
    tern_data_dir().join("logs")
}
