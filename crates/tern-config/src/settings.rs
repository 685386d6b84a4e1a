use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tern_common::error::ErrorCode;
use tern_common::paths;

/// Default TCP port for the control-plane listener.
pub const DEFAULT_PORT: u16 = 8787;
/// Largest frame accepted from the control plane (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
/// Statistics sampling interval.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
/// How long statistics records are kept.
pub const DEFAULT_RETENTION_DAYS: u64 = 30;
/// How often the retention cleaner runs.
pub const DEFAULT_CLEAN_INTERVAL_HOURS: u64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

impl From<&ConfigError> for ErrorCode {
    fn from(e: &ConfigError) -> Self {
        match e {
            ConfigError::Io { .. } => ErrorCode::IoError,
            ConfigError::Invalid { .. } => ErrorCode::ConfigError,
        }
    }
}

/// The whole agent configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub statistics: StatisticsSection,
    #[serde(default)]
    pub acme: AcmeSection,
    #[serde(default = "WebserverSection::nginx_defaults")]
    pub nginx: WebserverSection,
    #[serde(default = "WebserverSection::apache_defaults")]
    pub apache: WebserverSection,
    #[serde(default)]
    pub certificates: CertificatesSection,
    #[serde(default)]
    pub update: UpdateSection,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            statistics: StatisticsSection::default(),
            acme: AcmeSection::default(),
            nginx: WebserverSection::nginx_defaults(),
            apache: WebserverSection::apache_defaults(),
            certificates: CertificatesSection::default(),
            update: UpdateSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret every request must carry. Empty means "not generated yet";
    /// the server refuses every request until one is set.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            token: String::new(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_retention")]
    pub retention_days: u64,
    #[serde(default = "default_clean_interval")]
    pub clean_interval_hours: u64,
}

impl Default for StatisticsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            clean_interval_hours: DEFAULT_CLEAN_INTERVAL_HOURS,
        }
    }
}

impl StatisticsSection {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(paths::tern_statistics_dir)
    }
}

/// Supported ACME client binaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcmeClientKind {
    #[default]
    Certbot,
    Lego,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AcmeSection {
    #[serde(default)]
    pub client: AcmeClientKind,
    /// Binary to execute; defaults to the client name on `PATH`.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub server: Option<String>,
    /// Shared webroot served under `/.well-known/acme-challenge/`.
    #[serde(default)]
    pub common_dir: Option<PathBuf>,
    /// Working directory handed to the ACME client.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl AcmeSection {
    pub fn binary(&self) -> String {
        match &self.binary {
            Some(binary) => binary.clone(),
            None => match self.client {
                AcmeClientKind::Certbot => "certbot".to_string(),
                AcmeClientKind::Lego => "lego".to_string(),
            },
        }
    }

    pub fn common_dir(&self) -> PathBuf {
        self.common_dir.clone().unwrap_or_else(paths::tern_common_dir)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| paths::tern_data_dir().join("acme-work"))
    }
}

/// Paths and binary for one webserver product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebserverSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub root_config: PathBuf,
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub binary: String,
}

impl WebserverSection {
    pub fn nginx_defaults() -> Self {
        Self {
            enabled: true,
            root_config: PathBuf::from("/etc/nginx/nginx.conf"),
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            binary: "nginx".to_string(),
        }
    }

    pub fn apache_defaults() -> Self {
        Self {
            enabled: true,
            root_config: PathBuf::from("/etc/apache2/apache2.conf"),
            sites_available: PathBuf::from("/etc/apache2/sites-available"),
            sites_enabled: PathBuf::from("/etc/apache2/sites-enabled"),
            binary: "apachectl".to_string(),
        }
    }

    /// Enabled in config and actually installed on this host.
    pub fn is_present(&self) -> bool {
        self.enabled && self.root_config.exists()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CertificatesSection {
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

impl CertificatesSection {
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(paths::tern_certificates_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UpdateSection {
    /// Base URL serving `version` and `tern-<os>-<arch>` release assets.
    #[serde(default)]
    pub url: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_retention() -> u64 {
    DEFAULT_RETENTION_DAYS
}

fn default_clean_interval() -> u64 {
    DEFAULT_CLEAN_INTERVAL_HOURS
}

impl AgentConfig {
    /// Load the configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(path, &raw)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Write the `[server] token` key, keeping the rest of the file as-is.
pub fn save_token(path: &Path, token: &str) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut root = match std::fs::read_to_string(path) {
        Ok(raw) => raw.parse::<toml::Table>().map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
        Err(e) => return Err(io_err(e)),
    };

    let server = root
        .entry("server")
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    match server {
        toml::Value::Table(table) => {
            table.insert("token".to_string(), toml::Value::String(token.to_string()));
        }
        _ => {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "`server` must be a table".to_string(),
            })
        }
    }

    let raw = toml::to_string_pretty(&root).map_err(|e| ConfigError::Invalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, raw).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }
    Ok(())
}
