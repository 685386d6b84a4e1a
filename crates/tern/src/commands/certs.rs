//! `hosts`, `deploy-cert`, `issue-cert` and `common-dir`.

use std::path::Path;

use anyhow::Context;
use serde_json::json;

use tern_certs::CertificateManager;
use tern_config::AgentConfig;
use tern_webserver::WebserverCode;

use crate::cli::CommonDirCommand;
use crate::format::{print, OutputFormat};

pub fn hosts(
    config: &AgentConfig,
    webserver: Option<WebserverCode>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let manager = CertificateManager::from_config(config);
    if manager.webservers().is_empty() {
        tracing::warn!("No supported webserver found on this host");
    }
    let mut vhosts = manager.vhosts();
    if let Some(code) = webserver {
        vhosts.retain(|v| v.webservers.contains(&code));
    }
    print(format, &vhosts)
}

pub fn deploy_cert(
    config: &AgentConfig,
    server_name: &str,
    cert: &Path,
    key: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    // Webserver configs outlive the shell that ran this; store absolute paths.
    let cert = cert
        .canonicalize()
        .with_context(|| format!("certificate {}", cert.display()))?;
    let key = key
        .canonicalize()
        .with_context(|| format!("key {}", key.display()))?;

    let manager = CertificateManager::from_config(config);
    let reports = manager.deploy(server_name, &cert, &key)?;
    print(format, &reports)
}

pub fn issue_cert(
    config: &AgentConfig,
    domains: &[String],
    deploy: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let manager = CertificateManager::from_config(config);
    let issued = manager.issue(domains, deploy)?;
    print(format, &issued)
}

pub fn common_dir(
    config: &AgentConfig,
    command: &CommonDirCommand,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let manager = CertificateManager::from_config(config);
    match command {
        CommonDirCommand::Status => print(format, &manager.common_dir_status()?),
        CommonDirCommand::Enable { server_name } | CommonDirCommand::Disable { server_name } => {
            let enabled = matches!(command, CommonDirCommand::Enable { .. });
            let changed = manager.set_common_dir(server_name, enabled)?;
            print(
                format,
                &json!({
                    "server_name": server_name,
                    "enabled": enabled,
                    "changed": changed,
                }),
            )
        }
    }
}
