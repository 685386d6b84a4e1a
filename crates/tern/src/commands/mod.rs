//! CLI command handlers. Each one builds what it needs from the agent
//! configuration, runs a single operation and prints the result.

pub mod certs;
pub mod serve;
pub mod token;
pub mod update;

use std::path::Path;

use tern_certs::CertError;
use tern_common::error::ErrorCode;
use tern_config::{AgentConfig, ConfigError};
use tern_stats::StatsError;
use tern_webserver::WebserverError;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<AgentConfig> {
    Ok(AgentConfig::load(path)?)
}

/// Error code behind a command failure, if it came from a domain crate.
pub(crate) fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    if let Some(e) = err.downcast_ref::<CertError>() {
        return Some(e.into());
    }
    if let Some(e) = err.downcast_ref::<WebserverError>() {
        return Some(e.into());
    }
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return Some(e.into());
    }
    if let Some(e) = err.downcast_ref::<StatsError>() {
        return Some(e.into());
    }
    None
}

/// Process exit status: 2 for caller mistakes, 1 for everything else.
pub(crate) fn exit_status(err: &anyhow::Error) -> u8 {
    match error_code(err) {
        Some(code) if code.is_caller_error() => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_follows_error_code() {
        let not_found = anyhow::Error::from(CertError::NotFound("x".into()));
        assert_eq!(error_code(&not_found), Some(ErrorCode::NotFound));
        assert_eq!(exit_status(&not_found), 2);

        let reload = anyhow::Error::from(WebserverError::Command {
            command: "nginx -s reload".into(),
            output: "failed".into(),
        });
        assert_eq!(exit_status(&reload), 1);

        assert_eq!(exit_status(&anyhow::anyhow!("plain")), 1);
    }
}
