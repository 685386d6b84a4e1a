//! Webserver process control through the vendor binaries.

use std::process::Command;

use crate::error::WebserverError;

pub trait ProcessManager: Send + Sync {
    /// Syntax-check the active configuration.
    fn test_config(&self) -> Result<(), WebserverError>;
    /// Ask the running server to pick up configuration changes.
    fn reload(&self) -> Result<(), WebserverError>;
    fn version(&self) -> Result<String, WebserverError>;
}

/// Runs `<binary> <args>` for each operation.
#[derive(Debug, Clone)]
pub struct CommandProcessManager {
    binary: String,
    test_args: Vec<String>,
    reload_args: Vec<String>,
    version_args: Vec<String>,
}

impl CommandProcessManager {
    pub fn nginx(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            test_args: vec!["-t".into()],
            reload_args: vec!["-s".into(), "reload".into()],
            version_args: vec!["-v".into()],
        }
    }

    pub fn apache(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            test_args: vec!["-t".into()],
            reload_args: vec!["graceful".into()],
            version_args: vec!["-v".into()],
        }
    }

    fn run(&self, args: &[String]) -> Result<String, WebserverError> {
        let command = std::iter::once(self.binary.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| WebserverError::Command {
                command: command.clone(),
                output: e.to_string(),
            })?;

        let combined = String::from_utf8_lossy(&output.stdout).to_string()
            + &String::from_utf8_lossy(&output.stderr);
        let combined = combined.trim().to_string();

        if !output.status.success() {
            tracing::warn!(command = %command, status = %output.status, "Webserver command failed");
            return Err(WebserverError::Command {
                command,
                output: if combined.is_empty() {
                    output.status.to_string()
                } else {
                    combined
                },
            });
        }
        tracing::debug!(command = %command, "Webserver command succeeded");
        Ok(combined)
    }
}

impl ProcessManager for CommandProcessManager {
    fn test_config(&self) -> Result<(), WebserverError> {
        self.run(&self.test_args).map(|_| ())
    }

    fn reload(&self) -> Result<(), WebserverError> {
        self.run(&self.reload_args).map(|_| ())
    }

    fn version(&self) -> Result<String, WebserverError> {
        let output = self.run(&self.version_args)?;
        Ok(output.lines().next().unwrap_or_default().to_string())
    }
}
