//! ACME issuance by shelling out to certbot or lego in webroot mode.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use tern_config::{AcmeClientKind, AcmeSection};

use crate::error::CertError;

#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    pub domains: Vec<String>,
    pub email: String,
    /// Directory URL; `None` uses the client's default (Let's Encrypt).
    pub server: Option<String>,
    /// Served under `/.well-known/acme-challenge/` by every vhost.
    pub webroot: PathBuf,
    /// Client state: account keys, issued certificates, logs.
    pub work_dir: PathBuf,
}

impl IssueRequest {
    fn primary_domain(&self) -> Result<&str, CertError> {
        self.domains
            .first()
            .map(String::as_str)
            .ok_or_else(|| CertError::InvalidName("no domains requested".into()))
    }
}

/// Files the client produced.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IssuedFiles {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

pub trait AcmeClient: Send + Sync {
    fn name(&self) -> &str;
    fn issue(&self, request: &IssueRequest) -> Result<IssuedFiles, CertError>;
}

pub fn client_from_config(section: &AcmeSection) -> Box<dyn AcmeClient> {
    match section.client {
        AcmeClientKind::Certbot => Box::new(Certbot::new(section.binary())),
        AcmeClientKind::Lego => Box::new(Lego::new(section.binary())),
    }
}

#[derive(Debug, Clone)]
pub struct Certbot {
    binary: String,
}

impl Certbot {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(&self, request: &IssueRequest, cert_name: &str) -> Vec<String> {
        let work = &request.work_dir;
        let mut args = vec![
            "certonly".to_string(),
            "--webroot".to_string(),
            "-w".to_string(),
            request.webroot.display().to_string(),
            "--non-interactive".to_string(),
            "--agree-tos".to_string(),
            "--keep-until-expiring".to_string(),
            "--cert-name".to_string(),
            cert_name.to_string(),
            "--config-dir".to_string(),
            work.join("config").display().to_string(),
            "--work-dir".to_string(),
            work.join("work").display().to_string(),
            "--logs-dir".to_string(),
            work.join("logs").display().to_string(),
        ];
        if request.email.is_empty() {
            args.push("--register-unsafely-without-email".to_string());
        } else {
            args.push("--email".to_string());
            args.push(request.email.clone());
        }
        if let Some(server) = &request.server {
            args.push("--server".to_string());
            args.push(server.clone());
        }
        for domain in &request.domains {
            args.push("-d".to_string());
            args.push(domain.clone());
        }
        args
    }
}

impl AcmeClient for Certbot {
    fn name(&self) -> &str {
        "certbot"
    }

    fn issue(&self, request: &IssueRequest) -> Result<IssuedFiles, CertError> {
        let cert_name = crate::storage::name_for_domain(request.primary_domain()?);
        run_client(self.name(), &self.binary, &self.args(request, &cert_name))?;

        let live = request.work_dir.join("config").join("live").join(&cert_name);
        produced(live.join("fullchain.pem"), live.join("privkey.pem"), self.name())
    }
}

#[derive(Debug, Clone)]
pub struct Lego {
    binary: String,
}

impl Lego {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(&self, request: &IssueRequest) -> Vec<String> {
        let mut args = vec![
            "--accept-tos".to_string(),
            "--path".to_string(),
            request.work_dir.display().to_string(),
            "--http".to_string(),
            "--http.webroot".to_string(),
            request.webroot.display().to_string(),
        ];
        if !request.email.is_empty() {
            args.push("--email".to_string());
            args.push(request.email.clone());
        }
        if let Some(server) = &request.server {
            args.push("--server".to_string());
            args.push(server.clone());
        }
        for domain in &request.domains {
            args.push("--domains".to_string());
            args.push(domain.clone());
        }
        args.push("run".to_string());
        args
    }
}

impl AcmeClient for Lego {
    fn name(&self) -> &str {
        "lego"
    }

    fn issue(&self, request: &IssueRequest) -> Result<IssuedFiles, CertError> {
        // lego names its files after the first domain, `*` replaced by `_`.
        let file_stem = request.primary_domain()?.replace('*', "_");
        run_client(self.name(), &self.binary, &self.args(request))?;

        let dir = request.work_dir.join("certificates");
        produced(
            dir.join(format!("{file_stem}.crt")),
            dir.join(format!("{file_stem}.key")),
            self.name(),
        )
    }
}

fn produced(certificate: PathBuf, key: PathBuf, client: &str) -> Result<IssuedFiles, CertError> {
    for path in [&certificate, &key] {
        if !path.is_file() {
            return Err(CertError::Acme {
                client: client.to_string(),
                message: format!("expected output {} is missing", path.display()),
            });
        }
    }
    Ok(IssuedFiles { certificate, key })
}

fn run_client(client: &str, binary: &str, args: &[String]) -> Result<(), CertError> {
    tracing::info!(client, binary, "Running ACME client");
    let output = Command::new(binary)
        .args(args)
        .output()
        .map_err(|e| CertError::Acme {
            client: client.to_string(),
            message: format!("cannot run {binary}: {e}"),
        })?;

    if output.status.success() {
        tracing::info!(client, "ACME client finished");
        return Ok(());
    }

    let combined = String::from_utf8_lossy(&output.stdout).to_string()
        + "\n"
        + &String::from_utf8_lossy(&output.stderr);
    let cleaned = clean_output(&combined);
    tracing::warn!(client, status = %output.status, "ACME client failed");
    Err(CertError::Acme {
        client: client.to_string(),
        message: if cleaned.is_empty() {
            output.status.to_string()
        } else {
            cleaned
        },
    })
}

struct OutputPatterns {
    timestamp: Regex,
    level: Regex,
}

fn patterns() -> Option<&'static OutputPatterns> {
    static PATTERNS: OnceLock<Option<OutputPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(OutputPatterns {
                timestamp: Regex::new(
                    r"^\d{4}[/-]\d{2}[/-]\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?[:\s]*",
                )
                .ok()?,
                level: Regex::new(
                    r"^(?:\[(INFO|WARN|WARNING|ERROR|DEBUG|FATAL)\]|(INFO|WARN|WARNING|ERROR|DEBUG|FATAL)(?::[\w.]+)?:)\s*",
                )
                .ok()?,
            })
        })
        .as_ref()
}

const NOISE_PREFIXES: &[&str] = &[
    "Saving debug log to",
    "Ask for help or search for solutions",
    "See the logfile",
    "Requesting a certificate for",
    "Account registered",
];

/// Strip timestamps, log levels and boilerplate from client output,
/// keeping the lines a human needs to fix the problem. Info and debug
/// lines are progress noise and are dropped.
pub fn clean_output(raw: &str) -> String {
    let Some(patterns) = patterns() else {
        return raw.trim().to_string();
    };

    let mut kept = Vec::new();
    for line in raw.lines() {
        let line = patterns.timestamp.replace(line.trim_end(), "");
        let (line, level) = match patterns.level.captures(&line) {
            Some(caps) => {
                let level = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string());
                (line[caps.get(0).map_or(0, |m| m.end())..].to_string(), level)
            }
            None => (line.to_string(), None),
        };

        if matches!(level.as_deref(), Some("INFO" | "DEBUG")) {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.chars().all(|c| c == '-' || c == ' ')
            || NOISE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        {
            continue;
        }
        kept.push(line.trim_end().to_string());
    }
    kept.join("\n")
}

/// Create `<webroot>/.well-known/acme-challenge`.
pub fn ensure_webroot(webroot: &Path) -> Result<(), CertError> {
    let challenge = webroot.join(".well-known").join("acme-challenge");
    std::fs::create_dir_all(&challenge).map_err(|e| CertError::io(challenge, e))
}
