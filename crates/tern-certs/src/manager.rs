//! Certificate operations that touch webserver configuration.
//!
//! Every deployment runs inside its own [`Reverter`] transaction per
//! webserver: edit, activate, syntax-check, reload, then commit. Any
//! failure rolls the files back before the error is returned.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use tern_config::{AcmeSection, AgentConfig};
use tern_reverter::Reverter;
use tern_webserver::{
    all_vhosts, webservers_from_config, CommonDirStatus, DeployOutcome, Vhost, Webserver,
    WebserverCode, WebserverError,
};

use crate::acme::{client_from_config, ensure_webroot, AcmeClient, IssueRequest};
use crate::error::CertError;
use crate::storage::{name_for_domain, CertSource, CertificateStorage, StoredCertificate};
use crate::x509::PemBundle;

/// One webserver's share of a deployment.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeployReport {
    pub webserver: WebserverCode,
    pub server_name: String,
    #[serde(flatten)]
    pub outcome: DeployOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredAndDeployed {
    pub certificate: StoredCertificate,
    pub deployed: Vec<DeployReport>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebserverCommonDirStatus {
    pub webserver: WebserverCode,
    #[serde(flatten)]
    pub status: CommonDirStatus,
}

pub struct CertificateManager {
    storage: CertificateStorage,
    webservers: Vec<Arc<dyn Webserver>>,
    acme: Box<dyn AcmeClient>,
    acme_config: AcmeSection,
}

impl CertificateManager {
    pub fn new(
        storage: CertificateStorage,
        webservers: Vec<Arc<dyn Webserver>>,
        acme: Box<dyn AcmeClient>,
        acme_config: AcmeSection,
    ) -> Self {
        Self {
            storage,
            webservers,
            acme,
            acme_config,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            CertificateStorage::new(config.certificates.storage_dir()),
            webservers_from_config(config),
            client_from_config(&config.acme),
            config.acme.clone(),
        )
    }

    pub fn storage(&self) -> &CertificateStorage {
        &self.storage
    }

    pub fn webservers(&self) -> &[Arc<dyn Webserver>] {
        &self.webservers
    }

    pub fn vhosts(&self) -> Vec<Vhost> {
        all_vhosts(&self.webservers)
    }

    /// Webservers that declare `server_name`.
    fn hosting(&self, server_name: &str) -> Result<Vec<&Arc<dyn Webserver>>, CertError> {
        let mut out = Vec::new();
        for server in &self.webservers {
            if server.vhost_by_name(server_name)?.is_some() {
                out.push(server);
            }
        }
        if out.is_empty() {
            return Err(WebserverError::VhostNotFound(server_name.to_string()).into());
        }
        Ok(out)
    }

    /// Point every webserver hosting `server_name` at the given files.
    pub fn deploy(
        &self,
        server_name: &str,
        certificate: &Path,
        key: &Path,
    ) -> Result<Vec<DeployReport>, CertError> {
        self.hosting(server_name)?
            .into_iter()
            .map(|server| deploy_to(server.as_ref(), server_name, certificate, key))
            .collect()
    }

    /// Deploy a stored certificate to a vhost.
    pub fn assign(&self, name: &str, server_name: &str) -> Result<Vec<DeployReport>, CertError> {
        let paths = self.storage.paths(name)?;
        self.deploy(server_name, &paths.certificate, &paths.key)
    }

    /// Store a user-supplied PEM bundle, then deploy it when `server_name`
    /// is given. Without a name, the certificate's first domain is used.
    pub fn upload(
        &self,
        name: Option<&str>,
        certificate: &str,
        key: Option<&str>,
        server_name: Option<&str>,
    ) -> Result<StoredAndDeployed, CertError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let info = PemBundle::parse(certificate)?.inspect()?;
                let domain = info.domains().into_iter().next().ok_or_else(|| {
                    CertError::InvalidCertificate("certificate names no domain".into())
                })?;
                name_for_domain(&domain)
            }
        };
        let stored = self
            .storage
            .store(&name, certificate, key, CertSource::Uploaded)?;
        let deployed = match server_name {
            Some(server_name) => self.assign(&name, server_name)?,
            None => Vec::new(),
        };
        Ok(StoredAndDeployed {
            certificate: stored,
            deployed,
        })
    }

    /// Issue a certificate for `domains` through the ACME client.
    ///
    /// The challenge directory is enabled on every vhost serving one of
    /// the domains first. The result is imported into storage and, with
    /// `deploy`, assigned to the first domain's vhost.
    pub fn issue(&self, domains: &[String], deploy: bool) -> Result<StoredAndDeployed, CertError> {
        let primary = domains
            .first()
            .ok_or_else(|| CertError::InvalidName("no domains requested".into()))?;

        let webroot = self.acme_config.common_dir();
        ensure_webroot(&webroot)?;
        for domain in domains {
            for server in &self.webservers {
                if server.vhost_by_name(domain)?.is_none() {
                    continue;
                }
                if server.common_dir_manager().enable(domain)? {
                    tracing::info!(domain = %domain, webserver = %server.code(), "Challenge directory enabled");
                }
            }
        }

        let request = IssueRequest {
            domains: domains.to_vec(),
            email: self.acme_config.email.clone(),
            server: self.acme_config.server.clone(),
            webroot,
            work_dir: self.acme_config.work_dir(),
        };
        let files = self.acme.issue(&request)?;

        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| CertError::io(path, e))
        };
        let certificate = read(&files.certificate)?;
        let key = read(&files.key)?;
        let name = name_for_domain(primary);
        let stored = self
            .storage
            .store(&name, &certificate, Some(key.as_str()), CertSource::Issued)?;

        let deployed = if deploy {
            self.assign(&name, primary)?
        } else {
            Vec::new()
        };
        Ok(StoredAndDeployed {
            certificate: stored,
            deployed,
        })
    }

    pub fn common_dir_status(&self) -> Result<Vec<WebserverCommonDirStatus>, CertError> {
        let mut out = Vec::new();
        for server in &self.webservers {
            for status in server.common_dir_manager().status()? {
                out.push(WebserverCommonDirStatus {
                    webserver: server.code(),
                    status,
                });
            }
        }
        Ok(out)
    }

    /// Turn the challenge directory on or off for `server_name` on every
    /// webserver hosting it. Returns whether anything changed.
    pub fn set_common_dir(&self, server_name: &str, enabled: bool) -> Result<bool, CertError> {
        let mut changed = false;
        for server in self.hosting(server_name)? {
            let manager = server.common_dir_manager();
            changed |= if enabled {
                manager.enable(server_name)?
            } else {
                manager.disable(server_name)?
            };
        }
        Ok(changed)
    }
}

/// One transactional deployment on one webserver.
pub fn deploy_to(
    server: &dyn Webserver,
    server_name: &str,
    certificate: &Path,
    key: &Path,
) -> Result<DeployReport, CertError> {
    let host = server.host_manager();
    let process = server.process_manager();
    let mut reverter = Reverter::new(host.clone());

    let result = (|| -> Result<DeployOutcome, CertError> {
        let outcome =
            server
                .certificate_deployer()
                .deploy(&mut reverter, server_name, certificate, key)?;
        if outcome.created {
            let activated = host
                .enable(&outcome.config_path)
                .map_err(|e| CertError::io(&outcome.config_path, e))?;
            // A link that predates this deployment is not ours to remove.
            if activated {
                reverter.add_config_to_disable(&outcome.config_path);
            }
        }
        process.test_config()?;
        process.reload()?;
        Ok(outcome)
    })();

    match result {
        Ok(outcome) => {
            reverter.commit();
            tracing::info!(
                server_name,
                webserver = %server.code(),
                path = %outcome.config_path.display(),
                created = outcome.created,
                "Certificate deployed"
            );
            Ok(DeployReport {
                webserver: server.code(),
                server_name: server_name.to_string(),
                outcome,
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, server_name, webserver = %server.code(), "Deployment failed, rolling back");
            if let Err(rollback) = reverter.rollback() {
                tracing::error!(error = %rollback, server_name, "Rollback failed");
            }
            Err(e)
        }
    }
}
