//! The webserver capability and its nginx/Apache instances.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tern_config::{AgentConfig, WebserverSection};
use tern_reverter::HostManager;

use crate::apache::ApacheSyntax;
use crate::commondir::{CommonDirManager, SiteCommonDir};
use crate::deployer::{CertificateDeployer, SiteDeployer};
use crate::error::WebserverError;
use crate::host::SitesHostManager;
use crate::nginx::NginxSyntax;
use crate::process::{CommandProcessManager, ProcessManager};
use crate::site::{SiteFiles, SiteSyntax};
use crate::vhost::{merge_vhosts, Vhost, WebserverCode};

pub trait Webserver: Send + Sync {
    fn code(&self) -> WebserverCode;
    /// Virtual hosts declared in this server's configuration, one per name.
    fn vhosts(&self) -> Result<Vec<Vhost>, WebserverError>;
    fn host_manager(&self) -> Arc<dyn HostManager>;
    fn process_manager(&self) -> Arc<dyn ProcessManager>;
    fn certificate_deployer(&self) -> &dyn CertificateDeployer;
    fn common_dir_manager(&self) -> &dyn CommonDirManager;

    fn vhost_by_name(&self, name: &str) -> Result<Option<Vhost>, WebserverError> {
        Ok(self.vhosts()?.into_iter().find(|v| v.matches(name)))
    }
}

/// A webserver driven through its config files and vendor binary.
pub struct SiteWebserver<S: SiteSyntax> {
    syntax: Arc<S>,
    root_config: PathBuf,
    host: Arc<dyn HostManager>,
    process: Arc<dyn ProcessManager>,
    deployer: SiteDeployer<S>,
    common_dir: SiteCommonDir<S>,
}

pub type Nginx = SiteWebserver<NginxSyntax>;
pub type Apache = SiteWebserver<ApacheSyntax>;

impl<S: SiteSyntax> SiteWebserver<S> {
    pub fn new(
        syntax: S,
        root_config: PathBuf,
        common_dir: PathBuf,
        host: Arc<dyn HostManager>,
        process: Arc<dyn ProcessManager>,
    ) -> Self {
        let syntax = Arc::new(syntax);
        Self {
            deployer: SiteDeployer::new(syntax.clone(), root_config.clone()),
            common_dir: SiteCommonDir::new(
                syntax.clone(),
                root_config.clone(),
                common_dir,
                host.clone(),
                process.clone(),
            ),
            syntax,
            root_config,
            host,
            process,
        }
    }

    pub fn root_config(&self) -> &Path {
        &self.root_config
    }
}

impl Nginx {
    pub fn from_section(section: &WebserverSection, common_dir: PathBuf) -> Self {
        Self::new(
            NginxSyntax,
            section.root_config.clone(),
            common_dir,
            Arc::new(SitesHostManager::new(
                &section.sites_available,
                &section.sites_enabled,
            )),
            Arc::new(CommandProcessManager::nginx(&section.binary)),
        )
    }
}

impl Apache {
    pub fn from_section(section: &WebserverSection, common_dir: PathBuf) -> Self {
        Self::new(
            ApacheSyntax,
            section.root_config.clone(),
            common_dir,
            Arc::new(SitesHostManager::new(
                &section.sites_available,
                &section.sites_enabled,
            )),
            Arc::new(CommandProcessManager::apache(&section.binary)),
        )
    }
}

impl<S: SiteSyntax> Webserver for SiteWebserver<S> {
    fn code(&self) -> WebserverCode {
        self.syntax.code()
    }

    fn vhosts(&self) -> Result<Vec<Vhost>, WebserverError> {
        let files = SiteFiles::load(self.syntax.as_ref(), &self.root_config)?;
        Ok(merge_vhosts(files.vhosts(self.syntax.as_ref())))
    }

    fn host_manager(&self) -> Arc<dyn HostManager> {
        self.host.clone()
    }

    fn process_manager(&self) -> Arc<dyn ProcessManager> {
        self.process.clone()
    }

    fn certificate_deployer(&self) -> &dyn CertificateDeployer {
        &self.deployer
    }

    fn common_dir_manager(&self) -> &dyn CommonDirManager {
        &self.common_dir
    }
}

fn section_for(config: &AgentConfig, code: WebserverCode) -> &WebserverSection {
    match code {
        WebserverCode::Nginx => &config.nginx,
        WebserverCode::Apache => &config.apache,
    }
}

/// The webserver for `code`, if it is enabled and installed on this host.
pub fn webserver_by_code(
    config: &AgentConfig,
    code: WebserverCode,
) -> Result<Arc<dyn Webserver>, WebserverError> {
    let section = section_for(config, code);
    if !section.is_present() {
        return Err(WebserverError::NotInstalled(code));
    }
    let common_dir = config.acme.common_dir();
    Ok(match code {
        WebserverCode::Nginx => Arc::new(Nginx::from_section(section, common_dir)),
        WebserverCode::Apache => Arc::new(Apache::from_section(section, common_dir)),
    })
}

/// Every enabled webserver whose root config exists.
pub fn webservers_from_config(config: &AgentConfig) -> Vec<Arc<dyn Webserver>> {
    WebserverCode::ALL
        .into_iter()
        .filter_map(|code| match webserver_by_code(config, code) {
            Ok(server) => Some(server),
            Err(e) => {
                tracing::debug!(webserver = %code, error = %e, "Webserver not available");
                None
            }
        })
        .collect()
}

/// Vhosts of every webserver, merged by server name. A webserver whose
/// configuration cannot be read is logged and left out.
pub fn all_vhosts(servers: &[Arc<dyn Webserver>]) -> Vec<Vhost> {
    let mut all = Vec::new();
    for server in servers {
        match server.vhosts() {
            Ok(vhosts) => all.extend(vhosts),
            Err(e) => {
                tracing::warn!(webserver = %server.code(), error = %e, "Failed to read virtual hosts")
            }
        }
    }
    merge_vhosts(all)
}
