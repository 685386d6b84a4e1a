//! Webserver configuration for tern.
//!
//! A small block-tree model of nginx and Apache configuration files, and the
//! operations the agent performs on it: vhost discovery, certificate
//! deployment and the shared ACME challenge directory. Every mutation goes
//! through a [`tern_reverter::Reverter`].

pub mod apache;
pub mod commondir;
pub mod conf;
pub mod deployer;
pub mod error;
pub mod host;
pub mod nginx;
pub mod process;
pub mod site;
pub mod vhost;
pub mod webserver;

pub use commondir::{CommonDirManager, CommonDirStatus};
pub use deployer::{CertificateDeployer, DeployOutcome};
pub use error::WebserverError;
pub use host::SitesHostManager;
pub use process::{CommandProcessManager, ProcessManager};
pub use vhost::{merge_vhosts, Address, Vhost, WebserverCode};
pub use webserver::{
    all_vhosts, webserver_by_code, webservers_from_config, Apache, Nginx, SiteWebserver, Webserver,
};
