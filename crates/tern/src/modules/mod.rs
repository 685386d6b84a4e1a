//! Control-plane command modules.

pub mod certificates;
pub mod main;
pub mod servermonitor;

use std::sync::Arc;

use tern_certs::CertificateManager;
use tern_config::AgentConfig;
use tern_stats::StatsCore;

use crate::server::router::Router;

pub use certificates::CertificatesModule;
pub use main::{HostFacts, MainModule, AGENT_VERSION};
pub use servermonitor::ServerMonitorModule;

/// Router with every module wired to this host's configuration.
pub fn build_router(config: &AgentConfig, stats: Arc<StatsCore>) -> Router {
    let manager = Arc::new(CertificateManager::from_config(config));
    Router::new()
        .with(MainModule::new(manager.webservers().to_vec()))
        .with(CertificatesModule::new(manager))
        .with(ServerMonitorModule::new(stats))
}
