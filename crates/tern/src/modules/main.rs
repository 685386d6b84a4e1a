//! `main.*`: host facts, virtual hosts and live certificate probes.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysinfo::System;

use tern_certs::probe;
use tern_webserver::{all_vhosts, Webserver, WebserverCode};

use crate::server::router::{params, reply, HandlerError, HandlerResult, Module};

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebserverFacts {
    pub code: WebserverCode,
    /// `None` when the binary could not be run.
    pub version: Option<String>,
}

/// What `main.refresh` reports about the host.
#[derive(Debug, Clone, Serialize)]
pub struct HostFacts {
    pub agent_version: String,
    pub hostname: String,
    pub os: String,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub arch: String,
    pub cpu_count: usize,
    pub memory_total: u64,
    pub uptime_secs: u64,
    pub agent_uptime_secs: u64,
    pub webservers: Vec<WebserverFacts>,
}

impl HostFacts {
    pub fn gather(webservers: &[Arc<dyn Webserver>], started_at: Instant) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();

        let hostname = match hostname::get() {
            Ok(h) => h.to_string_lossy().into_owned(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not determine hostname");
                String::new()
            }
        };

        let webservers = webservers
            .iter()
            .map(|server| {
                let version = match server.process_manager().version() {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::debug!(webserver = %server.code(), error = %e, "Version probe failed");
                        None
                    }
                };
                WebserverFacts {
                    code: server.code(),
                    version,
                }
            })
            .collect();

        Self {
            agent_version: AGENT_VERSION.to_string(),
            hostname,
            os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version(),
            kernel_version: System::kernel_version(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: system.cpus().len(),
            memory_total: system.total_memory(),
            uptime_secs: System::uptime(),
            agent_uptime_secs: started_at.elapsed().as_secs(),
            webservers,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct VhostsParams {
    #[serde(default)]
    webserver: Option<WebserverCode>,
}

#[derive(Debug, Deserialize)]
struct ProbeParams {
    #[serde(alias = "serverName", alias = "server_name")]
    domain: String,
    #[serde(default = "default_tls_port")]
    port: u16,
}

fn default_tls_port() -> u16 {
    443
}

pub struct MainModule {
    webservers: Vec<Arc<dyn Webserver>>,
    started_at: Instant,
}

impl MainModule {
    pub fn new(webservers: Vec<Arc<dyn Webserver>>) -> Self {
        Self {
            webservers,
            started_at: Instant::now(),
        }
    }

    fn vhosts(&self, data: Value) -> HandlerResult {
        let filter: VhostsParams = if data.is_null() {
            VhostsParams::default()
        } else {
            params(data)?
        };
        let mut vhosts = all_vhosts(&self.webservers);
        if let Some(code) = filter.webserver {
            vhosts.retain(|v| v.webservers.contains(&code));
        }
        reply(&vhosts)
    }

    fn probe(&self, data: Value) -> HandlerResult {
        let p: ProbeParams = params(data)?;
        if p.domain.trim().is_empty() {
            return Err(HandlerError::invalid("domain is required"));
        }
        reply(&probe(p.domain.trim(), p.port)?)
    }
}

impl Module for MainModule {
    fn name(&self) -> &'static str {
        "main"
    }

    fn handle(&self, action: &str, data: Value) -> HandlerResult {
        match action {
            "refresh" => reply(&HostFacts::gather(&self.webservers, self.started_at)),
            "getVhosts" => self.vhosts(data),
            "getVhostCertificate" => self.probe(data),
            other => Err(HandlerError::unknown_action(self.name(), other)),
        }
    }
}
