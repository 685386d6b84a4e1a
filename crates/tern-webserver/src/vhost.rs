use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Webserver products the agent knows how to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WebserverCode {
    Nginx,
    Apache,
}

impl WebserverCode {
    pub const ALL: [WebserverCode; 2] = [WebserverCode::Nginx, WebserverCode::Apache];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nginx => "nginx",
            Self::Apache => "apache",
        }
    }
}

impl fmt::Display for WebserverCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebserverCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nginx" => Ok(Self::Nginx),
            "apache" | "apache2" | "httpd" => Ok(Self::Apache),
            other => Err(format!("unknown webserver: {other}")),
        }
    }
}

/// One listen address of a virtual host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// `*` for the wildcard address.
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub ipv6: bool,
}

impl Address {
    pub fn new(host: &str, port: u16, ssl: bool) -> Self {
        Self {
            host: host.to_string(),
            port,
            ssl,
            ipv6: host.starts_with('[') || host.contains("::"),
        }
    }
}

/// A virtual host as seen by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vhost {
    pub server_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub document_root: Option<String>,
    #[serde(default)]
    pub addresses: Vec<Address>,
    pub ssl: bool,
    #[serde(default)]
    pub certificate: Option<PathBuf>,
    #[serde(default)]
    pub certificate_key: Option<PathBuf>,
    pub config_path: PathBuf,
    pub webservers: Vec<WebserverCode>,
}

impl Vhost {
    pub fn matches(&self, name: &str) -> bool {
        self.server_name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Fold `other` (same server name) into `self`. The SSL side wins for
    /// certificate and config path.
    pub fn absorb(&mut self, other: Vhost) {
        let other_is_ssl = other.ssl && !self.ssl;

        for alias in other.aliases {
            if !self.aliases.iter().any(|a| a.eq_ignore_ascii_case(&alias))
                && !alias.eq_ignore_ascii_case(&self.server_name)
            {
                self.aliases.push(alias);
            }
        }
        for address in other.addresses {
            if !self.addresses.contains(&address) {
                self.addresses.push(address);
            }
        }
        if self.document_root.is_none() {
            self.document_root = other.document_root;
        }
        if other_is_ssl || (self.certificate.is_none() && other.certificate.is_some()) {
            self.certificate = other.certificate;
            self.certificate_key = other.certificate_key;
        }
        if other_is_ssl {
            self.config_path = other.config_path;
        }
        self.ssl |= other.ssl;
        for code in other.webservers {
            if !self.webservers.contains(&code) {
                self.webservers.push(code);
            }
        }
        self.addresses.sort();
        self.webservers.sort();
    }
}

/// Merge vhosts sharing a server name (case-insensitive), keeping the
/// order in which names were first seen.
pub fn merge_vhosts(vhosts: impl IntoIterator<Item = Vhost>) -> Vec<Vhost> {
    let mut merged: Vec<Vhost> = Vec::new();
    for vhost in vhosts {
        match merged
            .iter_mut()
            .find(|v| v.server_name.eq_ignore_ascii_case(&vhost.server_name))
        {
            Some(existing) => existing.absorb(vhost),
            None => merged.push(vhost),
        }
    }
    merged
}
