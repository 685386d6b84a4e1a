//! tern agent configuration.
//!
//! The agent reads one TOML file (`<data>/config.toml` by default). Every
//! section is optional; missing keys fall back to the defaults below.

pub mod dirs;
pub mod settings;

pub use settings::{
    AcmeClientKind, AcmeSection, AgentConfig, CertificatesSection, ConfigError, ServerSection, StatisticsSection,
    UpdateSection, WebserverSection,
};
