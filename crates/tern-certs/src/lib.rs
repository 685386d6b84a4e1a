//! Certificates for tern: storage, ACME issuance, TLS probing, and
//! transactional deployment into the host's webservers.

pub mod acme;
pub mod error;
pub mod manager;
pub mod probe;
pub mod storage;
pub mod x509;

pub use acme::{client_from_config, AcmeClient, Certbot, IssueRequest, IssuedFiles, Lego};
pub use error::CertError;
pub use manager::{
    deploy_to, CertificateManager, DeployReport, StoredAndDeployed, WebserverCommonDirStatus,
};
pub use probe::{probe, probe_with_timeout, PROBE_TIMEOUT};
pub use storage::{
    name_for_domain, CertSource, CertificateDownload, CertificatePaths, CertificateStorage,
    StoredCertificate,
};
pub use x509::{fingerprint_sha256, inspect_der, CertificateInfo, PemBundle};
