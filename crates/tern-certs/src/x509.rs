//! PEM bundle splitting and X.509 inspection.

use chrono::{DateTime, Utc};
use ::pem::{EncodeConfig, LineEnding, Pem};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::CertError;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// What the control plane is shown about a certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    pub dns_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial: String,
    /// SHA-256 of the DER encoding, lowercase hex.
    pub fingerprint: String,
    pub valid_now: bool,
}

impl CertificateInfo {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Names the certificate covers: SANs, or the CN when there are none.
    pub fn domains(&self) -> Vec<String> {
        if !self.dns_names.is_empty() {
            return self.dns_names.clone();
        }
        self.common_name.iter().cloned().collect()
    }
}

/// Lowercase hex SHA-256 of `der`.
pub fn fingerprint_sha256(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, CertError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CertError::InvalidCertificate(format!("timestamp {secs} out of range")))
}

/// Parse one DER certificate.
pub fn inspect_der(der: &[u8]) -> Result<CertificateInfo, CertError> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| CertError::InvalidCertificate(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    let mut dns_names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                dns_names.push(dns.to_string());
            }
        }
    }

    let not_before = timestamp(cert.validity().not_before.timestamp())?;
    let not_after = timestamp(cert.validity().not_after.timestamp())?;
    let serial = cert
        .raw_serial()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":");

    let now = Utc::now();
    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        dns_names,
        not_before,
        not_after,
        serial,
        fingerprint: fingerprint_sha256(der),
        valid_now: not_before <= now && now <= not_after,
    })
}

/// A PEM upload split into its parts.
#[derive(Debug, Clone)]
pub struct PemBundle {
    pub leaf: Pem,
    pub chain: Vec<Pem>,
    pub key: Option<Pem>,
}

fn encode(pem: &Pem) -> String {
    ::pem::encode_config(pem, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

impl PemBundle {
    /// Split concatenated PEM text. The first certificate is the leaf, the
    /// rest form the chain; the first `*PRIVATE KEY` block is the key.
    pub fn parse(text: &str) -> Result<Self, CertError> {
        let blocks =
            ::pem::parse_many(text).map_err(|e| CertError::InvalidCertificate(e.to_string()))?;

        let mut certificates = Vec::new();
        let mut key = None;
        for block in blocks {
            if block.tag() == CERTIFICATE_TAG {
                certificates.push(block);
            } else if block.tag().ends_with("PRIVATE KEY") {
                if key.is_none() {
                    key = Some(block);
                }
            } else {
                tracing::debug!(tag = block.tag(), "Ignoring PEM block");
            }
        }

        let mut certificates = certificates.into_iter();
        let leaf = certificates
            .next()
            .ok_or_else(|| CertError::InvalidCertificate("no certificate in bundle".into()))?;
        Ok(Self {
            leaf,
            chain: certificates.collect(),
            key,
        })
    }

    pub fn inspect(&self) -> Result<CertificateInfo, CertError> {
        inspect_der(self.leaf.contents())
    }

    pub fn leaf_pem(&self) -> String {
        encode(&self.leaf)
    }

    pub fn chain_pem(&self) -> String {
        self.chain.iter().map(encode).collect()
    }

    /// Leaf followed by the chain, as webservers want it.
    pub fn fullchain_pem(&self) -> String {
        let mut out = self.leaf_pem();
        out.push_str(&self.chain_pem());
        out
    }

    pub fn key_pem(&self) -> Option<String> {
        self.key.as_ref().map(encode)
    }
}
