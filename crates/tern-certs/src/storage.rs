//! Named certificates on disk.
//!
//! A certificate `<name>` is a flat group of files in the storage dir:
//! - `<name>.pem` leaf, chain and key in one bundle; what webservers load
//! - `<name>.crt` leaf only
//! - `<name>.issuer.crt` intermediates (may be empty)
//! - `<name>.key` private key (0600 on Unix)
//! - `<name>.json` [`StoredCertificate`]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tern_common::persist;

use crate::error::CertError;
use crate::x509::{CertificateInfo, PemBundle};

const BUNDLE_EXT: &str = "pem";
const LEAF_EXT: &str = "crt";
const ISSUER_EXT: &str = "issuer.crt";
const KEY_EXT: &str = "key";
const META_EXT: &str = "json";
const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CertSource {
    Uploaded,
    Issued,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCertificate {
    pub name: String,
    pub source: CertSource,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub info: CertificateInfo,
}

/// Files a webserver is pointed at.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CertificatePaths {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// PEM text handed back for download.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CertificateDownload {
    pub name: String,
    pub certificate: String,
    pub chain: String,
    pub private_key: String,
}

/// Storage name for a domain: `*.example.com` becomes `wildcard.example.com`.
pub fn name_for_domain(domain: &str) -> String {
    match domain.strip_prefix("*.") {
        Some(rest) => format!("wildcard.{rest}"),
        None => domain.to_string(),
    }
}

fn validate_name(name: &str) -> Result<(), CertError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(CertError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CertificateStorage {
    dir: PathBuf,
}

impl CertificateStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{name}.{ext}"))
    }

    fn files(name: &str) -> [String; 5] {
        [BUNDLE_EXT, LEAF_EXT, ISSUER_EXT, KEY_EXT, META_EXT].map(|ext| format!("{name}.{ext}"))
    }

    /// Validated name whose metadata file exists.
    fn existing(&self, name: &str) -> Result<(), CertError> {
        validate_name(name)?;
        if !self.file(name, META_EXT).is_file() {
            return Err(CertError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Every stored certificate, by name. Unreadable metadata is logged
    /// and skipped.
    pub fn list(&self) -> Result<Vec<StoredCertificate>, CertError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CertError::io(&self.dir, e)),
        };

        let now = Utc::now();
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let meta = entry.path();
            if meta.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            match persist::load_json::<StoredCertificate>(&meta) {
                Ok(Some(mut stored)) => {
                    stored.info.valid_now = stored.info.is_valid_at(now);
                    out.push(stored);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, path = %meta.display(), "Skipping unreadable certificate metadata");
                }
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn data(&self, name: &str) -> Result<StoredCertificate, CertError> {
        self.existing(name)?;
        let meta = self.file(name, META_EXT);
        let mut stored = persist::load_json::<StoredCertificate>(&meta)
            .map_err(|e| CertError::io(&meta, e))?
            .ok_or_else(|| CertError::NotFound(name.to_string()))?;
        stored.info.valid_now = stored.info.is_valid_at(Utc::now());
        Ok(stored)
    }

    /// Store a certificate under `name`, replacing any previous one.
    /// `certificate` may already contain the key; otherwise `key` must.
    pub fn store(
        &self,
        name: &str,
        certificate: &str,
        key: Option<&str>,
        source: CertSource,
    ) -> Result<StoredCertificate, CertError> {
        validate_name(name)?;
        let mut text = certificate.to_string();
        if let Some(key) = key {
            text.push('\n');
            text.push_str(key);
        }
        let bundle = PemBundle::parse(&text)?;
        let key_pem = bundle.key_pem().ok_or(CertError::MissingKey)?;
        let info = bundle.inspect()?;

        std::fs::create_dir_all(&self.dir).map_err(|e| CertError::io(&self.dir, e))?;
        let write = |ext: &str, contents: &str| {
            let path = self.file(name, ext);
            std::fs::write(&path, contents).map_err(|e| CertError::io(path, e))
        };
        // Key first so the bundle never exists without an owner-only key.
        write(KEY_EXT, &key_pem)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let key_path = self.file(name, KEY_EXT);
            std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| CertError::io(key_path, e))?;
        }
        write(LEAF_EXT, &bundle.leaf_pem())?;
        write(ISSUER_EXT, &bundle.chain_pem())?;
        write(BUNDLE_EXT, &format!("{}{key_pem}", bundle.fullchain_pem()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let bundle_path = self.file(name, BUNDLE_EXT);
            std::fs::set_permissions(&bundle_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| CertError::io(bundle_path, e))?;
        }

        let stored = StoredCertificate {
            name: name.to_string(),
            source,
            created_at: Utc::now(),
            info,
        };
        let meta = self.file(name, META_EXT);
        persist::save_json(&meta, &stored).map_err(|e| CertError::io(meta, e))?;

        tracing::info!(name, dir = %self.dir.display(), "Certificate stored");
        Ok(stored)
    }

    pub fn remove(&self, name: &str) -> Result<(), CertError> {
        self.existing(name)?;
        for file in Self::files(name) {
            let path = self.dir.join(file);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CertError::io(path, e)),
            }
        }
        tracing::info!(name, "Certificate removed");
        Ok(())
    }

    pub fn download(&self, name: &str) -> Result<CertificateDownload, CertError> {
        self.existing(name)?;
        let read = |ext: &str| {
            let path = self.file(name, ext);
            std::fs::read_to_string(&path).map_err(|e| CertError::io(path, e))
        };
        Ok(CertificateDownload {
            name: name.to_string(),
            certificate: read(LEAF_EXT)?,
            chain: read(ISSUER_EXT)?,
            private_key: read(KEY_EXT)?,
        })
    }

    pub fn paths(&self, name: &str) -> Result<CertificatePaths, CertError> {
        self.existing(name)?;
        Ok(CertificatePaths {
            certificate: self.file(name, BUNDLE_EXT),
            key: self.file(name, KEY_EXT),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT: &str = include_str!("../tests/fixtures/example.com.crt");
    const KEY: &str = include_str!("../tests/fixtures/example.com.key");
    const CHAIN: &str = include_str!("../tests/fixtures/chain.crt");

    #[test]
    fn store_list_download_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CertificateStorage::new(dir.path());
        assert!(storage.list().unwrap().is_empty());

        let bundle = format!("{CERT}{CHAIN}");
        let stored = storage
            .store("example.com", &bundle, Some(KEY), CertSource::Uploaded)
            .unwrap();
        assert_eq!(stored.info.dns_names, vec!["example.com", "www.example.com"]);

        let listed = storage.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "example.com");
        assert_eq!(storage.data("example.com").unwrap().source, CertSource::Uploaded);

        let download = storage.download("example.com").unwrap();
        assert_eq!(download.certificate.matches("BEGIN CERTIFICATE").count(), 1);
        assert_eq!(download.chain.matches("BEGIN CERTIFICATE").count(), 1);
        assert!(download.private_key.contains("PRIVATE KEY"));

        let paths = storage.paths("example.com").unwrap();
        assert!(paths.certificate.ends_with("example.com.pem"));
        assert!(dir.path().join("example.com.issuer.crt").is_file());
        assert!(paths.key.is_file());

        storage.remove("example.com").unwrap();
        assert!(matches!(
            storage.data("example.com"),
            Err(CertError::NotFound(_))
        ));
        assert!(matches!(storage.remove("example.com"), Err(CertError::NotFound(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn key_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CertificateStorage::new(dir.path());
        assert!(matches!(
            storage.store("example.com", CERT, None, CertSource::Uploaded),
            Err(CertError::MissingKey)
        ));
        // Key inside the certificate text is fine.
        let combined = format!("{CERT}{KEY}");
        assert!(storage
            .store("example.com", &combined, None, CertSource::Uploaded)
            .is_ok());
    }

    #[test]
    fn names_cannot_escape_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CertificateStorage::new(dir.path());
        for bad in ["", "../etc", ".hidden", "a/b", "*.example.com"] {
            assert!(
                matches!(storage.paths(bad), Err(CertError::InvalidName(_))),
                "{bad:?} accepted"
            );
        }
        assert_eq!(name_for_domain("*.example.com"), "wildcard.example.com");
        assert_eq!(name_for_domain("example.com"), "example.com");
    }

    #[cfg(unix)]
    #[test]
    fn private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let storage = CertificateStorage::new(dir.path());
        storage
            .store("example.com", CERT, Some(KEY), CertSource::Issued)
            .unwrap();
        let mode = std::fs::metadata(storage.paths("example.com").unwrap().key)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
