//! `certificates.*`: issuance, upload, storage and the challenge directory.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use tern_certs::{CertSource, CertificateManager};

use crate::server::router::{params, reply, HandlerError, HandlerResult, Module};

#[derive(Debug, Deserialize)]
struct IssueParams {
    domains: Vec<String>,
    #[serde(default = "default_true")]
    deploy: bool,
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    #[serde(default)]
    name: Option<String>,
    certificate: String,
    #[serde(default, alias = "privateKey")]
    key: Option<String>,
    #[serde(default, alias = "serverName")]
    server_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StoreParams {
    name: String,
    certificate: String,
    #[serde(default, alias = "privateKey")]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignParams {
    name: String,
    #[serde(alias = "serverName")]
    server_name: String,
}

#[derive(Debug, Deserialize)]
struct CommonDirParams {
    #[serde(alias = "serverName")]
    server_name: String,
    enabled: bool,
}

fn default_true() -> bool {
    true
}

pub struct CertificatesModule {
    manager: Arc<CertificateManager>,
}

impl CertificatesModule {
    pub fn new(manager: Arc<CertificateManager>) -> Self {
        Self { manager }
    }

    fn issue(&self, data: Value) -> HandlerResult {
        let p: IssueParams = params(data)?;
        let domains: Vec<String> = p
            .domains
            .iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if domains.is_empty() {
            return Err(HandlerError::invalid("at least one domain is required"));
        }
        reply(&self.manager.issue(&domains, p.deploy)?)
    }

    fn upload(&self, data: Value) -> HandlerResult {
        let p: UploadParams = params(data)?;
        reply(&self.manager.upload(
            p.name.as_deref(),
            &p.certificate,
            p.key.as_deref(),
            p.server_name.as_deref(),
        )?)
    }

    fn store(&self, data: Value) -> HandlerResult {
        let p: StoreParams = params(data)?;
        reply(&self.manager.storage().store(
            &p.name,
            &p.certificate,
            p.key.as_deref(),
            CertSource::Uploaded,
        )?)
    }

    fn remove(&self, data: Value) -> HandlerResult {
        let p: NameParams = params(data)?;
        self.manager.storage().remove(&p.name)?;
        Ok(json!({ "removed": p.name }))
    }

    fn assign(&self, data: Value) -> HandlerResult {
        let p: AssignParams = params(data)?;
        reply(&self.manager.assign(&p.name, &p.server_name)?)
    }

    fn set_common_dir(&self, data: Value) -> HandlerResult {
        let p: CommonDirParams = params(data)?;
        let changed = self.manager.set_common_dir(&p.server_name, p.enabled)?;
        Ok(json!({
            "server_name": p.server_name,
            "enabled": p.enabled,
            "changed": changed,
        }))
    }
}

impl Module for CertificatesModule {
    fn name(&self) -> &'static str {
        "certificates"
    }

    fn handle(&self, action: &str, data: Value) -> HandlerResult {
        let storage = self.manager.storage();
        match action {
            "issue" => self.issue(data),
            "upload" => self.upload(data),
            "storagecertificates" => reply(&storage.list()?),
            "storagecertdata" => reply(&storage.data(&params::<NameParams>(data)?.name)?),
            "storagecertupload" => self.store(data),
            "storagecertremove" => self.remove(data),
            "storagecertdownload" => reply(&storage.download(&params::<NameParams>(data)?.name)?),
            "domainassign" => self.assign(data),
            "commondirstatus" => reply(&self.manager.common_dir_status()?),
            "changecommondirstatus" => self.set_common_dir(data),
            other => Err(HandlerError::unknown_action(self.name(), other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_certs::{client_from_config, CertificateStorage};
    use tern_common::error::ErrorCode;
    use tern_config::AcmeSection;

    const CERT: &str = include_str!("../../../tern-certs/tests/fixtures/example.com.crt");
    const KEY: &str = include_str!("../../../tern-certs/tests/fixtures/example.com.key");

    fn module(dir: &std::path::Path) -> CertificatesModule {
        let acme = AcmeSection {
            common_dir: Some(dir.join("acme")),
            work_dir: Some(dir.join("acme-work")),
            ..Default::default()
        };
        let manager = CertificateManager::new(
            CertificateStorage::new(dir.join("certificates")),
            Vec::new(),
            client_from_config(&acme),
            acme,
        );
        CertificatesModule::new(Arc::new(manager))
    }

    #[test]
    fn storage_round_trip_through_actions() {
        let dir = tempfile::tempdir().unwrap();
        let m = module(dir.path());

        let stored = m
            .handle(
                "storagecertupload",
                json!({"name": "example.com", "certificate": CERT, "privateKey": KEY}),
            )
            .unwrap();
        assert_eq!(stored["name"], "example.com");
        assert_eq!(stored["source"], "uploaded");

        let listed = m.handle("storagecertificates", Value::Null).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let data = m
            .handle("storagecertdata", json!({"name": "example.com"}))
            .unwrap();
        assert_eq!(data["dns_names"], json!(["example.com", "www.example.com"]));

        let download = m
            .handle("storagecertdownload", json!({"name": "example.com"}))
            .unwrap();
        assert!(download["private_key"].as_str().unwrap().contains("PRIVATE KEY"));

        m.handle("storagecertremove", json!({"name": "example.com"}))
            .unwrap();
        let err = m
            .handle("storagecertdata", json!({"name": "example.com"}))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn assign_to_unknown_vhost_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let m = module(dir.path());
        m.handle(
            "storagecertupload",
            json!({"name": "example.com", "certificate": CERT, "key": KEY}),
        )
        .unwrap();
        let err = m
            .handle(
                "domainassign",
                json!({"name": "example.com", "serverName": "example.com"}),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn issue_needs_domains() {
        let dir = tempfile::tempdir().unwrap();
        let m = module(dir.path());
        let err = m.handle("issue", json!({"domains": [" "]})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPayload);
    }

    #[test]
    fn unknown_action_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = module(dir.path())
            .handle("explode", Value::Null)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownCommand);
    }
}
