//! Certificate deployment end to end against a throwaway nginx layout.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tern_certs::{
    AcmeClient, CertError, CertificateManager, CertificateStorage, IssueRequest, IssuedFiles,
};
use tern_config::AcmeSection;
use tern_reverter::HostManager;
use tern_webserver::nginx::NginxSyntax;
use tern_webserver::{ProcessManager, SiteWebserver, SitesHostManager, Webserver, WebserverError};

const CERT: &str = include_str!("fixtures/example.com.crt");
const KEY: &str = include_str!("fixtures/example.com.key");

const PLAIN_SITE: &str = "\
server {
    listen 80;
    listen [::]:80;
    server_name example.com www.example.com;
    root /srv/example;
}
";

#[derive(Default)]
struct StubProcess {
    fail_reload: bool,
    reloads: AtomicUsize,
}

impl ProcessManager for StubProcess {
    fn test_config(&self) -> Result<(), WebserverError> {
        Ok(())
    }

    fn reload(&self) -> Result<(), WebserverError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reload {
            return Err(WebserverError::Command {
                command: "nginx -s reload".into(),
                output: "nginx: [emerg] cannot load certificate".into(),
            });
        }
        Ok(())
    }

    fn version(&self) -> Result<String, WebserverError> {
        Ok("nginx/1.24.0".into())
    }
}

/// Copies the fixture certificate where certbot would have put it.
struct StubAcme {
    requests: AtomicUsize,
}

impl AcmeClient for StubAcme {
    fn name(&self) -> &str {
        "stub"
    }

    fn issue(&self, request: &IssueRequest) -> Result<IssuedFiles, CertError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        assert!(request.webroot.join(".well-known/acme-challenge").is_dir());
        let dir = request.work_dir.join("live");
        std::fs::create_dir_all(&dir).unwrap();
        let files = IssuedFiles {
            certificate: dir.join("fullchain.pem"),
            key: dir.join("privkey.pem"),
        };
        std::fs::write(&files.certificate, CERT).unwrap();
        std::fs::write(&files.key, KEY).unwrap();
        Ok(files)
    }
}

struct Host {
    dir: tempfile::TempDir,
    available: PathBuf,
    enabled: PathBuf,
}

impl Host {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let available = root.join("sites-available");
        let enabled = root.join("sites-enabled");
        std::fs::create_dir_all(&available).unwrap();
        std::fs::create_dir_all(&enabled).unwrap();
        std::fs::write(
            root.join("nginx.conf"),
            format!("http {{\n    include {}/*;\n}}\n", enabled.display()),
        )
        .unwrap();

        let site = available.join("example.conf");
        std::fs::write(&site, PLAIN_SITE).unwrap();
        SitesHostManager::new(&available, &enabled)
            .enable(&site)
            .unwrap();
        Self {
            dir,
            available,
            enabled,
        }
    }

    fn root(&self) -> PathBuf {
        self.available.parent().unwrap().to_path_buf()
    }

    fn nginx(&self, process: Arc<StubProcess>) -> Arc<dyn Webserver> {
        Arc::new(SiteWebserver::new(
            NginxSyntax,
            self.root().join("nginx.conf"),
            self.root().join("acme"),
            Arc::new(SitesHostManager::new(&self.available, &self.enabled)),
            process,
        ))
    }

    fn manager(&self, process: Arc<StubProcess>) -> CertificateManager {
        let acme = AcmeSection {
            common_dir: Some(self.root().join("acme")),
            work_dir: Some(self.root().join("acme-work")),
            ..Default::default()
        };
        CertificateManager::new(
            CertificateStorage::new(self.root().join("certificates")),
            vec![self.nginx(process)],
            Box::new(StubAcme {
                requests: AtomicUsize::new(0),
            }),
            acme,
        )
    }

    fn fixture_files(&self) -> (PathBuf, PathBuf) {
        let cert = self.dir.path().join("example.crt");
        let key = self.dir.path().join("example.key");
        std::fs::write(&cert, CERT).unwrap();
        std::fs::write(&key, KEY).unwrap();
        (cert, key)
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn no_backups(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .all(|e| !e.file_name().to_string_lossy().ends_with(".back"))
}

#[test]
fn deploy_creates_enabled_ssl_sibling() {
    let host = Host::new();
    let process = Arc::new(StubProcess::default());
    let manager = host.manager(process.clone());
    let (cert, key) = host.fixture_files();

    let reports = manager.deploy("example.com", &cert, &key).unwrap();
    assert_eq!(reports.len(), 1);
    let sibling = host.available.join("example-ssl.conf");
    assert!(reports[0].outcome.created);
    assert_eq!(reports[0].outcome.config_path, sibling);
    assert_eq!(process.reloads.load(Ordering::SeqCst), 1);

    // The plaintext file is untouched; the sibling is enabled and complete.
    assert_eq!(read(&host.available.join("example.conf")), PLAIN_SITE);
    assert!(std::fs::symlink_metadata(host.enabled.join("example-ssl.conf")).is_ok());
    let text = read(&sibling);
    assert!(text.contains("listen 443 ssl;"));
    assert!(text.contains("listen [::]:443 ssl;"));
    assert!(!text.contains("listen 80;"));
    assert!(text.contains(&format!("ssl_certificate {};", cert.display())));
    assert!(text.contains(&format!("ssl_certificate_key {};", key.display())));
    assert!(no_backups(&host.available));

    let vhost = manager
        .vhosts()
        .into_iter()
        .find(|v| v.server_name == "example.com")
        .unwrap();
    assert!(vhost.ssl);
    assert_eq!(vhost.certificate.as_deref(), Some(cert.as_path()));
}

#[test]
fn failed_reload_leaves_no_trace() {
    let host = Host::new();
    let process = Arc::new(StubProcess {
        fail_reload: true,
        ..Default::default()
    });
    let manager = host.manager(process);
    let (cert, key) = host.fixture_files();

    let err = manager.deploy("example.com", &cert, &key).unwrap_err();
    assert!(matches!(
        err,
        CertError::Webserver(WebserverError::Command { .. })
    ));

    assert!(!host.available.join("example-ssl.conf").exists());
    assert!(std::fs::symlink_metadata(host.enabled.join("example-ssl.conf")).is_err());
    assert_eq!(read(&host.available.join("example.conf")), PLAIN_SITE);
    assert!(no_backups(&host.available));

    let vhosts = manager.vhosts();
    assert_eq!(vhosts.len(), 1);
    assert!(!vhosts[0].ssl);
}

#[cfg(unix)]
#[test]
fn rollback_keeps_a_link_that_predates_the_deployment() {
    let host = Host::new();
    let link = host.enabled.join("example-ssl.conf");
    std::os::unix::fs::symlink(host.available.join("example-ssl.conf"), &link).unwrap();
    let process = Arc::new(StubProcess {
        fail_reload: true,
        ..Default::default()
    });
    let manager = host.manager(process);
    let (cert, key) = host.fixture_files();

    assert!(manager.deploy("example.com", &cert, &key).is_err());
    assert!(!host.available.join("example-ssl.conf").exists());
    assert!(std::fs::symlink_metadata(&link).is_ok());
}

#[test]
fn redeploy_updates_existing_ssl_block_in_place() {
    let host = Host::new();
    let manager = host.manager(Arc::new(StubProcess::default()));
    let (cert, key) = host.fixture_files();
    manager.deploy("example.com", &cert, &key).unwrap();

    let stored = manager
        .upload(Some("example.com"), CERT, Some(KEY), Some("www.example.com"))
        .unwrap();
    assert_eq!(stored.deployed.len(), 1);
    assert!(!stored.deployed[0].outcome.created);

    let paths = manager.storage().paths("example.com").unwrap();
    let text = read(&host.available.join("example-ssl.conf"));
    assert!(text.contains(&format!("ssl_certificate {};", paths.certificate.display())));
    assert_eq!(text.matches("ssl_certificate ").count(), 1);
}

#[test]
fn unknown_vhost_is_refused_before_any_change() {
    let host = Host::new();
    let manager = host.manager(Arc::new(StubProcess::default()));
    let (cert, key) = host.fixture_files();
    assert!(matches!(
        manager.deploy("nope.example", &cert, &key),
        Err(CertError::Webserver(WebserverError::VhostNotFound(_)))
    ));
    assert!(!host.available.join("nope.example-ssl.conf").exists());
}

#[test]
fn issue_enables_challenge_dir_then_stores_and_deploys() {
    let host = Host::new();
    let manager = host.manager(Arc::new(StubProcess::default()));

    let issued = manager
        .issue(&["example.com".to_string()], true)
        .unwrap();
    assert_eq!(issued.certificate.name, "example.com");
    assert_eq!(issued.deployed.len(), 1);
    assert!(issued.deployed[0].outcome.created);

    let status = manager.common_dir_status().unwrap();
    assert!(status.iter().any(|s| s.status.enabled));
    assert!(read(&host.available.join("example.conf")).contains("acme-challenge"));

    // Turning it off again reports a change exactly once.
    assert!(manager.set_common_dir("example.com", false).unwrap());
    assert!(!manager.set_common_dir("example.com", false).unwrap());
}
