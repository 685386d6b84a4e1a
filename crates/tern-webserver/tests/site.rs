//! Vhost discovery and challenge-directory toggling against real files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tern_reverter::HostManager;
use tern_webserver::apache::ApacheSyntax;
use tern_webserver::nginx::NginxSyntax;
use tern_webserver::{
    ProcessManager, SiteWebserver, SitesHostManager, Webserver, WebserverCode, WebserverError,
};

/// Counts reloads; fails them on demand.
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
                output: "nginx: [emerg] unexpected end of file".into(),
            });
        }
        Ok(())
    }

    fn version(&self) -> Result<String, WebserverError> {
        Ok("stub/1.0".into())
    }
}

struct NginxLayout {
    _dir: tempfile::TempDir,
    root: PathBuf,
    available: PathBuf,
    enabled: PathBuf,
    common: PathBuf,
}

fn nginx_layout() -> NginxLayout {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nginx.conf");
    let available = dir.path().join("sites-available");
    let enabled = dir.path().join("sites-enabled");
    std::fs::create_dir_all(&available).unwrap();
    std::fs::create_dir_all(&enabled).unwrap();
    std::fs::write(
        &root,
        format!(
            "events {{}}\nhttp {{\n    include {}/*;\n}}\n",
            enabled.display()
        ),
    )
    .unwrap();

    let site = available.join("example.conf");
    std::fs::write(
        &site,
        "server {\n    listen 80;\n    server_name example.com www.example.com;\n    root /srv/example;\n}\n\
         server {\n    listen 443 ssl;\n    server_name example.com;\n    ssl_certificate /c/example.crt;\n    ssl_certificate_key /c/example.key;\n}\n",
    )
    .unwrap();
    SitesHostManager::new(&available, &enabled).enable(&site).unwrap();

    let common = dir.path().join("acme");
    NginxLayout {
        _dir: dir,
        root,
        available,
        enabled,
        common,
    }
}

fn nginx(layout: &NginxLayout, process: Arc<StubProcess>) -> SiteWebserver<NginxSyntax> {
    SiteWebserver::new(
        NginxSyntax,
        layout.root.clone(),
        layout.common.clone(),
        Arc::new(SitesHostManager::new(&layout.available, &layout.enabled)),
        process,
    )
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn nginx_vhosts_merge_plain_and_ssl_blocks() {
    let layout = nginx_layout();
    let server = nginx(&layout, Arc::new(StubProcess::default()));

    let vhosts = server.vhosts().unwrap();
    assert_eq!(vhosts.len(), 1);
    let example = &vhosts[0];
    assert_eq!(example.server_name, "example.com");
    assert_eq!(example.aliases, vec!["www.example.com"]);
    assert!(example.ssl);
    assert_eq!(example.certificate, Some(PathBuf::from("/c/example.crt")));
    assert_eq!(example.document_root.as_deref(), Some("/srv/example"));
    assert_eq!(example.webservers, vec![WebserverCode::Nginx]);

    assert!(server.vhost_by_name("WWW.example.com").unwrap().is_some());
    assert!(server.vhost_by_name("other.org").unwrap().is_none());
}

#[test]
fn common_dir_prefers_ssl_block_and_toggles() {
    let layout = nginx_layout();
    let process = Arc::new(StubProcess::default());
    let server = nginx(&layout, process.clone());
    let manager = server.common_dir_manager();
    let site = layout.available.join("example.conf");

    assert!(!manager.is_enabled("example.com").unwrap());
    assert!(manager.enable("example.com").unwrap());
    assert!(manager.is_enabled("example.com").unwrap());
    assert!(layout.common.join(".well-known/acme-challenge").is_dir());
    assert_eq!(process.reloads.load(Ordering::SeqCst), 1);

    // The location went into the 443 block, after its certificate lines.
    let text = read(&site);
    let ssl_at = text.find("listen 443 ssl;").unwrap();
    let location_at = text.find("location /.well-known/acme-challenge/ {").unwrap();
    assert!(location_at > ssl_at);
    assert!(text.contains("default_type text/plain;"));
    assert!(!layout.available.join("example.conf.back").exists());

    // Enabling twice is a no-op without a reload.
    assert!(!manager.enable("example.com").unwrap());
    assert_eq!(process.reloads.load(Ordering::SeqCst), 1);

    let status = manager.status().unwrap();
    assert_eq!(status.len(), 1);
    assert!(status[0].enabled);

    assert!(manager.disable("example.com").unwrap());
    assert!(!read(&site).contains("acme-challenge"));
    assert!(!manager.disable("example.com").unwrap());
}

#[test]
fn failed_reload_rolls_common_dir_back() {
    let layout = nginx_layout();
    let site = layout.available.join("example.conf");
    let before = read(&site);

    let process = Arc::new(StubProcess {
        fail_reload: true,
        ..Default::default()
    });
    let server = nginx(&layout, process);

    let err = server.common_dir_manager().enable("example.com").unwrap_err();
    assert!(matches!(err, WebserverError::Command { .. }));
    assert_eq!(read(&site), before);
    assert!(!layout.available.join("example.conf.back").exists());
}

#[test]
fn unknown_vhost_is_not_found() {
    let layout = nginx_layout();
    let server = nginx(&layout, Arc::new(StubProcess::default()));
    assert!(matches!(
        server.common_dir_manager().enable("nope.example"),
        Err(WebserverError::VhostNotFound(_))
    ));
}

#[test]
fn apache_vhosts_follow_include_optional() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("apache2.conf");
    std::fs::create_dir(dir.path().join("sites-enabled")).unwrap();
    std::fs::write(
        &root,
        "ServerRoot /etc/apache2\nIncludeOptional sites-enabled/*.conf\nIncludeOptional conf-enabled/*.conf\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("sites-enabled/blog.conf"),
        "<VirtualHost *:80>\n    ServerName blog.example.org\n    DocumentRoot /var/www/blog\n</VirtualHost>\n",
    )
    .unwrap();

    let server = SiteWebserver::new(
        ApacheSyntax,
        root,
        dir.path().join("acme"),
        Arc::new(SitesHostManager::new(
            dir.path().join("sites-available"),
            dir.path().join("sites-enabled"),
        )),
        Arc::new(StubProcess::default()),
    );

    let vhosts = server.vhosts().unwrap();
    assert_eq!(vhosts.len(), 1);
    assert_eq!(vhosts[0].server_name, "blog.example.org");
    assert!(!vhosts[0].ssl);
    assert_eq!(vhosts[0].addresses[0].port, 80);
    assert_eq!(server.code(), WebserverCode::Apache);

    assert!(server.common_dir_manager().enable("blog.example.org").unwrap());
    let text = read(&dir.path().join("sites-enabled/blog.conf"));
    assert!(text.contains("Alias /.well-known/acme-challenge/"));
    assert!(text.contains("Require all granted"));
}
