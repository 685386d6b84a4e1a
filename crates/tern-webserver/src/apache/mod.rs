//! Apache httpd: `<VirtualHost>` sections, `ServerName`/`ServerAlias`,
//! `SSLEngine` and `SSLCertificate*` directives.

use std::path::{Path, PathBuf};

use crate::conf::{unquote, Block, Dialect, Directive, Node};
use crate::site::{split_host_port, SiteSyntax, CHALLENGE_PREFIX};
use crate::vhost::{Address, WebserverCode};

#[derive(Debug, Default, Clone, Copy)]
pub struct ApacheSyntax;

fn strip_server_name(raw: &str) -> String {
    let name = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw);
    match name.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host.to_string(),
        _ => name.to_string(),
    }
}

fn is_challenge_alias(d: &Directive) -> bool {
    d.is("Alias")
        && d.arg(0)
            .is_some_and(|a| a == CHALLENGE_PREFIX || a == CHALLENGE_PREFIX.trim_end_matches('/'))
}

fn is_challenge_directory(b: &Block) -> bool {
    b.is("Directory")
        && b.args.first().is_some_and(|a| {
            unquote(a)
                .trim_end_matches('/')
                .ends_with(CHALLENGE_PREFIX.trim_end_matches('/'))
        })
}

impl SiteSyntax for ApacheSyntax {
    fn code(&self) -> WebserverCode {
        WebserverCode::Apache
    }

    fn dialect(&self) -> Dialect {
        Dialect::Apache
    }

    fn server_block(&self) -> &'static str {
        "VirtualHost"
    }

    fn include_directives(&self) -> &'static [&'static str] {
        &["Include", "IncludeOptional"]
    }

    fn server_names(&self, block: &Block) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(primary) = block.directive("ServerName").and_then(|d| d.arg(0)) {
            names.push(strip_server_name(&primary));
        }
        names.extend(block.directives("ServerAlias").flat_map(|d| d.values()));
        names
    }

    fn addresses(&self, block: &Block) -> Vec<Address> {
        let ssl = self.is_ssl(block);
        block
            .values()
            .iter()
            .map(|raw| {
                let (host, port) = split_host_port(raw);
                Address::new(&host, port.unwrap_or(80), ssl)
            })
            .collect()
    }

    fn is_ssl(&self, block: &Block) -> bool {
        block
            .directive("SSLEngine")
            .and_then(|d| d.arg(0))
            .is_some_and(|v| v.eq_ignore_ascii_case("on"))
    }

    fn document_root(&self, block: &Block) -> Option<String> {
        block.directive("DocumentRoot").and_then(|d| d.arg(0))
    }

    fn certificate(&self, block: &Block) -> (Option<PathBuf>, Option<PathBuf>) {
        let get = |name: &str| {
            block
                .directive(name)
                .and_then(|d| d.arg(0))
                .map(PathBuf::from)
        };
        (get("SSLCertificateFile"), get("SSLCertificateKeyFile"))
    }

    fn rewrite_for_ssl(&self, block: &mut Block) {
        let mut args: Vec<String> = Vec::new();
        for raw in block.values() {
            let (host, _) = split_host_port(&raw);
            let address = format!("{host}:443");
            if !args.contains(&address) {
                args.push(address);
            }
        }
        if args.is_empty() {
            args.push("*:443".to_string());
        }
        block.args = args;
        block.upsert_directive("SSLEngine", &["on"]);
    }

    fn set_certificate(&self, block: &mut Block, certificate: &Path, key: &Path) {
        block.upsert_directive("SSLCertificateFile", &[certificate.to_string_lossy().as_ref()]);
        block.upsert_directive("SSLCertificateKeyFile", &[key.to_string_lossy().as_ref()]);
        // The chain is read from the certificate file.
        block.remove_directives("SSLCertificateChainFile");
    }

    fn wrap_ssl_file(&self, block: Block) -> Vec<Node> {
        let mut wrapper = Block::new("IfModule", &["mod_ssl.c"]);
        wrapper.children.push(Node::Block(block));
        vec![Node::Block(wrapper)]
    }

    fn has_challenge_dir(&self, block: &Block) -> bool {
        block.directives("Alias").any(is_challenge_alias)
    }

    fn add_challenge_dir(&self, block: &mut Block, common_dir: &Path) {
        let target = format!(
            "{}{}",
            common_dir.to_string_lossy().trim_end_matches('/'),
            CHALLENGE_PREFIX
        );
        block
            .children
            .push(Node::Directive(Directive::new("Alias", &[CHALLENGE_PREFIX, target.as_str()])));

        let mut directory = Block::new("Directory", &[]);
        directory.args.push(format!("\"{target}\""));
        directory
            .children
            .push(Node::Directive(Directive::new("Require", &["all", "granted"])));
        block.children.push(Node::Block(directory));
    }

    fn remove_challenge_dir(&self, block: &mut Block) -> bool {
        let aliases = block.remove_directives_where(is_challenge_alias);
        let directories = block.remove_blocks_where(is_challenge_directory);
        aliases + directories > 0
    }
}
