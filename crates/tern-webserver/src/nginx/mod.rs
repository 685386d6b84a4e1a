//! nginx: `server { ... }` blocks, `listen`/`server_name`/`ssl_certificate`.

use std::path::{Path, PathBuf};

use crate::conf::{unquote, Block, Dialect, Directive, Node};
use crate::site::{split_host_port, SiteSyntax, CHALLENGE_PREFIX};
use crate::vhost::{Address, WebserverCode};

#[derive(Debug, Default, Clone, Copy)]
pub struct NginxSyntax;

/// Whether a `listen` directive carries the `ssl` flag.
fn listen_is_ssl(d: &Directive) -> bool {
    d.values().iter().skip(1).any(|a| a == "ssl")
}

impl SiteSyntax for NginxSyntax {
    fn code(&self) -> WebserverCode {
        WebserverCode::Nginx
    }

    fn dialect(&self) -> Dialect {
        Dialect::Nginx
    }

    fn server_block(&self) -> &'static str {
        "server"
    }

    fn include_directives(&self) -> &'static [&'static str] {
        &["include"]
    }

    fn server_names(&self, block: &Block) -> Vec<String> {
        block
            .directives("server_name")
            .flat_map(|d| d.values())
            .filter(|n| n != "_" && !n.is_empty())
            .collect()
    }

    fn addresses(&self, block: &Block) -> Vec<Address> {
        let legacy_ssl = block
            .directive("ssl")
            .and_then(|d| d.arg(0))
            .is_some_and(|v| v.eq_ignore_ascii_case("on"));

        let mut out: Vec<Address> = block
            .directives("listen")
            .filter_map(|d| {
                let raw = d.arg(0)?;
                if raw.starts_with("unix:") {
                    return None;
                }
                let (host, port) = split_host_port(&raw);
                // `listen example.com;` means port 80 on that host.
                let port = port.unwrap_or(80);
                Some(Address::new(&host, port, listen_is_ssl(d) || legacy_ssl))
            })
            .collect();

        if out.is_empty() {
            out.push(Address::new("*", 80, legacy_ssl));
        }
        out
    }

    fn is_ssl(&self, block: &Block) -> bool {
        self.addresses(block).iter().any(|a| a.ssl)
    }

    fn document_root(&self, block: &Block) -> Option<String> {
        block.directive("root").and_then(|d| d.arg(0))
    }

    fn certificate(&self, block: &Block) -> (Option<PathBuf>, Option<PathBuf>) {
        let get = |name: &str| {
            block
                .directive(name)
                .and_then(|d| d.arg(0))
                .map(PathBuf::from)
        };
        (get("ssl_certificate"), get("ssl_certificate_key"))
    }

    fn rewrite_for_ssl(&self, block: &mut Block) {
        let addresses = self.addresses(block);
        let has_v6 = addresses.iter().any(|a| a.ipv6);
        let has_v4 = addresses.iter().any(|a| !a.ipv6);

        block.remove_directives("listen");
        block.remove_directives("ssl");
        let mut listens = Vec::new();
        if has_v4 {
            listens.push(Node::Directive(Directive::new("listen", &["443", "ssl"])));
        }
        if has_v6 {
            listens.push(Node::Directive(Directive::new(
                "listen",
                &["[::]:443", "ssl"],
            )));
        }
        block.children.splice(0..0, listens);
    }

    fn set_certificate(&self, block: &mut Block, certificate: &Path, key: &Path) {
        block.upsert_directive("ssl_certificate", &[certificate.to_string_lossy().as_ref()]);
        block.upsert_directive("ssl_certificate_key", &[key.to_string_lossy().as_ref()]);
    }

    fn has_challenge_dir(&self, block: &Block) -> bool {
        block.blocks("location").any(is_challenge_location)
    }

    fn add_challenge_dir(&self, block: &mut Block, common_dir: &Path) {
        let mut location = Block::new("location", &[CHALLENGE_PREFIX]);
        location.children.push(Node::Directive(Directive::new(
            "root",
            &[common_dir.to_string_lossy().as_ref()],
        )));
        location
            .children
            .push(Node::Directive(Directive::new("default_type", &["text/plain"])));
        block.children.push(Node::Block(location));
    }

    fn remove_challenge_dir(&self, block: &mut Block) -> bool {
        block.remove_blocks_where(|b| b.is("location") && is_challenge_location(b)) > 0
    }
}

fn is_challenge_location(b: &Block) -> bool {
    b.args
        .last()
        .map(|a| unquote(a))
        .is_some_and(|a| a == CHALLENGE_PREFIX || a == CHALLENGE_PREFIX.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::nginx::parse;

    fn server(text: &str) -> Block {
        match parse(text).unwrap().remove(0) {
            Node::Block(b) => b,
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn reads_names_addresses_and_certificate() {
        let block = server(
            "server {\n listen 443 ssl http2;\n listen [::]:443 ssl;\n server_name a.com b.com _;\n root /srv/a;\n ssl_certificate /c/a.crt;\n ssl_certificate_key /c/a.key;\n}\n",
        );
        let syntax = NginxSyntax;
        assert_eq!(syntax.server_names(&block), vec!["a.com", "b.com"]);
        let addresses = syntax.addresses(&block);
        assert_eq!(addresses.len(), 2);
        assert!(addresses.iter().all(|a| a.ssl && a.port == 443));
        assert!(addresses[1].ipv6);
        assert!(syntax.is_ssl(&block));
        assert_eq!(syntax.document_root(&block).as_deref(), Some("/srv/a"));
        assert_eq!(
            syntax.certificate(&block),
            (Some(PathBuf::from("/c/a.crt")), Some(PathBuf::from("/c/a.key")))
        );
    }

    #[test]
    fn missing_listen_defaults_to_port_80() {
        let block = server("server { server_name a.com; }");
        let addresses = NginxSyntax.addresses(&block);
        assert_eq!(addresses, vec![Address::new("*", 80, false)]);
        assert!(!NginxSyntax.is_ssl(&block));
    }

    #[test]
    fn rewrite_keeps_address_families() {
        let syntax = NginxSyntax;

        let mut v4_only = server("server { listen 80; server_name a.com; }");
        syntax.rewrite_for_ssl(&mut v4_only);
        let listens: Vec<_> = v4_only.directives("listen").map(|d| d.values()).collect();
        assert_eq!(listens, vec![vec!["443", "ssl"]]);

        let mut dual = server("server { listen 80; listen [::]:80; server_name a.com; }");
        syntax.rewrite_for_ssl(&mut dual);
        let listens: Vec<_> = dual.directives("listen").map(|d| d.values()).collect();
        assert_eq!(listens, vec![vec!["443", "ssl"], vec!["[::]:443", "ssl"]]);
        assert!(syntax.is_ssl(&dual));
    }

    #[test]
    fn challenge_location_add_detect_remove() {
        let syntax = NginxSyntax;
        let mut block = server("server { listen 80; server_name a.com; location / { } }");
        assert!(!syntax.has_challenge_dir(&block));

        syntax.add_challenge_dir(&mut block, Path::new("/var/lib/tern/acme"));
        assert!(syntax.has_challenge_dir(&block));
        let location = block.blocks("location").last().unwrap();
        assert_eq!(
            location.directive("root").and_then(|d| d.arg(0)).as_deref(),
            Some("/var/lib/tern/acme")
        );

        assert!(syntax.remove_challenge_dir(&mut block));
        assert!(!syntax.has_challenge_dir(&block));
        assert_eq!(block.blocks("location").count(), 1);
        assert!(!syntax.remove_challenge_dir(&mut block));
    }
}
