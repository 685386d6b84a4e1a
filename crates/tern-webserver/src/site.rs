//! Dialect-specific reading and editing of server blocks, and discovery of
//! every file reachable from a root config through include directives.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::conf::{find_blocks, find_directives, Block, BlockPath, ConfigFile, Dialect, Node};
use crate::error::WebserverError;
use crate::vhost::{Address, Vhost, WebserverCode};

/// URL prefix answered from the shared ACME challenge directory.
pub const CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// How one webserver product spells the things the agent cares about.
pub trait SiteSyntax: Send + Sync + 'static {
    fn code(&self) -> WebserverCode;
    fn dialect(&self) -> Dialect;

    /// Block name of a virtual host (`server`, `VirtualHost`).
    fn server_block(&self) -> &'static str;
    /// Directive names that pull in more files.
    fn include_directives(&self) -> &'static [&'static str];

    /// Primary name first, aliases after.
    fn server_names(&self, block: &Block) -> Vec<String>;
    fn addresses(&self, block: &Block) -> Vec<Address>;
    fn is_ssl(&self, block: &Block) -> bool;
    fn document_root(&self, block: &Block) -> Option<String>;
    fn certificate(&self, block: &Block) -> (Option<PathBuf>, Option<PathBuf>);

    /// Turn a copy of a plaintext block into its port-443 SSL counterpart.
    fn rewrite_for_ssl(&self, block: &mut Block);
    fn set_certificate(&self, block: &mut Block, certificate: &Path, key: &Path);
    /// Top-level nodes of a freshly created SSL sibling file.
    fn wrap_ssl_file(&self, block: Block) -> Vec<Node> {
        vec![Node::Block(block)]
    }

    fn has_challenge_dir(&self, block: &Block) -> bool;
    fn add_challenge_dir(&self, block: &mut Block, common_dir: &Path);
    /// Returns whether anything was removed.
    fn remove_challenge_dir(&self, block: &mut Block) -> bool;
}

/// A server block located inside one of the loaded files.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRef {
    pub file: usize,
    pub path: BlockPath,
}

/// The root config plus every file it includes, transitively.
#[derive(Debug, Clone)]
pub struct SiteFiles {
    pub files: Vec<ConfigFile>,
}

impl SiteFiles {
    /// Load `root` and follow include globs. Relative patterns resolve
    /// against the root config's directory. A broken included file is
    /// logged and skipped; a broken root is an error.
    pub fn load<S: SiteSyntax + ?Sized>(syntax: &S, root: &Path) -> Result<Self, WebserverError> {
        let base = root.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut files = vec![ConfigFile::load(root, syntax.dialect())?];
        let mut seen: HashSet<PathBuf> = HashSet::new();
        seen.insert(canonical(root));

        let mut next = 0;
        while next < files.len() {
            let mut includes = Vec::new();
            for name in syntax.include_directives() {
                for directive in find_directives(&files[next].nodes, name) {
                    if let Some(pattern) = directive.arg(0) {
                        includes.push(pattern);
                    }
                }
            }
            next += 1;

            for pattern in includes {
                for path in expand_include(&base, &pattern) {
                    if !seen.insert(canonical(&path)) {
                        continue;
                    }
                    match ConfigFile::load(&path, syntax.dialect()) {
                        Ok(file) => files.push(file),
                        Err(e) => {
                            tracing::warn!(error = %e, path = %path.display(), "Skipping unreadable include")
                        }
                    }
                }
            }
        }
        Ok(Self { files })
    }

    pub fn block(&self, at: &BlockRef) -> Option<&Block> {
        self.files.get(at.file)?.block(&at.path)
    }

    pub fn block_mut(&mut self, at: &BlockRef) -> Option<&mut Block> {
        self.files.get_mut(at.file)?.block_mut(&at.path)
    }

    pub fn server_blocks<S: SiteSyntax + ?Sized>(&self, syntax: &S) -> Vec<BlockRef> {
        let mut out = Vec::new();
        for (file, config) in self.files.iter().enumerate() {
            for path in find_blocks(&config.nodes, syntax.server_block()) {
                out.push(BlockRef { file, path });
            }
        }
        out
    }

    /// Server blocks answering to `server_name` (primary name or alias).
    pub fn blocks_for<S: SiteSyntax + ?Sized>(&self, syntax: &S, server_name: &str) -> Vec<BlockRef> {
        self.server_blocks(syntax)
            .into_iter()
            .filter(|at| {
                self.block(at).is_some_and(|b| {
                    syntax
                        .server_names(b)
                        .iter()
                        .any(|n| n.eq_ignore_ascii_case(server_name))
                })
            })
            .collect()
    }

    /// One vhost per named server block, unmerged.
    pub fn vhosts<S: SiteSyntax + ?Sized>(&self, syntax: &S) -> Vec<Vhost> {
        let mut out = Vec::new();
        for at in self.server_blocks(syntax) {
            let Some(block) = self.block(&at) else { continue };
            let mut names = syntax.server_names(block).into_iter();
            let Some(server_name) = names.next() else { continue };
            let (certificate, certificate_key) = syntax.certificate(block);
            out.push(Vhost {
                server_name,
                aliases: names.collect(),
                document_root: syntax.document_root(block),
                addresses: syntax.addresses(block),
                ssl: syntax.is_ssl(block),
                certificate,
                certificate_key,
                config_path: self.files[at.file].path.clone(),
                webservers: vec![syntax.code()],
            });
        }
        out
    }
}

/// Pick the block to carry the challenge directory: one listening on 443,
/// else one on 80, else the first.
pub fn preferred_block<S: SiteSyntax + ?Sized>(
    files: &SiteFiles,
    syntax: &S,
    candidates: &[BlockRef],
) -> Option<BlockRef> {
    let on_port = |port: u16| {
        candidates.iter().find(|at| {
            files
                .block(at)
                .is_some_and(|b| syntax.addresses(b).iter().any(|a| a.port == port))
        })
    };
    on_port(443)
        .or_else(|| on_port(80))
        .or_else(|| candidates.first())
        .cloned()
}

fn expand_include(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        base.join(pattern)
    };
    let full = full.to_string_lossy().to_string();

    // Apache accepts a bare directory and includes everything in it.
    let full = if Path::new(&full).is_dir() {
        format!("{}/*", full.trim_end_matches('/'))
    } else {
        full
    };

    match glob::glob(&full) {
        Ok(paths) => {
            let mut out: Vec<PathBuf> = paths
                .filter_map(Result::ok)
                .filter(|p| p.is_file())
                .collect();
            out.sort();
            out
        }
        Err(e) => {
            tracing::warn!(error = %e, pattern = %full, "Invalid include pattern");
            Vec::new()
        }
    }
}

pub(crate) fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Split `host:port` (with optional `[v6]` host) into parts.
pub(crate) fn split_host_port(raw: &str) -> (String, Option<u16>) {
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (format!("[{host}]"), port);
        }
    }
    if let Ok(port) = raw.parse::<u16>() {
        return ("*".to_string(), Some(port));
    }
    match raw.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host.to_string(), port.parse().ok()),
        _ => (raw.to_string(), None),
    }
}
