//! Certificate deployment into server blocks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tern_reverter::Reverter;

use crate::conf::ConfigFile;
use crate::error::WebserverError;
use crate::site::{canonical, BlockRef, SiteFiles, SiteSyntax};

/// Where a certificate ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployOutcome {
    pub config_path: PathBuf,
    /// A new SSL sibling file was written; the caller must enable it.
    pub created: bool,
}

pub trait CertificateDeployer: Send + Sync {
    /// Point the SSL server block for `server_name` at `certificate`/`key`,
    /// creating the SSL block if the vhost only has a plaintext one. Every
    /// file touched is recorded in `reverter`; nothing is reloaded here.
    fn deploy(
        &self,
        reverter: &mut Reverter,
        server_name: &str,
        certificate: &Path,
        key: &Path,
    ) -> Result<DeployOutcome, WebserverError>;
}

/// `<stem>-ssl<.ext>` next to `path`.
pub fn ssl_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-ssl.{}", ext.to_string_lossy()),
        None => format!("{stem}-ssl"),
    };
    path.with_file_name(name)
}

pub struct SiteDeployer<S: SiteSyntax> {
    syntax: Arc<S>,
    root_config: PathBuf,
}

impl<S: SiteSyntax> SiteDeployer<S> {
    pub fn new(syntax: Arc<S>, root_config: PathBuf) -> Self {
        Self {
            syntax,
            root_config,
        }
    }

    fn update_in_place(
        &self,
        reverter: &mut Reverter,
        files: &mut SiteFiles,
        at: &BlockRef,
        certificate: &Path,
        key: &Path,
    ) -> Result<DeployOutcome, WebserverError> {
        // Edit the real file so the backup never lands in sites-enabled.
        let path = canonical(&files.files[at.file].path);
        files.files[at.file].path = path.clone();
        reverter.backup_config(&path)?;
        if let Some(block) = files.block_mut(at) {
            self.syntax.set_certificate(block, certificate, key);
        }
        files.files[at.file].save()?;
        tracing::info!(path = %path.display(), "Updated certificate in existing SSL block");
        Ok(DeployOutcome {
            config_path: path,
            created: false,
        })
    }
}

impl<S: SiteSyntax> CertificateDeployer for SiteDeployer<S> {
    fn deploy(
        &self,
        reverter: &mut Reverter,
        server_name: &str,
        certificate: &Path,
        key: &Path,
    ) -> Result<DeployOutcome, WebserverError> {
        let mut files = SiteFiles::load(self.syntax.as_ref(), &self.root_config)?;
        let matches = files.blocks_for(self.syntax.as_ref(), server_name);
        if matches.is_empty() {
            return Err(WebserverError::VhostNotFound(server_name.to_string()));
        }

        let ssl_match = matches
            .iter()
            .find(|at| files.block(at).is_some_and(|b| self.syntax.is_ssl(b)))
            .cloned();
        if let Some(at) = ssl_match {
            return self.update_in_place(reverter, &mut files, &at, certificate, key);
        }

        let plain = &matches[0];
        let Some(source) = files.block(plain).cloned() else {
            return Err(WebserverError::VhostNotFound(server_name.to_string()));
        };
        // Siblings live next to the real file, not next to a sites-enabled link.
        let sibling = ssl_sibling(&canonical(&files.files[plain.file].path));

        // Whatever is on disk there was not loaded as this vhost's SSL block.
        if sibling.exists() {
            return Err(WebserverError::SslConfigExists(sibling));
        }

        let mut block = source;
        self.syntax.rewrite_for_ssl(&mut block);
        self.syntax.set_certificate(&mut block, certificate, key);
        let file = ConfigFile {
            path: sibling.clone(),
            dialect: self.syntax.dialect(),
            nodes: self.syntax.wrap_ssl_file(block),
        };

        reverter.add_config_to_deletion(&sibling)?;
        file.save()?;
        // Parse the dump back so a malformed file never reaches a reload.
        ConfigFile::load(&sibling, self.syntax.dialect())?;

        tracing::info!(path = %sibling.display(), server_name, "Created SSL virtual host");
        Ok(DeployOutcome {
            config_path: sibling,
            created: true,
        })
    }
}
