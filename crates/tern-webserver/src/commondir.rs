//! Shared ACME HTTP-01 challenge directory, wired into a vhost's server block.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tern_reverter::{HostManager, Reverter};

use crate::conf::Block;
use crate::error::WebserverError;
use crate::process::ProcessManager;
use crate::site::{canonical, preferred_block, BlockRef, SiteFiles, SiteSyntax};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonDirStatus {
    pub server_name: String,
    pub enabled: bool,
}

pub trait CommonDirManager: Send + Sync {
    fn common_dir(&self) -> &Path;
    /// Returns `false` when the challenge location was already present.
    fn enable(&self, server_name: &str) -> Result<bool, WebserverError>;
    /// Returns `false` when there was nothing to remove.
    fn disable(&self, server_name: &str) -> Result<bool, WebserverError>;
    fn is_enabled(&self, server_name: &str) -> Result<bool, WebserverError>;
    fn status(&self) -> Result<Vec<CommonDirStatus>, WebserverError>;
}

pub struct SiteCommonDir<S: SiteSyntax> {
    syntax: Arc<S>,
    root_config: PathBuf,
    common_dir: PathBuf,
    host: Arc<dyn HostManager>,
    process: Arc<dyn ProcessManager>,
}

impl<S: SiteSyntax> SiteCommonDir<S> {
    pub fn new(
        syntax: Arc<S>,
        root_config: PathBuf,
        common_dir: PathBuf,
        host: Arc<dyn HostManager>,
        process: Arc<dyn ProcessManager>,
    ) -> Self {
        Self {
            syntax,
            root_config,
            common_dir,
            host,
            process,
        }
    }

    fn locate(&self, server_name: &str) -> Result<(SiteFiles, BlockRef), WebserverError> {
        let files = SiteFiles::load(self.syntax.as_ref(), &self.root_config)?;
        let candidates = files.blocks_for(self.syntax.as_ref(), server_name);
        let at = preferred_block(&files, self.syntax.as_ref(), &candidates)
            .ok_or_else(|| WebserverError::VhostNotFound(server_name.to_string()))?;
        Ok((files, at))
    }

    /// Back up, apply `edit`, dump, test, reload; commit or roll back.
    fn apply(
        &self,
        mut files: SiteFiles,
        at: BlockRef,
        edit: impl FnOnce(&S, &mut Block),
    ) -> Result<(), WebserverError> {
        let path = canonical(&files.files[at.file].path);
        files.files[at.file].path = path.clone();

        let mut reverter = Reverter::new(self.host.clone());
        let result: Result<(), WebserverError> = (|| {
            reverter.backup_config(&path)?;
            if let Some(block) = files.block_mut(&at) {
                edit(self.syntax.as_ref(), block);
            }
            files.files[at.file].save()?;
            self.process.test_config()?;
            self.process.reload()
        })();

        match result {
            Ok(()) => {
                reverter.commit();
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = reverter.rollback() {
                    tracing::error!(error = %rollback, path = %path.display(), "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

impl<S: SiteSyntax> CommonDirManager for SiteCommonDir<S> {
    fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    fn enable(&self, server_name: &str) -> Result<bool, WebserverError> {
        let (files, at) = self.locate(server_name)?;
        if files
            .block(&at)
            .is_some_and(|b| self.syntax.has_challenge_dir(b))
        {
            return Ok(false);
        }

        std::fs::create_dir_all(self.common_dir.join(".well-known/acme-challenge")).map_err(
            |source| WebserverError::Io {
                path: self.common_dir.clone(),
                source,
            },
        )?;

        let common_dir = self.common_dir.clone();
        self.apply(files, at, |syntax, block| {
            syntax.add_challenge_dir(block, &common_dir)
        })?;
        tracing::info!(server_name, webserver = %self.syntax.code(), "Enabled ACME challenge directory");
        Ok(true)
    }

    fn disable(&self, server_name: &str) -> Result<bool, WebserverError> {
        let (files, at) = self.locate(server_name)?;
        if !files
            .block(&at)
            .is_some_and(|b| self.syntax.has_challenge_dir(b))
        {
            return Ok(false);
        }

        self.apply(files, at, |syntax, block| {
            syntax.remove_challenge_dir(block);
        })?;
        tracing::info!(server_name, webserver = %self.syntax.code(), "Disabled ACME challenge directory");
        Ok(true)
    }

    fn is_enabled(&self, server_name: &str) -> Result<bool, WebserverError> {
        let (files, at) = self.locate(server_name)?;
        Ok(files
            .block(&at)
            .is_some_and(|b| self.syntax.has_challenge_dir(b)))
    }

    fn status(&self) -> Result<Vec<CommonDirStatus>, WebserverError> {
        let files = SiteFiles::load(self.syntax.as_ref(), &self.root_config)?;
        let mut out: Vec<CommonDirStatus> = Vec::new();
        for at in files.server_blocks(self.syntax.as_ref()) {
            let Some(block) = files.block(&at) else { continue };
            let Some(name) = self.syntax.server_names(block).into_iter().next() else {
                continue;
            };
            let enabled = self.syntax.has_challenge_dir(block);
            match out
                .iter_mut()
                .find(|s| s.server_name.eq_ignore_ascii_case(&name))
            {
                Some(existing) => existing.enabled |= enabled,
                None => out.push(CommonDirStatus {
                    server_name: name,
                    enabled,
                }),
            }
        }
        Ok(out)
    }
}
