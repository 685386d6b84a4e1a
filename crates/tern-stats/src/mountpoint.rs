//! Stable small integer ids for mountpoints, so disk metric codes stay
//! short and file-name safe (`diskusage3` rather than a path).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tern_common::persist;

use crate::error::StatsError;

pub struct MountpointIdMapper {
    path: PathBuf,
    ids: Mutex<BTreeMap<String, u32>>,
}

impl MountpointIdMapper {
    /// Load the mapping at `path`; a missing file starts empty.
    pub fn load(path: &Path) -> Result<Self, StatsError> {
        let ids: BTreeMap<String, u32> =
            persist::load_json_or_default(path).map_err(|source| StatsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            ids: Mutex::new(ids),
        })
    }

    /// Id for `mountpoint`, assigning `max + 1` and persisting when new.
    /// Ids are never reused.
    pub fn id_for(&self, mountpoint: &str) -> Result<u32, StatsError> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = ids.get(mountpoint) {
            return Ok(*id);
        }

        let id = ids.values().copied().max().unwrap_or(0) + 1;
        ids.insert(mountpoint.to_string(), id);
        if let Err(source) = persist::save_json(&self.path, &*ids) {
            ids.remove(mountpoint);
            return Err(StatsError::Io {
                path: self.path.clone(),
                source,
            });
        }
        tracing::debug!(mountpoint, id, "Assigned mountpoint id");
        Ok(id)
    }

    /// Reverse lookup for display.
    pub fn mountpoint_for(&self, id: u32) -> Option<String> {
        let ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.clone())
    }
}
