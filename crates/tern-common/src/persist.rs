//! Small JSON state files written with a tmp-file + rename swap.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::path::Path;

/// Read a JSON file, returning `None` when it does not exist yet.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, io::Error> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Read a JSON file, falling back to `T::default()` when it is missing.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, io::Error> {
    Ok(load_json(path)?.unwrap_or_default())
}

/// Write `value` as pretty JSON. Readers never observe a half-written file:
/// the bytes land in `<path>.tmp` first and are renamed over the target.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn load_json_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<String>> = load_json(&dir.path().join("missing.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn load_json_invalid_returns_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{broken").unwrap();

        let err = load_json::<serde_json::Value>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn save_json_creates_parent_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ids.json");
        let mut map = BTreeMap::new();
        map.insert("/".to_string(), 1u32);

        save_json(&path, &map).unwrap();

        let back: BTreeMap<String, u32> = load_json_or_default(&path).unwrap();
        assert_eq!(back, map);
        assert!(!dir.path().join("nested").join("ids.json.tmp").exists());
    }

    #[test]
    fn save_json_fails_on_directory_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_json(dir.path(), &vec!["a"]).is_err());
    }
}
