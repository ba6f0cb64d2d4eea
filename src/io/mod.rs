pub mod checkpoint;
pub mod input;
pub mod journal;
pub mod output;

pub use checkpoint::*;
pub use input::*;
pub use journal::*;
pub use output::*;

use std::io::Write;
use std::path::Path;

use crate::error::StoreError;

/// Replace `path` with `bytes` so readers see either the old or the new file
///
/// Writes `<path>.tmp`, fsyncs it, then renames over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp_path = tmp_path_for(path);
    let mut file = std::fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::corrupt(path, e))?;
    write_atomic(path, &bytes)
}

pub(crate) fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_and_cleans_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!tmp_path_for(&path).exists());
    }
}
