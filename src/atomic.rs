//! Atomic write-to-temp-then-rename discipline, used by every component
//! that emits request, response, or rejection files: writes are
//! synchronous and use an atomic temp-file-plus-rename to avoid torn
//! reads by a concurrent watcher.

use crate::error::{RpcError, RpcResult};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Writes `contents` to `path` by first writing to a sibling temp file
/// and renaming it into place, so peers watching the directory never
/// observe a partially written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> RpcResult<()> {
    let dir = path.parent().ok_or_else(|| RpcError::AtomicWrite {
        path: path.to_path_buf(),
    })?;
    std::fs::create_dir_all(dir).map_err(|e| RpcError::Io {
        source: e,
        path: Some(dir.to_path_buf()),
    })?;

    let tmp_name = format!(".{}.tmp-{}", file_name(path), Uuid::new_v4());
    let tmp_path = dir.join(tmp_name);

    let write_result = (|| -> RpcResult<()> {
        let mut file = std::fs::File::create(&tmp_path).map_err(|e| RpcError::Io {
            source: e,
            path: Some(tmp_path.clone()),
        })?;
        file.write_all(contents).map_err(|e| RpcError::Io {
            source: e,
            path: Some(tmp_path.clone()),
        })?;
        file.sync_all().map_err(|e| RpcError::Io {
            source: e,
            path: Some(tmp_path.clone()),
        })?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, path).map_err(|_| RpcError::AtomicWrite {
        path: path.to_path_buf(),
    })
}

/// Creates an empty sentinel file atomically — used for the rejection
/// marker, a zero-byte write-once file whose mere existence is the signal.
pub fn write_empty_atomic(path: &Path) -> RpcResult<()> {
    write_atomic(path, &[])
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_and_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.request");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("id.request");
        write_atomic(&path, b"data").unwrap();
        let entries: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn empty_marker_is_zero_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("id.syftrejected.request");
        write_empty_atomic(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
