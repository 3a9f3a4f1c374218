//! Whole-file replacement on the local filesystem.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes `content` to `path` so readers see either the old or the new file.
///
/// The data goes to a uniquely named sibling opened with `create_new`, is
/// flushed to disk, then renamed over `path`. The sibling is removed if any
/// step fails.
pub fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let temp_path = temp_sibling(path);
    let result = write_then_rename(&temp_path, path, content);
    if result.is_err() && temp_path.exists() {
        if let Err(e) = std::fs::remove_file(&temp_path) {
            log::warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }
    }
    result
}

fn write_then_rename(temp_path: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(temp_path, path)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_write_atomic_creates_parents() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("nested/dir/doc.json");

        write_atomic(target.path(), b"{}").unwrap();

        target.assert("{}");
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let target = temp.child("doc.json");
        target.write_str("old").unwrap();

        write_atomic(target.path(), b"new").unwrap();

        target.assert("new");
        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
