//! Storage layer for volume metadata files.
//!
//! Every volume root holds one metadata file, `.bitferry`, a pretty-printed
//! JSON document (see [`VolumeRecord`]). Writes go to the sibling temp file
//! `.bitferry~` first and are then renamed over the canonical name, so a
//! reader (or a crash) only ever sees the old or the new complete document.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::models::{FORMAT_VERSION, VolumeRecord};
use crate::{Error, Result};

/// Metadata file name inside a volume root.
pub const STORAGE: &str = ".bitferry";

/// Temporary sibling used while writing the metadata file.
pub const STORAGE_TEMP: &str = ".bitferry~";

/// Path of the metadata file for a volume root.
pub fn metadata_path(root: &Path) -> PathBuf {
    root.join(STORAGE)
}

/// Path of the temporary metadata file for a volume root.
pub fn temp_path(root: &Path) -> PathBuf {
    root.join(STORAGE_TEMP)
}

/// Check if a volume root carries a metadata file.
pub fn exists(root: &Path) -> bool {
    metadata_path(root).is_file()
}

/// Read and validate the metadata file of a volume root.
///
/// A missing or foreign format marker, or a document that does not match
/// the expected shape, is reported as [`Error::Integrity`].
pub fn read_metadata(root: &Path) -> Result<VolumeRecord> {
    let path = metadata_path(root);
    let content = fs::read_to_string(&path)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| {
            Error::Integrity(format!("unreadable volume storage {}: {}", path.display(), e))
        })?;

    match value.get("bitferry").and_then(|v| v.as_str()) {
        Some(FORMAT_VERSION) => {}
        Some(other) => {
            return Err(Error::Integrity(format!(
                "unsupported volume storage format '{}' in {}",
                other,
                path.display()
            )));
        }
        None => {
            return Err(Error::Integrity(format!(
                "wrong volume storage {}",
                path.display()
            )));
        }
    }

    serde_json::from_value(value)
        .map_err(|e| {
            Error::Integrity(format!("malformed volume storage {}: {}", path.display(), e))
        })
}

/// Atomically replace the metadata file of a volume root.
///
/// The temp file is removed on every exit path.
pub fn write_metadata(root: &Path, record: &VolumeRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    let result = stage(root, json.as_bytes()).and_then(|()| publish(root));
    let _ = remove_if_exists(&temp_path(root));
    result
}

/// Write the temp file and flush it to disk. First half of [`write_metadata`].
pub fn stage(root: &Path, contents: &[u8]) -> Result<()> {
    let mut file = File::create(temp_path(root))?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

/// Rename the temp file over the metadata file. Second half of [`write_metadata`].
pub fn publish(root: &Path) -> Result<()> {
    fs::rename(temp_path(root), metadata_path(root))?;
    Ok(())
}

/// Prepare a root for a fresh volume: create the directory and clear any
/// stale metadata files.
pub fn format(root: &Path) -> Result<()> {
    fs::create_dir_all(root)?;
    remove_if_exists(&metadata_path(root))?;
    remove_if_exists(&temp_path(root))?;
    Ok(())
}

/// Delete only the metadata files of a root, leaving data in place.
pub fn unformat(root: &Path) -> Result<()> {
    remove_if_exists(&metadata_path(root))?;
    remove_if_exists(&temp_path(root))?;
    Ok(())
}

/// Recursively delete every entry of a root directory, keeping the directory itself.
pub fn wipe(root: &Path) -> Result<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Delete a file, treating a missing file as success.
fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(tag: &str) -> VolumeRecord {
        VolumeRecord {
            bitferry: FORMAT_VERSION.to_string(),
            tag: tag.to_string(),
            modified: Utc::now(),
            tasks: Vec::new(),
            vault: BTreeMap::new(),
        }
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        write_metadata(dir.path(), &record("01234567")).unwrap();

        assert!(exists(dir.path()));
        assert!(!temp_path(dir.path()).exists());
        let read = read_metadata(dir.path()).unwrap();
        assert_eq!(read.tag, "01234567");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let dir = TempDir::new().unwrap();
        write_metadata(dir.path(), &record("01234567")).unwrap();

        let content = fs::read_to_string(metadata_path(dir.path())).unwrap();
        assert!(content.contains("\"bitferry\": \"0\""));
        assert!(!content.contains("tasks"));
        assert!(!content.contains("vault"));
        assert!(!content.contains("null"));
    }

    #[test]
    fn test_crash_before_publish_keeps_old_file() {
        let dir = TempDir::new().unwrap();
        write_metadata(dir.path(), &record("aaaaaaaa")).unwrap();

        // Simulated crash: the temp file is fully written but never renamed
        let json = serde_json::to_string_pretty(&record("bbbbbbbb")).unwrap();
        stage(dir.path(), json.as_bytes()).unwrap();

        assert_eq!(read_metadata(dir.path()).unwrap().tag, "aaaaaaaa");

        // The next write simply replaces the leftover temp file
        write_metadata(dir.path(), &record("cccccccc")).unwrap();
        assert_eq!(read_metadata(dir.path()).unwrap().tag, "cccccccc");
        assert!(!temp_path(dir.path()).exists());
    }

    #[test]
    fn test_failed_write_keeps_old_file() {
        let dir = TempDir::new().unwrap();
        write_metadata(dir.path(), &record("aaaaaaaa")).unwrap();

        // A directory squatting on the temp name makes staging fail
        fs::create_dir(temp_path(dir.path())).unwrap();
        assert!(write_metadata(dir.path(), &record("bbbbbbbb")).is_err());
        assert_eq!(read_metadata(dir.path()).unwrap().tag, "aaaaaaaa");
    }

    #[test]
    fn test_foreign_file_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        fs::write(metadata_path(dir.path()), r#"{"something": "else"}"#).unwrap();
        assert!(matches!(read_metadata(dir.path()), Err(Error::Integrity(_))));

        fs::write(metadata_path(dir.path()), r#"{"bitferry": "9", "tag": "x"}"#).unwrap();
        let err = read_metadata(dir.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported volume storage format '9'"));

        fs::write(metadata_path(dir.path()), "not json").unwrap();
        assert!(matches!(read_metadata(dir.path()), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(read_metadata(dir.path()), Err(Error::Io(_))));
    }

    #[test]
    fn test_format_clears_stale_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("fresh");
        format(&root).unwrap();
        assert!(root.is_dir());

        fs::write(metadata_path(&root), "old").unwrap();
        fs::write(temp_path(&root), "older").unwrap();
        format(&root).unwrap();
        assert!(!metadata_path(&root).exists());
        assert!(!temp_path(&root).exists());
    }

    #[test]
    fn test_wipe_removes_everything_inside() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.txt"), "x").unwrap();
        fs::write(dir.path().join("top.txt"), "y").unwrap();

        wipe(dir.path()).unwrap();
        assert!(dir.path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
