//! System utilities for path handling and mount discovery

use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Canonicalize a path that may not exist yet.
///
/// The longest existing ancestor is canonicalized (resolving symlinks and
/// `..`) and the missing tail is appended as is. A `..` in the missing tail
/// cannot be resolved and is rejected.
pub fn canonical_path(path: &Path) -> Result<PathBuf> {
    if let Ok(p) = path.canonicalize() {
        return Ok(p);
    }
    let absolute = std::path::absolute(path)?;
    let components: Vec<Component> = absolute.components().collect();
    for split in (1..components.len()).rev() {
        let head: PathBuf = components[..split].iter().collect();
        let Ok(mut base) = head.canonicalize() else {
            continue;
        };
        for component in &components[split..] {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(Error::InvalidInput(format!(
                        "cannot resolve .. below a missing directory: {}",
                        path.display()
                    )));
                }
                other => base.push(other),
            }
        }
        return Ok(base);
    }
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no existing ancestor of {}", path.display()),
    )))
}

/// Currently mounted filesystem roots worth scanning for volumes.
///
/// Advisory only: any failure to enumerate yields an empty list.
#[cfg(target_os = "linux")]
pub fn mount_points() -> Vec<PathBuf> {
    match std::fs::read_to_string("/proc/self/mounts") {
        Ok(text) => parse_mounts(&text),
        Err(e) => {
            tracing::debug!("cannot read mount table: {}", e);
            Vec::new()
        }
    }
}

#[cfg(target_os = "macos")]
pub fn mount_points() -> Vec<PathBuf> {
    let mut mounts = vec![PathBuf::from("/")];
    if let Ok(entries) = std::fs::read_dir("/Volumes") {
        mounts.extend(entries.flatten().map(|e| e.path()));
    }
    mounts
}

#[cfg(windows)]
pub fn mount_points() -> Vec<PathBuf> {
    (b'A'..=b'Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
        .filter(|p| p.exists())
        .collect()
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub fn mount_points() -> Vec<PathBuf> {
    Vec::new()
}

/// Filesystem types that never hold user volumes.
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "proc",
    "sysfs",
    "devtmpfs",
    "devpts",
    "tmpfs",
    "cgroup",
    "cgroup2",
    "securityfs",
    "pstore",
    "debugfs",
    "tracefs",
    "mqueue",
    "hugetlbfs",
    "configfs",
    "fusectl",
    "bpf",
    "autofs",
    "binfmt_misc",
    "overlay",
    "nsfs",
    "efivarfs",
    "rpc_pipefs",
    "squashfs",
];

/// Extract mount points from a `/proc/mounts`-style table, skipping pseudo filesystems.
pub fn parse_mounts(text: &str) -> Vec<PathBuf> {
    let mut mounts = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_device), Some(target), Some(fstype)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if PSEUDO_FILESYSTEMS.contains(&fstype) {
            continue;
        }
        let path = PathBuf::from(unescape_mount(target));
        if !mounts.contains(&path) {
            mounts.push(path);
        }
    }
    mounts
}

/// Decode the octal escapes (`\040` for space etc.) used in the mount table.
fn unescape_mount(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(code) = u8::from_str_radix(digits, 8) {
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
