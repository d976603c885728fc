//! KDL schema definition for config.kdl.
//!
//! ```kdl
//! // Directories checked for volumes on every run
//! search-path "/mnt/backup" "/media/usb"
//! search-path "/srv/archive"
//! // Also check every mounted filesystem root (default #true)
//! scan-mounts #false
//! // External tools, looked up in PATH when not given
//! rclone "/usr/local/bin/rclone"
//! restic "/usr/local/bin/restic"
//! ```

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "config.kdl";

/// User preferences stored in config.kdl. Every value is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitferryConfig {
    /// Extra directories to scan for volumes
    pub search_paths: Vec<PathBuf>,

    /// Whether to scan mount points for volumes
    pub scan_mounts: Option<bool>,

    /// rclone executable
    pub rclone: Option<PathBuf>,

    /// restic executable
    pub restic: Option<PathBuf>,
}

impl BitferryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for path in &self.search_paths {
            if path.as_os_str().is_empty() {
                return Err("search-path entries must not be empty".to_string());
            }
        }
        for (name, tool) in [("rclone", &self.rclone), ("restic", &self.restic)] {
            if tool.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                return Err(format!("{} must not be empty", name));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        // search-path may repeat and carry several arguments
        for node in doc.nodes().iter().filter(|n| n.name().value() == "search-path") {
            for entry in node.entries().iter().filter(|e| e.name().is_none()) {
                if let Some(s) = entry.value().as_string() {
                    config.search_paths.push(PathBuf::from(s));
                }
            }
        }

        if let Some(node) = doc.get("scan-mounts") {
            if let Some(entry) = node.entries().first() {
                config.scan_mounts = entry.value().as_bool();
            }
        }

        if let Some(s) = first_string(doc, "rclone") {
            config.rclone = Some(PathBuf::from(s));
        }
        if let Some(s) = first_string(doc, "restic") {
            config.restic = Some(PathBuf::from(s));
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if !self.search_paths.is_empty() {
            let mut node = KdlNode::new("search-path");
            for path in &self.search_paths {
                node.push(KdlEntry::new(KdlValue::String(path.display().to_string())));
            }
            doc.nodes_mut().push(node);
        }

        if let Some(scan) = self.scan_mounts {
            let mut node = KdlNode::new("scan-mounts");
            node.push(KdlEntry::new(KdlValue::Bool(scan)));
            doc.nodes_mut().push(node);
        }

        for (name, tool) in [("rclone", &self.rclone), ("restic", &self.restic)] {
            if let Some(path) = tool {
                let mut node = KdlNode::new(name);
                node.push(KdlEntry::new(KdlValue::String(path.display().to_string())));
                doc.nodes_mut().push(node);
            }
        }

        doc
    }

    /// Load and validate a config file. A missing file yields the empty config.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::InvalidInput(format!("invalid config {}: {}", path.display(), e)))?;
        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::InvalidInput(format!("invalid config {}: {}", path.display(), e)))?;
        Ok(config)
    }
}

fn first_string<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a str> {
    doc.get(name)?.entries().first()?.value().as_string()
}
