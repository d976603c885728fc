//! In-memory volume registry keyed by canonical root.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{Endpoint, TagMatcher, Volume};
use crate::{Error, Result, sys};

/// Registered volumes, at most one per canonical root.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
    volumes: BTreeMap<PathBuf, Volume>,
}

impl VolumeRegistry {
    /// Drop every registered volume.
    pub fn clear(&mut self) {
        self.volumes.clear();
    }

    /// Register a volume, replacing any volume registered at the same root.
    ///
    /// Fails if a volume at a different root already carries the same tag.
    pub fn register(&mut self, volume: Volume) -> Result<()> {
        if let Some(other) = self
            .volumes
            .values()
            .find(|v| v.tag() == volume.tag() && v.root() != volume.root())
        {
            return Err(Error::TagCollision(format!(
                "volume {} at {} already registered at {}",
                volume.tag(),
                volume.root().display(),
                other.root().display()
            )));
        }
        self.volumes.insert(volume.root().to_path_buf(), volume);
        Ok(())
    }

    /// Remove the volume registered at `root`.
    pub fn unregister(&mut self, root: &Path) -> Option<Volume> {
        self.volumes.remove(root)
    }

    pub fn get(&self, root: &Path) -> Option<&Volume> {
        self.volumes.get(root)
    }

    pub fn get_mut(&mut self, root: &Path) -> Option<&mut Volume> {
        self.volumes.get_mut(root)
    }

    /// Find a registered volume (intact or not) by exact tag.
    pub fn by_tag(&self, tag: &str) -> Option<&Volume> {
        self.volumes.values().find(|v| v.tag() == tag)
    }

    pub fn by_tag_mut(&mut self, tag: &str) -> Option<&mut Volume> {
        self.volumes.values_mut().find(|v| v.tag() == tag)
    }

    /// Every registered volume, ordered by root.
    pub fn registered(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values()
    }

    /// Roots of every registered volume.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.volumes.keys().cloned().collect()
    }

    /// Volumes not marked for deletion.
    pub fn intact(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values().filter(|v| v.intact())
    }

    /// Intact volumes whose tag matches any of the patterns.
    pub fn lookup(&self, matcher: &TagMatcher) -> Vec<&Volume> {
        self.intact().filter(|v| matcher.matches(v.tag())).collect()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Bind a filesystem path to the most specific intact volume encompassing it.
    ///
    /// The path is canonicalized first, through its longest existing ancestor
    /// if it does not exist yet. Volume roots are tried longest first; the path being the root
    /// itself yields an empty relative path.
    pub fn resolve(&self, path: &Path) -> Result<Endpoint> {
        let path = sys::canonical_path(path)?;
        let mut candidates: Vec<&Volume> = self.intact().collect();
        candidates.sort_by_key(|v| Reverse(v.root().as_os_str().len()));
        for volume in candidates {
            if let Ok(relative) = path.strip_prefix(volume.root()) {
                return Endpoint::volume(volume.tag(), relative);
            }
        }
        Err(Error::Unresolved(path))
    }
}
