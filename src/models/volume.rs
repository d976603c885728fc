//! Volumes: storage roots carrying their own metadata file.
//!
//! ## Lifecycle
//!
//! ```text
//! pristine --(format, store)--> intact --(store)--> intact
//! pristine | intact --(delete)--> removing --(remove)--> dropped from registry
//! ```
//!
//! Nothing touches the disk until [`Volume::commit`], and a commit of an
//! unmodified volume touches nothing at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{TaskRecord, tag};
use crate::registry::TaskRegistry;
use crate::{Error, Result, storage, sys};

/// Format marker written into every metadata file.
pub const FORMAT_VERSION: &str = "0";

/// Lifecycle state of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    /// Created in this process, no metadata file written yet
    Pristine,
    /// Restored from, or stored to, its metadata file
    Intact,
    /// Marked for deletion, reclaimed by the next commit
    Removing,
}

/// Persisted form of a volume (the whole metadata file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Format version marker
    pub bitferry: String,
    pub tag: String,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskRecord>,
    /// Task tag -> opaque secret token
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vault: BTreeMap<String, String>,
}

/// What a commit did to a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Not modified, nothing written
    Unchanged,
    /// Metadata file (re)written
    Stored,
    /// Volume storage removed; drop the volume from the registry
    Removed,
}

/// A managed storage root.
#[derive(Debug, Clone)]
pub struct Volume {
    tag: String,
    root: PathBuf,
    generation: u64,
    vault: BTreeMap<String, String>,
    state: VolumeState,
    modified: bool,
    timestamp: DateTime<Utc>,
    overwrite: bool,
    wipe: bool,
}

impl Volume {
    /// Create a fresh volume at `root`.
    ///
    /// With `overwrite` set, an existing metadata file at `root` is replaced
    /// on commit instead of refusing to proceed.
    pub fn new(root: &Path, overwrite: bool) -> Result<Self> {
        let root = sys::canonical_path(root)?;
        let mut volume = Self::build(
            tag::generate(),
            root,
            Utc::now(),
            BTreeMap::new(),
            VolumeState::Pristine,
        );
        volume.modified = true;
        volume.overwrite = overwrite;
        Ok(volume)
    }

    /// Restore a volume from the metadata file in `root`.
    ///
    /// Returns the volume together with the task records it declares.
    pub fn restore(root: &Path) -> Result<(Self, Vec<TaskRecord>)> {
        let root = sys::canonical_path(root)?;
        let record = storage::read_metadata(&root)?;
        if record.tag.is_empty() {
            return Err(Error::Integrity(format!(
                "empty volume tag in {}",
                storage::metadata_path(&root).display()
            )));
        }
        let volume = Self::build(
            record.tag,
            root,
            record.modified,
            record.vault,
            VolumeState::Intact,
        );
        Ok((volume, record.tasks))
    }

    fn build(
        tag: String,
        root: PathBuf,
        timestamp: DateTime<Utc>,
        vault: BTreeMap<String, String>,
        state: VolumeState,
    ) -> Self {
        Self {
            tag,
            root,
            generation: 0,
            vault,
            state,
            modified: false,
            timestamp,
            overwrite: false,
            wipe: false,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn state(&self) -> VolumeState {
        self.state
    }

    /// Time of the last store (or of creation for a pristine volume).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Usable for resolution, lookup and vault access.
    pub fn intact(&self) -> bool {
        self.state != VolumeState::Removing
    }

    /// Path of the metadata file.
    pub fn storage(&self) -> PathBuf {
        storage::metadata_path(&self.root)
    }

    /// Secret token stored for a task.
    pub fn secret(&self, task_tag: &str) -> Option<&str> {
        self.vault.get(task_tag).map(String::as_str)
    }

    /// Tags of every vault entry.
    pub fn vault_tags(&self) -> impl Iterator<Item = &str> {
        self.vault.keys().map(String::as_str)
    }

    pub(crate) fn insert_secret(&mut self, task_tag: &str, token: String) {
        self.vault.insert(task_tag.to_string(), token);
        self.modified = true;
    }

    /// Whether the metadata file is due for a rewrite.
    pub fn modified(&self, tasks: &TaskRegistry) -> bool {
        self.modified
            || tasks
                .referring(&self.tag)
                .any(|t| t.generation() > self.generation)
    }

    /// Raise the generation to the newest referencing task and flag the volume dirty.
    pub fn touch(&mut self, tasks: &TaskRegistry) {
        self.generation = tasks
            .referring(&self.tag)
            .map(|t| t.generation())
            .max()
            .unwrap_or(0);
        self.modified = true;
    }

    /// Mark for deletion; with `wipe` the whole root is emptied on commit.
    pub(crate) fn delete(&mut self, tasks: &TaskRegistry, wipe: bool) {
        self.touch(tasks);
        self.wipe = wipe;
        self.state = VolumeState::Removing;
    }

    /// Persist pending changes according to the lifecycle state.
    ///
    /// In simulation mode the filesystem is left alone but in-memory state
    /// advances exactly as if the writes had succeeded.
    pub(crate) fn commit(
        &mut self,
        tasks: &mut TaskRegistry,
        simulate: bool,
    ) -> Result<CommitOutcome> {
        if !self.modified(tasks) {
            return Ok(CommitOutcome::Unchanged);
        }
        let outcome = match self.state {
            VolumeState::Pristine => {
                self.format(simulate)?;
                tasks.commit_referring(&self.tag);
                self.store(tasks, simulate)?;
                self.state = VolumeState::Intact;
                CommitOutcome::Stored
            }
            VolumeState::Intact => {
                tasks.commit_referring(&self.tag);
                self.store(tasks, simulate)?;
                CommitOutcome::Stored
            }
            VolumeState::Removing => {
                self.remove(simulate)?;
                CommitOutcome::Removed
            }
        };
        self.committed(tasks);
        Ok(outcome)
    }

    fn format(&self, simulate: bool) -> Result<()> {
        let storage = self.storage();
        if !self.overwrite && storage.exists() {
            return Err(Error::Conflict(format!(
                "refusing to overwrite existing volume storage {}",
                storage.display()
            )));
        }
        if simulate {
            return Ok(());
        }
        storage::format(&self.root)
    }

    fn store(&mut self, tasks: &TaskRegistry, simulate: bool) -> Result<()> {
        self.timestamp = Utc::now();
        self.vault
            .retain(|tag, _| tasks.get(tag).is_some_and(|t| t.live()));
        let record = self.to_record(tasks);
        if simulate {
            tracing::info!(
                volume = %self.tag,
                "simulation: skip writing {}",
                self.storage().display()
            );
            return Ok(());
        }
        storage::write_metadata(&self.root, &record)?;
        tracing::info!(volume = %self.tag, "stored {}", self.storage().display());
        Ok(())
    }

    fn remove(&self, simulate: bool) -> Result<()> {
        if simulate {
            tracing::info!(volume = %self.tag, "simulation: skip removing {}", self.root.display());
            return Ok(());
        }
        if self.wipe {
            storage::wipe(&self.root)?;
            tracing::info!(volume = %self.tag, "wiped {}", self.root.display());
        } else {
            storage::unformat(&self.root)?;
            tracing::info!(volume = %self.tag, "removed {}", self.storage().display());
        }
        Ok(())
    }

    fn committed(&mut self, tasks: &TaskRegistry) {
        self.generation = tasks
            .referring(&self.tag)
            .map(|t| t.generation())
            .min()
            .unwrap_or(0);
        self.modified = false;
    }

    /// Persisted form: live referencing tasks sorted by tag, and the vault
    /// restricted to live tasks.
    pub fn to_record(&self, tasks: &TaskRegistry) -> VolumeRecord {
        let mut records: Vec<TaskRecord> = tasks
            .referring(&self.tag)
            .filter(|t| t.live())
            .map(|t| t.to_record())
            .collect();
        records.sort_by(|a, b| a.tag.cmp(&b.tag));
        let vault = self
            .vault
            .iter()
            .filter(|(tag, _)| tasks.get(tag).is_some_and(|t| t.live()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        VolumeRecord {
            bitferry: FORMAT_VERSION.to_string(),
            tag: self.tag.clone(),
            modified: self.timestamp,
            tasks: records,
            vault,
        }
    }
}
