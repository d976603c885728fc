//! Tasks: configured operations between two endpoints.
//!
//! A task is declared inside the metadata file of every volume one of its
//! legs lives in. Its generation is what tells those volumes whether their
//! persisted snapshot is stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Endpoint, tag};
use crate::registry::VolumeRegistry;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created in this process, never committed
    Pristine,
    /// Restored from, or committed to, volume storage
    Intact,
    /// Marked for deletion, reclaimed by the next commit
    Removing,
    /// Processed by a commit; purged from the registry at the end of the pass
    Reclaimed,
}

/// Direction of rclone encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptMode {
    /// Plain source, encrypted destination
    Encrypt,
    /// Encrypted source, plain destination
    Decrypt,
}

/// How rclone crypt transforms file names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameEncryption {
    #[default]
    Standard,
    Obfuscate,
    Off,
}

impl FilenameEncryption {
    /// Parse a CLI transformer name; `-` disables name encryption.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "standard" | "encrypter" => Some(FilenameEncryption::Standard),
            "obfuscate" | "obfuscator" => Some(FilenameEncryption::Obfuscate),
            "off" | "-" => Some(FilenameEncryption::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilenameEncryption::Standard => "standard",
            FilenameEncryption::Obfuscate => "obfuscate",
            FilenameEncryption::Off => "off",
        }
    }
}

/// How rclone crypt encodes encrypted file names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameEncoding {
    #[default]
    Base32,
    Base64,
    Base32768,
}

impl FilenameEncoding {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "base32" => Some(FilenameEncoding::Base32),
            "base64" => Some(FilenameEncoding::Base64),
            "base32768" => Some(FilenameEncoding::Base32768),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilenameEncoding::Base32 => "base32",
            FilenameEncoding::Base64 => "base64",
            FilenameEncoding::Base32768 => "base32768",
        }
    }
}

/// rclone crypt settings of a task. The password itself lives in a volume vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    pub mode: CryptMode,
    #[serde(default)]
    pub filename_encryption: FilenameEncryption,
    #[serde(default)]
    pub filename_encoding: FilenameEncoding,
}

/// Payload of the rclone-driven operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rclone {
    pub source: Endpoint,
    pub destination: Endpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Encryption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Payload of `restic backup`: `directory` is backed up into `repository`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResticBackup {
    pub directory: Endpoint,
    pub repository: Endpoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Retention policy; `None` skips `restic forget`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forget: Option<Vec<String>>,
    /// Check options; `None` skips `restic check`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Vec<String>>,
}

/// Payload of `restic restore`: latest snapshot of `repository` into `directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResticRestore {
    pub repository: Endpoint,
    pub directory: Endpoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// The closed set of task kinds, keyed by the persisted `operation` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Operation {
    Copy(Rclone),
    Update(Rclone),
    Synchronize(Rclone),
    Equalize(Rclone),
    Backup(ResticBackup),
    Restore(ResticRestore),
}

impl Operation {
    /// Persisted discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Copy(_) => "copy",
            Operation::Update(_) => "update",
            Operation::Synchronize(_) => "synchronize",
            Operation::Equalize(_) => "equalize",
            Operation::Backup(_) => "backup",
            Operation::Restore(_) => "restore",
        }
    }

    /// The two endpoints, in source-to-destination order.
    pub fn legs(&self) -> [&Endpoint; 2] {
        match self {
            Operation::Copy(r)
            | Operation::Update(r)
            | Operation::Synchronize(r)
            | Operation::Equalize(r) => [&r.source, &r.destination],
            Operation::Backup(b) => [&b.directory, &b.repository],
            Operation::Restore(r) => [&r.repository, &r.directory],
        }
    }

    /// The leg holding plain (decrypted) data, for operations that carry a secret.
    pub fn decrypted_leg(&self) -> Option<&Endpoint> {
        match self {
            Operation::Copy(r)
            | Operation::Update(r)
            | Operation::Synchronize(r)
            | Operation::Equalize(r) => r.encryption.as_ref().map(|e| match e.mode {
                CryptMode::Encrypt => &r.source,
                CryptMode::Decrypt => &r.destination,
            }),
            Operation::Backup(b) => Some(&b.directory),
            Operation::Restore(r) => Some(&r.directory),
        }
    }

    /// True if processing needs a vault token.
    pub fn requires_secret(&self) -> bool {
        self.decrypted_leg().is_some()
    }
}

/// File filter patterns passed to the external tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Persisted form of a task, as found in a volume's metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub tag: String,
    pub modified: DateTime<Utc>,
    #[serde(flatten)]
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// A configured operation between two endpoints.
#[derive(Debug, Clone)]
pub struct Task {
    tag: String,
    generation: u64,
    modified: DateTime<Utc>,
    operation: Operation,
    filters: Filters,
    state: TaskState,
}

impl Task {
    /// Create a fresh task with a new tag.
    ///
    /// The generation is 0 until the task is touched against a registry.
    pub fn new(operation: Operation, filters: Filters) -> Self {
        Self::build(tag::generate(), Utc::now(), operation, filters, TaskState::Pristine)
    }

    /// Rebuild a task from its persisted record.
    pub fn from_record(record: TaskRecord) -> Self {
        let filters = Filters {
            include: record.include,
            exclude: record.exclude,
        };
        Self::build(record.tag, record.modified, record.operation, filters, TaskState::Intact)
    }

    fn build(
        tag: String,
        modified: DateTime<Utc>,
        operation: Operation,
        filters: Filters,
        state: TaskState,
    ) -> Self {
        Self {
            tag,
            generation: 0,
            modified,
            operation,
            filters,
            state,
        }
    }

    /// Persisted form of the task.
    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            tag: self.tag.clone(),
            modified: self.modified,
            operation: self.operation.clone(),
            include: self.filters.include.clone(),
            exclude: self.filters.exclude.clone(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Not marked for deletion and not yet reclaimed.
    pub fn live(&self) -> bool {
        matches!(self.state, TaskState::Pristine | TaskState::Intact)
    }

    /// Live with both legs resolving.
    pub fn intact(&self, volumes: &VolumeRegistry) -> bool {
        self.live() && self.operation.legs().iter().all(|e| e.intact(volumes))
    }

    /// Check whether either leg lives in the volume with the given tag.
    pub fn refers(&self, volume_tag: &str) -> bool {
        self.operation.legs().iter().any(|e| e.refers(volume_tag))
    }

    /// Bump the generation past both legs so their volumes see a pending change.
    pub fn touch(&mut self, volumes: &VolumeRegistry) {
        let [a, b] = self.operation.legs();
        self.generation = a.generation(volumes).max(b.generation(volumes)) + 1;
    }

    /// Settle the generation of a freshly restored task so it does not mark
    /// the volumes it refers to as modified.
    pub fn untouch(&mut self, volumes: &VolumeRegistry) {
        let [a, b] = self.operation.legs();
        self.generation = a.generation(volumes).min(b.generation(volumes));
    }

    /// Mark for deletion.
    pub(crate) fn delete(&mut self, volumes: &VolumeRegistry) {
        self.touch(volumes);
        self.modified = Utc::now();
        self.state = TaskState::Removing;
    }

    /// Apply the pending lifecycle transition as part of a volume commit.
    pub(crate) fn commit(&mut self) {
        self.state = match self.state {
            TaskState::Pristine | TaskState::Intact => TaskState::Intact,
            TaskState::Removing | TaskState::Reclaimed => TaskState::Reclaimed,
        };
    }

    /// One-line description, e.g. `copy :1a2b3c4d:docs -> /srv/mirror`.
    pub fn summary(&self) -> String {
        let [a, b] = self.operation.legs();
        let mut line = format!("{} {} -> {}", self.operation.name(), a, b);
        if let Operation::Copy(r)
        | Operation::Update(r)
        | Operation::Synchronize(r)
        | Operation::Equalize(r) = &self.operation
        {
            if let Some(e) = &r.encryption {
                line.push_str(match e.mode {
                    CryptMode::Encrypt => " (encrypt)",
                    CryptMode::Decrypt => " (decrypt)",
                });
            }
        }
        line
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}    {}", self.tag, self.summary())
    }
}
