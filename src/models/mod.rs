//! Data models for Bitferry entities.
//!
//! This module defines the core data structures:
//! - `Volume` - A storage root with its own metadata file and credential vault
//! - `Task` - An operation between two endpoints, run by an external tool
//! - `Endpoint` - A local path, a volume-relative path, or an rclone remote
//! - `OptionSpec` - Extra tool options selected by profile or given literally

pub mod endpoint;
pub mod options;
pub mod tag;
pub mod task;
pub mod volume;

pub use endpoint::Endpoint;
pub use options::{OptionSpec, ProfileTable};
pub use tag::TagMatcher;
pub use task::{
    CryptMode, Encryption, FilenameEncoding, FilenameEncryption, Filters, Operation, Rclone,
    ResticBackup, ResticRestore, Task, TaskRecord, TaskState,
};
pub use volume::{CommitOutcome, FORMAT_VERSION, Volume, VolumeRecord, VolumeState};
