//! Bitferry - file synchronization and backup automation.
//!
//! This library provides the core functionality for the `bitferry` CLI tool:
//! the volume and task model, the generation-based dirty tracking that decides
//! which volume metadata files need rewriting, atomic persistence of those
//! files, and the path-to-volume resolution used to build task endpoints.
//! The actual data transfer is delegated to `rclone` and `restic`.

pub mod cli;
pub mod commands;
pub mod config;
pub mod exec;
pub mod models;
pub mod registry;
pub mod storage;
pub mod sys;

use std::path::PathBuf;


/// Library-level error type for Bitferry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid tag pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Bad or foreign metadata file.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Multiple entities matching (partial) tag {pattern}: {}", .matches.join(", "))]
    Ambiguous {
        pattern: String,
        matches: Vec<String>,
    },

    #[error("No intact volume encompasses path {}", .0.display())]
    Unresolved(PathBuf),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Tag collision: {0}")]
    TagCollision(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Bitferry operations.
pub type Result<T> = std::result::Result<T, Error>;
