//! Configuration for Bitferry.
//!
//! ## config.kdl - User preferences
//!
//! Located at `$BITFERRY_CONFIG_DIR/config.kdl`, or `~/.config/bitferry/config.kdl`
//! (the platform configuration directory) when the variable is unset.
//!
//! Contains:
//! - `search-path` - Directories scanned for volumes (repeatable)
//! - `scan-mounts` - Whether mount points are scanned as well
//! - `rclone`, `restic` - External tool executables
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > defaults.
//! Search paths from every source are combined.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_DIR_ENV, ConfigOverrides, LOG_ENV, PASSWORD_ENV, RCLONE_ENV, RESTIC_ENV, Resolved,
    ResolvedConfig, SCAN_MOUNTS_ENV, SEARCH_PATH_ENV, ValueSource, config_dir, resolve_config,
};
pub use schema::{BitferryConfig, CONFIG_FILE};
