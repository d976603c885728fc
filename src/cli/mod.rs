//! CLI argument definitions for Bitferry.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Bitferry - file synchronization and backup automation.
///
/// Volumes are directories carrying a `.bitferry` metadata file; tasks
/// describe rclone transfers and restic backups between volumes, local
/// paths and remotes. Run `bitferry show` to see what is known.
#[derive(Parser, Debug)]
#[command(name = "bitferry")]
#[command(author, version, about = "File synchronization and backup automation", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Go through every step without writing metadata or transferring data
    #[arg(short = 'n', long = "dry-run", visible_alias = "simulate", global = true)]
    pub dry_run: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Extra directory to search for volumes (repeatable)
    #[arg(short = 'S', long = "search-path", global = true, value_name = "PATH")]
    pub search_paths: Vec<PathBuf>,

    /// Do not scan mount points for volumes
    #[arg(long = "no-mounts", global = true)]
    pub no_mounts: bool,

    /// rclone executable
    #[arg(long, global = true, value_name = "PATH")]
    pub rclone: Option<PathBuf>,

    /// restic executable
    #[arg(long, global = true, value_name = "PATH")]
    pub restic: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show intact volumes, intact tasks and stale tasks
    Show,

    /// Show the resolved configuration and where each value came from
    Config,

    /// Run intact tasks
    Process {
        /// Partial task tags to run (all intact tasks when omitted)
        tags: Vec<String>,
    },

    /// Create volumes and tasks
    Create {
        #[command(subcommand)]
        command: CreateCommands,
    },

    /// Delete volumes and tasks
    Delete {
        #[command(subcommand)]
        command: DeleteCommands,
    },
}

/// Create subcommands
#[derive(Subcommand, Debug)]
pub enum CreateCommands {
    /// Create a volume rooted at a directory
    Volume {
        /// Volume root directory (created on commit if missing)
        root: PathBuf,

        /// Overwrite an existing volume metadata file
        #[arg(short, long)]
        force: bool,
    },

    /// Create a task
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

/// Task kinds
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// One-way copy (rclone copy)
    Copy(TransferArgs),

    /// One-way copy skipping newer destination files (rclone copy --update)
    Update(TransferArgs),

    /// One-way mirror, deleting extraneous destination files (rclone sync)
    #[command(alias = "sync")]
    Synchronize(TransferArgs),

    /// Two-way synchronization (rclone bisync)
    #[command(alias = "bisync")]
    Equalize(TransferArgs),

    /// Back up a directory into a restic repository
    Backup(BackupArgs),

    /// Restore the latest restic snapshot into a directory
    Restore(RestoreArgs),
}

/// File filters shared by every task kind
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Include pattern (repeatable)
    #[arg(short = 'i', long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Exclude pattern (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

/// rclone transfer arguments
///
/// Endpoints are paths (bound to the innermost volume containing them),
/// `:TAG:PATH` for a path inside a volume, `local:PATH` for an unbound
/// path, or `REMOTE:PATH` for an rclone remote.
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Source endpoint
    pub source: String,

    /// Destination endpoint
    pub destination: String,

    /// Encrypt the destination with rclone crypt
    #[arg(short, long, conflicts_with = "decrypt")]
    pub encrypt: bool,

    /// Decrypt the source with rclone crypt
    #[arg(short, long)]
    pub decrypt: bool,

    /// File name encoding: base32, base64 or base32768
    #[arg(short = 'c', long = "encoder", value_name = "ENCODING")]
    pub encoder: Option<String>,

    /// File name encryption: standard, obfuscate, or - for none
    #[arg(short = 't', long = "transformer", value_name = "MODE", allow_hyphen_values = true)]
    pub transformer: Option<String>,

    /// Shorthand for --encoder base32768
    #[arg(short, long, conflicts_with = "encoder")]
    pub unicode: bool,

    /// rclone options: profile (default, fast, checksum), -opt,-opt..., or - for none
    #[arg(short, long, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub options: Option<String>,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Encryption password (else BITFERRY_PASSWORD or one line of stdin)
    #[arg(short, long)]
    pub password: Option<String>,
}

/// restic backup arguments
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Directory to back up
    pub directory: String,

    /// Repository endpoint
    pub repository: String,

    /// restic backup options: profile (compressed, fast), -opt,-opt..., or -
    #[arg(short, long, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub options: Option<String>,

    /// Retention after backup: profile (default, minimal), -opt,-opt..., or - to skip
    #[arg(short, long, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub forget: Option<String>,

    /// Repository check after backup: profile (default, spot, full), -opt,-opt..., or -
    #[arg(short = 'k', long, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub check: Option<String>,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Repository password (else BITFERRY_PASSWORD or one line of stdin)
    #[arg(short, long)]
    pub password: Option<String>,
}

/// restic restore arguments
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Repository endpoint
    pub repository: String,

    /// Directory to restore into
    pub directory: String,

    /// restic restore options: profile (verify), -opt,-opt..., or -
    #[arg(short, long, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub options: Option<String>,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Repository password (else BITFERRY_PASSWORD or one line of stdin)
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Delete subcommands
#[derive(Subcommand, Debug)]
pub enum DeleteCommands {
    /// Delete volumes by partial tag
    Volume {
        /// Partial volume tags
        #[arg(required = true)]
        tags: Vec<String>,

        /// Also delete every file under the volume root
        #[arg(long)]
        wipe: bool,
    },

    /// Delete tasks by partial tag
    Task {
        /// Partial task tags
        #[arg(required = true)]
        tags: Vec<String>,
    },
}
