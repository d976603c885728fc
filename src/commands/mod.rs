//! Command implementations for the Bitferry CLI.
//!
//! Each command works on a restored [`Context`] and returns a result type
//! that renders either as JSON (the default) or as human-readable text.
//! Committing the context is left to the caller.

use serde::Serialize;
use std::path::Path;

use crate::cli::{BackupArgs, FilterArgs, RestoreArgs, TransferArgs};
use crate::config::ResolvedConfig;
use crate::exec::{Executor, Obscurer, Tools};
use crate::models::options::{
    RCLONE_PROCESS, RESTIC_BACKUP, RESTIC_CHECK, RESTIC_FORGET, RESTIC_RESTORE,
};
use crate::models::{
    CryptMode, Encryption, FilenameEncoding, FilenameEncryption, Filters, Operation, OptionSpec,
    ProfileTable, Rclone, ResticBackup, ResticRestore, Task, Volume,
};
use crate::registry::{Context, ProcessReport};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

// === Show ===

#[derive(Serialize)]
pub struct VolumeInfo {
    pub tag: String,
    pub root: String,
    pub generation: u64,
}

impl VolumeInfo {
    fn new(volume: &Volume) -> Self {
        Self {
            tag: volume.tag().to_string(),
            root: volume.root().display().to_string(),
            generation: volume.generation(),
        }
    }
}

#[derive(Serialize)]
pub struct TaskInfo {
    pub tag: String,
    pub operation: String,
    pub source: String,
    pub destination: String,
    pub generation: u64,
    pub summary: String,
}

impl TaskInfo {
    fn new(task: &Task) -> Self {
        let [source, destination] = task.operation().legs();
        Self {
            tag: task.tag().to_string(),
            operation: task.operation().name().to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            generation: task.generation(),
            summary: task.summary(),
        }
    }
}

/// Everything known about the current run.
#[derive(Serialize)]
pub struct ShowResult {
    pub volumes: Vec<VolumeInfo>,
    pub tasks: Vec<TaskInfo>,
    pub stale: Vec<TaskInfo>,
}

impl Output for ShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.volumes.is_empty() {
            lines.push("No intact volumes.".to_string());
        } else {
            lines.push(format!("{} intact volume(s):", self.volumes.len()));
            for v in &self.volumes {
                lines.push(format!("  {}    {}", v.tag, v.root));
            }
        }
        if self.tasks.is_empty() {
            lines.push("No intact tasks.".to_string());
        } else {
            lines.push(format!("{} intact task(s):", self.tasks.len()));
            for t in &self.tasks {
                lines.push(format!("  {}    {}", t.tag, t.summary));
            }
        }
        if !self.stale.is_empty() {
            lines.push(format!("{} stale task(s):", self.stale.len()));
            for t in &self.stale {
                lines.push(format!("  {}    {}", t.tag, t.summary));
            }
        }
        lines.join("\n")
    }
}

/// List intact volumes, intact tasks and stale tasks.
pub fn show(ctx: &Context) -> ShowResult {
    ShowResult {
        volumes: ctx.volumes.intact().map(VolumeInfo::new).collect(),
        tasks: ctx.tasks.intact(&ctx.volumes).map(TaskInfo::new).collect(),
        stale: ctx.tasks.stale(&ctx.volumes).map(TaskInfo::new).collect(),
    }
}

// === Config ===

#[derive(Serialize)]
pub struct ConfigValue {
    pub value: String,
    pub source: String,
}

/// Effective configuration with the origin of each value.
#[derive(Serialize)]
pub struct ConfigResult {
    pub config_path: String,
    pub search_paths: Vec<ConfigValue>,
    pub scan_mounts: ConfigValue,
    pub rclone: ConfigValue,
    pub restic: ConfigValue,
}

impl Output for ConfigResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("config file: {}", self.config_path)];
        if self.search_paths.is_empty() {
            lines.push("search-path: (none)".to_string());
        }
        for path in &self.search_paths {
            lines.push(format!("search-path: {} ({})", path.value, path.source));
        }
        for (name, value) in [
            ("scan-mounts", &self.scan_mounts),
            ("rclone", &self.rclone),
            ("restic", &self.restic),
        ] {
            lines.push(format!("{}: {} ({})", name, value.value, value.source));
        }
        lines.join("\n")
    }
}

pub fn config(resolved: &ResolvedConfig) -> ConfigResult {
    let value = |value: String, source: &dyn std::fmt::Display| ConfigValue {
        value,
        source: source.to_string(),
    };
    ConfigResult {
        config_path: resolved.config_path.display().to_string(),
        search_paths: resolved
            .search_paths
            .iter()
            .map(|p| value(p.value.display().to_string(), &p.source))
            .collect(),
        scan_mounts: value(
            resolved.scan_mounts.value.to_string(),
            &resolved.scan_mounts.source,
        ),
        rclone: value(
            resolved.rclone.value.display().to_string(),
            &resolved.rclone.source,
        ),
        restic: value(
            resolved.restic.value.display().to_string(),
            &resolved.restic.source,
        ),
    }
}

// === Create / Delete ===

/// A freshly created volume or task.
#[derive(Debug, Serialize)]
pub struct Created {
    pub kind: &'static str,
    pub tag: String,
}

impl Output for Created {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Created {} {}", self.kind, self.tag)
    }
}

/// Entities marked for removal.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub kind: &'static str,
    pub tags: Vec<String>,
}

impl Output for Deleted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.tags.is_empty() {
            format!("No {} deleted", self.kind)
        } else {
            format!("Deleted {} {}", self.kind, self.tags.join(", "))
        }
    }
}

pub fn create_volume(ctx: &mut Context, root: &Path, force: bool) -> Result<Created> {
    let tag = ctx.create_volume(root, force)?;
    Ok(Created { kind: "volume", tag })
}

/// rclone operation a transfer task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Copy,
    Update,
    Synchronize,
    Equalize,
}

fn filters(args: &FilterArgs) -> Filters {
    Filters {
        include: args.include.clone(),
        exclude: args.exclude.clone(),
    }
}

fn options(spec: Option<&str>, table: &ProfileTable) -> Result<Option<Vec<String>>> {
    spec.unwrap_or_default().parse::<OptionSpec>()?.resolve(table)
}

fn encryption(args: &TransferArgs) -> Result<Option<Encryption>> {
    let mode = match (args.encrypt, args.decrypt) {
        (true, _) => Some(CryptMode::Encrypt),
        (_, true) => Some(CryptMode::Decrypt),
        _ => None,
    };
    let Some(mode) = mode else {
        if args.transformer.is_some() || args.encoder.is_some() || args.unicode {
            return Err(Error::InvalidInput(
                "file name settings need --encrypt or --decrypt".to_string(),
            ));
        }
        return Ok(None);
    };

    let filename_encryption = match &args.transformer {
        None => FilenameEncryption::default(),
        Some(s) => FilenameEncryption::parse(s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown file name transformer: {}", s)))?,
    };
    let filename_encoding = match (&args.encoder, args.unicode) {
        (_, true) => FilenameEncoding::Base32768,
        (None, false) => FilenameEncoding::default(),
        (Some(s), false) => FilenameEncoding::parse(s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown file name encoder: {}", s)))?,
    };
    Ok(Some(Encryption {
        mode,
        filename_encryption,
        filename_encoding,
    }))
}

/// Ask for a password only once the operation is known to be valid.
fn obscured_token(
    ctx: &Context,
    operation: &Operation,
    password: &dyn Fn() -> Result<String>,
    obscurer: &dyn Obscurer,
) -> Result<Option<String>> {
    if ctx.vault_root(operation)?.is_none() {
        return Ok(None);
    }
    let password = password()?;
    if password.is_empty() {
        return Err(Error::InvalidInput("empty password".to_string()));
    }
    Ok(Some(obscurer.obscure(&password)?))
}

fn create_task(
    ctx: &mut Context,
    operation: Operation,
    filters: Filters,
    password: &dyn Fn() -> Result<String>,
    obscurer: &dyn Obscurer,
) -> Result<Created> {
    let token = obscured_token(ctx, &operation, password, obscurer)?;
    let tag = ctx.create_task(operation, filters, token)?;
    Ok(Created { kind: "task", tag })
}

/// Create an rclone-driven task.
///
/// `password` is only consulted for encrypted transfers.
pub fn create_transfer(
    ctx: &mut Context,
    kind: TransferKind,
    args: &TransferArgs,
    password: &dyn Fn() -> Result<String>,
    obscurer: &dyn Obscurer,
) -> Result<Created> {
    let payload = Rclone {
        source: ctx.endpoint(&args.source)?,
        destination: ctx.endpoint(&args.destination)?,
        encryption: encryption(args)?,
        options: options(args.options.as_deref(), &RCLONE_PROCESS)?.unwrap_or_default(),
    };
    let operation = match kind {
        TransferKind::Copy => Operation::Copy(payload),
        TransferKind::Update => Operation::Update(payload),
        TransferKind::Synchronize => Operation::Synchronize(payload),
        TransferKind::Equalize => Operation::Equalize(payload),
    };
    create_task(ctx, operation, filters(&args.filters), password, obscurer)
}

/// Create a restic backup task.
pub fn create_backup(
    ctx: &mut Context,
    args: &BackupArgs,
    password: &dyn Fn() -> Result<String>,
    obscurer: &dyn Obscurer,
) -> Result<Created> {
    let payload = ResticBackup {
        directory: ctx.endpoint(&args.directory)?,
        repository: ctx.endpoint(&args.repository)?,
        options: options(args.options.as_deref(), &RESTIC_BACKUP)?.unwrap_or_default(),
        forget: options(args.forget.as_deref(), &RESTIC_FORGET)?,
        check: options(args.check.as_deref(), &RESTIC_CHECK)?,
    };
    create_task(
        ctx,
        Operation::Backup(payload),
        filters(&args.filters),
        password,
        obscurer,
    )
}

/// Create a restic restore task.
pub fn create_restore(
    ctx: &mut Context,
    args: &RestoreArgs,
    password: &dyn Fn() -> Result<String>,
    obscurer: &dyn Obscurer,
) -> Result<Created> {
    let payload = ResticRestore {
        repository: ctx.endpoint(&args.repository)?,
        directory: ctx.endpoint(&args.directory)?,
        options: options(args.options.as_deref(), &RESTIC_RESTORE)?.unwrap_or_default(),
    };
    create_task(
        ctx,
        Operation::Restore(payload),
        filters(&args.filters),
        password,
        obscurer,
    )
}

/// Mark volumes matching the partial tags for removal.
pub fn delete_volumes(ctx: &mut Context, partials: &[String], wipe: bool) -> Result<Deleted> {
    let mut tags = Vec::new();
    for partial in partials {
        let tag = match ctx.select_volume(partial)? {
            Some(volume) => volume.tag().to_string(),
            None => continue,
        };
        ctx.delete_volume(&tag, wipe)?;
        tags.push(tag);
    }
    Ok(Deleted {
        kind: "volume",
        tags,
    })
}

/// Mark tasks matching the partial tags for removal.
pub fn delete_tasks(ctx: &mut Context, partials: &[String]) -> Result<Deleted> {
    let mut tags = Vec::new();
    for partial in partials {
        let tag = match ctx.select_task(partial)? {
            Some(task) => task.tag().to_string(),
            None => continue,
        };
        ctx.delete_task(&tag)?;
        tags.push(tag);
    }
    Ok(Deleted { kind: "task", tags })
}

// === Process ===

impl Output for ProcessReport {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut line = format!(
            "Processed {} task(s): {} succeeded, {} failed",
            self.succeeded.len() + self.failed.len(),
            self.succeeded.len(),
            self.failed.len()
        );
        if !self.failed.is_empty() {
            line.push_str(&format!(" ({})", self.failed.join(", ")));
        }
        if self.interrupted {
            line.push_str("; interrupted");
        }
        line
    }
}

pub fn process(
    ctx: &Context,
    partials: &[String],
    tools: &Tools,
    executor: &dyn Executor,
    obscurer: &dyn Obscurer,
    interrupted: &dyn Fn() -> bool,
) -> Result<ProcessReport> {
    ctx.process(partials, tools, executor, obscurer, interrupted)
}
