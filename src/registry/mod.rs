//! Volume and task registries and the context object that drives them.
//!
//! A [`Context`] holds the two registries for one run of the program:
//!
//! ```text
//! restore(roots) -> create/delete/process -> commit()
//! ```
//!
//! Restore reads every volume metadata file found under the candidate roots,
//! mutations only touch memory, and commit writes back exactly the volumes
//! whose generation says they are out of date.

mod tasks;
mod volumes;

pub use tasks::{RestoreOutcome, TaskRegistry};
pub use volumes::VolumeRegistry;

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::exec::{self, Executor, Obscurer, Tools};
use crate::models::{CommitOutcome, Endpoint, Filters, Operation, TagMatcher, Task, Volume};
use crate::{Error, Result, storage, sys};

/// Run-wide settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Go through every step without touching the filesystem or running tools for real
    pub simulate: bool,
}

/// Outcome of a processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// Tags of tasks that ran successfully
    pub succeeded: Vec<String>,
    /// Tags of tasks that failed
    pub failed: Vec<String>,
    /// Processing stopped before every selected task ran
    pub interrupted: bool,
}

impl ProcessReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}

/// Candidate volume roots: configured search paths followed by live mount
/// points, without duplicates.
pub fn candidate_roots(search_paths: &[PathBuf], scan_mounts: bool) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    let mounts = if scan_mounts {
        sys::mount_points()
    } else {
        Vec::new()
    };
    for root in search_paths.iter().cloned().chain(mounts) {
        if !roots.contains(&root) {
            roots.push(root);
        }
    }
    roots
}

/// The registries of one run plus its settings.
#[derive(Debug, Default)]
pub struct Context {
    pub volumes: VolumeRegistry,
    pub tasks: TaskRegistry,
    settings: Settings,
}

impl Context {
    pub fn new(settings: Settings) -> Self {
        Self {
            volumes: VolumeRegistry::default(),
            tasks: TaskRegistry::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Empty both registries.
    pub fn reset(&mut self) {
        self.volumes.clear();
        self.tasks.clear();
    }

    // === Restore / commit ===

    /// Rebuild the registries from the metadata files found in `roots`.
    ///
    /// Roots without a metadata file are skipped silently. A root that fails
    /// to restore is logged and skipped; the return value reports whether
    /// every root restored cleanly.
    pub fn restore(&mut self, roots: &[PathBuf]) -> bool {
        self.reset();
        tracing::info!("restore phase");
        let mut result = true;
        for root in roots {
            if !storage::exists(root) {
                continue;
            }
            if let Err(e) = self.restore_volume(root) {
                tracing::error!("{}: {}", root.display(), e);
                result = false;
            }
        }
        tracing::info!(
            volumes = self.volumes.len(),
            tasks = self.tasks.len(),
            "restore {}",
            if result { "successful" } else { "failure(s) reported" }
        );
        result
    }

    fn restore_volume(&mut self, root: &Path) -> Result<()> {
        let root = sys::canonical_path(root)?;
        if self.volumes.get(&root).is_some() {
            return Ok(());
        }
        let (volume, records) = Volume::restore(&root)?;
        let tag = volume.tag().to_string();
        self.volumes.register(volume)?;
        for record in records {
            self.tasks.restore(Task::from_record(record), &self.volumes);
        }
        tracing::info!(volume = %tag, "restored {}", root.display());
        Ok(())
    }

    /// Write back every modified volume.
    ///
    /// Each volume is committed exactly once and independently: a failure is
    /// logged and reflected in the return value but does not stop the pass.
    pub fn commit(&mut self) -> bool {
        tracing::info!("commit phase");
        let mut result = true;
        let mut removed = Vec::new();
        for root in self.volumes.roots() {
            let Some(volume) = self.volumes.get_mut(&root) else {
                continue;
            };
            match volume.commit(&mut self.tasks, self.settings.simulate) {
                Ok(CommitOutcome::Removed) => removed.push(root),
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(volume = %volume.tag(), "{}", e);
                    result = false;
                }
            }
        }
        for root in removed {
            self.volumes.unregister(&root);
        }
        let purged = self.tasks.purge_reclaimed();
        if purged > 0 {
            tracing::debug!("purged {} reclaimed task(s)", purged);
        }
        tracing::info!(
            "commit {}",
            if result { "successful" } else { "failure(s) reported" }
        );
        result
    }

    // === Lookup ===

    /// Select one intact volume by partial tag.
    ///
    /// No match logs a warning and yields `None`; several matches are an error.
    pub fn select_volume(&self, partial: &str) -> Result<Option<&Volume>> {
        let matcher = TagMatcher::single(partial)?;
        let found = self.volumes.lookup(&matcher);
        match found.as_slice() {
            [] => {
                tracing::warn!("no intact volume matching (partial) tag {}", partial);
                Ok(None)
            }
            [volume] => Ok(Some(*volume)),
            _ => Err(Error::Ambiguous {
                pattern: partial.to_string(),
                matches: found.iter().map(|v| v.tag().to_string()).collect(),
            }),
        }
    }

    /// Select one live task by partial tag.
    pub fn select_task(&self, partial: &str) -> Result<Option<&Task>> {
        let matcher = TagMatcher::single(partial)?;
        let found = self.tasks.lookup(&matcher);
        match found.as_slice() {
            [] => {
                tracing::warn!("no task matching (partial) tag {}", partial);
                Ok(None)
            }
            [task] => Ok(Some(*task)),
            _ => Err(Error::Ambiguous {
                pattern: partial.to_string(),
                matches: found.iter().map(|t| t.tag().to_string()).collect(),
            }),
        }
    }

    /// Parse a user-supplied endpoint.
    ///
    /// - `local:<path>` or `:<path>`: a local path, never bound to a volume
    /// - `:<tag>:<path>`: a path inside the volume matching the partial tag
    /// - `<remote>:<path>`: an rclone remote, unless it names an existing path
    /// - anything else: a path bound to the innermost volume containing it
    pub fn endpoint(&self, input: &str) -> Result<Endpoint> {
        if input.is_empty() {
            return Err(Error::InvalidInput("empty endpoint".to_string()));
        }
        if let Some(path) = input.strip_prefix("local:") {
            return local_endpoint(path);
        }
        if let Some(rest) = input.strip_prefix(':') {
            if let Some((tag, path)) = rest.split_once(':') {
                if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return self.volume_endpoint(tag, path);
                }
            }
            return local_endpoint(rest);
        }
        if is_remote(input) && !Path::new(input).exists() {
            return Ok(Endpoint::remote(input));
        }
        self.volumes.resolve(Path::new(input))
    }

    fn volume_endpoint(&self, partial: &str, path: &str) -> Result<Endpoint> {
        let volume = self
            .select_volume(partial)?
            .ok_or_else(|| Error::NotFound(format!("intact volume matching {}", partial)))?;
        Endpoint::volume(volume.tag(), Path::new(path))
    }

    // === Mutations ===

    /// Register a fresh volume at `root`. Nothing is written before commit.
    pub fn create_volume(&mut self, root: &Path, overwrite: bool) -> Result<String> {
        let volume = Volume::new(root, overwrite)?;
        if !overwrite && storage::exists(volume.root()) {
            return Err(Error::Conflict(format!(
                "{} already holds volume storage (use --force to overwrite)",
                volume.root().display()
            )));
        }
        let tag = volume.tag().to_string();
        tracing::info!(volume = %tag, "created volume at {}", volume.root().display());
        self.volumes.register(volume)?;
        Ok(tag)
    }

    /// Mark a volume for removal by exact tag.
    pub fn delete_volume(&mut self, tag: &str, wipe: bool) -> Result<()> {
        let volume = self
            .volumes
            .by_tag_mut(tag)
            .filter(|v| v.intact())
            .ok_or_else(|| Error::NotFound(format!("volume {}", tag)))?;
        volume.delete(&self.tasks, wipe);
        tracing::info!(volume = %tag, wipe, "volume marked for removal");
        Ok(())
    }

    /// Check that every leg of `operation` resolves and return the root of
    /// the volume whose vault would hold its secret.
    pub fn vault_root(&self, operation: &Operation) -> Result<Option<PathBuf>> {
        for leg in operation.legs() {
            if !leg.intact(&self.volumes) {
                return Err(Error::InvalidInput(format!("endpoint {} does not resolve", leg)));
            }
        }
        match operation.decrypted_leg() {
            None => Ok(None),
            Some(Endpoint::Volume { volume, .. }) => {
                let volume = self
                    .volumes
                    .by_tag(volume)
                    .filter(|v| v.intact())
                    .ok_or_else(|| Error::NotFound(format!("volume {}", volume)))?;
                Ok(Some(volume.root().to_path_buf()))
            }
            Some(leg) => Err(Error::InvalidInput(format!(
                "the unencrypted endpoint {} of a {} task must reside on a volume",
                leg,
                operation.name()
            ))),
        }
    }

    /// Register a new task.
    ///
    /// Operations carrying a secret need `token`, which is stored in the vault
    /// of the volume holding the decrypted leg.
    pub fn create_task(
        &mut self,
        operation: Operation,
        filters: Filters,
        token: Option<String>,
    ) -> Result<String> {
        let vault_root = self.vault_root(&operation)?;
        let secret = match (&vault_root, token) {
            (Some(_), None) => {
                return Err(Error::InvalidInput(format!(
                    "a password is required for a {} task",
                    operation.name()
                )));
            }
            (Some(_), Some(token)) => Some(token),
            (None, _) => None,
        };

        let mut task = Task::new(operation, filters);
        task.touch(&self.volumes);
        let tag = task.tag().to_string();
        let summary = task.summary();
        self.tasks.register(task)?;
        if let (Some(root), Some(secret)) = (vault_root, secret) {
            if let Some(volume) = self.volumes.get_mut(&root) {
                volume.insert_secret(&tag, secret);
            }
        }
        tracing::info!(task = %tag, "created task {}", summary);
        Ok(tag)
    }

    /// Mark a task for removal by exact tag.
    pub fn delete_task(&mut self, tag: &str) -> Result<()> {
        let task = self
            .tasks
            .get_mut(tag)
            .filter(|t| t.live())
            .ok_or_else(|| Error::NotFound(format!("task {}", tag)))?;
        task.delete(&self.volumes);
        tracing::info!(task = %tag, "task marked for removal");
        Ok(())
    }

    // === Processing ===

    /// Run intact tasks through the external tools.
    ///
    /// With `patterns` given only tasks matching any of them run. Tasks run in
    /// tag order; `interrupted` is polled before each one.
    pub fn process(
        &self,
        patterns: &[String],
        tools: &Tools,
        executor: &dyn Executor,
        obscurer: &dyn Obscurer,
        interrupted: &dyn Fn() -> bool,
    ) -> Result<ProcessReport> {
        let matcher = TagMatcher::new(patterns)?;
        let selected: Vec<&Task> = self
            .tasks
            .intact(&self.volumes)
            .filter(|t| matcher.is_empty() || matcher.matches(t.tag()))
            .collect();
        if selected.is_empty() {
            tracing::warn!("no intact tasks to process");
        }

        let mut report = ProcessReport::default();
        for task in selected {
            if interrupted() {
                tracing::warn!("interrupted, skipping remaining tasks");
                report.interrupted = true;
                break;
            }
            tracing::info!(task = %task.tag(), "processing {}", task.summary());
            match self.process_task(task, tools, executor, obscurer) {
                Ok(true) => report.succeeded.push(task.tag().to_string()),
                Ok(false) => {
                    tracing::error!(task = %task.tag(), "external tool reported failure");
                    report.failed.push(task.tag().to_string());
                }
                Err(e) => {
                    tracing::error!(task = %task.tag(), "{}", e);
                    report.failed.push(task.tag().to_string());
                }
            }
        }
        Ok(report)
    }

    fn process_task(
        &self,
        task: &Task,
        tools: &Tools,
        executor: &dyn Executor,
        obscurer: &dyn Obscurer,
    ) -> Result<bool> {
        let invocations =
            exec::plan(task, &self.volumes, tools, obscurer, self.settings.simulate)?;
        for invocation in &invocations {
            if !executor.execute(invocation)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn local_endpoint(path: &str) -> Result<Endpoint> {
    if path.is_empty() {
        return Err(Error::InvalidInput("empty local path".to_string()));
    }
    Ok(Endpoint::local(sys::canonical_path(Path::new(path))?))
}

/// `name:rest` with a name of at least two characters (so `C:\` stays a path).
fn is_remote(input: &str) -> bool {
    match input.split_once(':') {
        Some((name, _)) => {
            name.len() >= 2
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }
        None => false,
    }
}
