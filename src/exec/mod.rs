//! External tool invocation.
//!
//! Tasks are carried out by `rclone` and `restic`. This module turns a task
//! into a list of [`Invocation`]s and hands them to an [`Executor`]; the
//! secret handling needed to talk to rclone crypt and restic goes through an
//! [`Obscurer`].

pub mod rclone;
pub mod restic;

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::models::{Endpoint, Operation, Task};
use crate::registry::VolumeRegistry;
use crate::{Error, Result};

/// Paths of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub rclone: PathBuf,
    pub restic: PathBuf,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            rclone: PathBuf::from("rclone"),
            restic: PathBuf::from("restic"),
        }
    }
}

/// One external command line, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Working directory, inherited when `None`
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a flag followed by its value.
    pub fn flag_with_value(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Append `flag` only when `enabled`.
    pub fn flag_if(self, enabled: bool, flag: &str) -> Self {
        if enabled { self.arg(flag) } else { self }
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for Invocation {
    /// Shell-like rendering for logs. Environment values are not shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runs invocations.
pub trait Executor {
    /// Run to completion. `Ok(false)` means the tool ran and reported failure.
    fn execute(&self, invocation: &Invocation) -> Result<bool>;
}

/// Runs invocations as child processes inheriting stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<bool> {
        tracing::debug!("executing {}", invocation);
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        for (key, value) in &invocation.env {
            command.env(key, value);
        }
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }
        let status = command.status().map_err(|e| {
            Error::Execution(format!("failed to run {}: {}", invocation.program.display(), e))
        })?;
        if !status.success() {
            tracing::debug!("{} exited with {}", invocation.program.display(), status);
        }
        Ok(status.success())
    }
}

/// Converts user passwords to and from the reversible token kept in vaults.
pub trait Obscurer {
    fn obscure(&self, secret: &str) -> Result<String>;
    fn reveal(&self, token: &str) -> Result<String>;
}

/// Uses `rclone obscure` / `rclone reveal`, so vault tokens are directly
/// usable as rclone crypt passwords.
#[derive(Debug, Clone)]
pub struct RcloneObscurer {
    rclone: PathBuf,
}

impl RcloneObscurer {
    pub fn new(rclone: impl Into<PathBuf>) -> Self {
        Self {
            rclone: rclone.into(),
        }
    }

    fn run(&self, args: &[&str], input: Option<&str>) -> Result<String> {
        let mut child = Command::new(&self.rclone)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Execution(format!("failed to run {}: {}", self.rclone.display(), e))
            })?;

        if let (Some(input), Some(stdin)) = (input, child.stdin.as_mut()) {
            stdin.write_all(input.as_bytes())?;
        }
        // Close stdin so rclone sees EOF
        drop(child.stdin.take());

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Execution(format!(
                "rclone {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Obscurer for RcloneObscurer {
    fn obscure(&self, secret: &str) -> Result<String> {
        self.run(&["obscure", "-"], Some(secret))
    }

    fn reveal(&self, token: &str) -> Result<String> {
        self.run(&["reveal", token], None)
    }
}

/// Build the invocations carrying out a task.
pub fn plan(
    task: &Task,
    volumes: &VolumeRegistry,
    tools: &Tools,
    obscurer: &dyn Obscurer,
    simulate: bool,
) -> Result<Vec<Invocation>> {
    let token = secret(task, volumes)?;
    let invocations = match task.operation() {
        Operation::Copy(r) => rclone::transfer(&["copy"], r, task, volumes, tools, token, simulate),
        Operation::Update(r) => {
            rclone::transfer(&["copy", "--update"], r, task, volumes, tools, token, simulate)
        }
        Operation::Synchronize(r) => {
            rclone::transfer(&["sync"], r, task, volumes, tools, token, simulate)
        }
        Operation::Equalize(r) => {
            rclone::transfer(&["bisync"], r, task, volumes, tools, token, simulate)
        }
        Operation::Backup(b) => {
            let password = reveal_required(task, token, obscurer)?;
            restic::backup(b, task, volumes, tools, &password, simulate)
        }
        Operation::Restore(r) => {
            let password = reveal_required(task, token, obscurer)?;
            restic::restore(r, task, volumes, tools, &password, simulate)
        }
    }?;
    for invocation in &invocations {
        tracing::debug!(task = %task.tag(), "planned {}", invocation);
    }
    Ok(invocations)
}

/// Vault token of a task, taken from the volume holding its decrypted leg.
fn secret<'a>(task: &Task, volumes: &'a VolumeRegistry) -> Result<Option<&'a str>> {
    let Some(leg) = task.operation().decrypted_leg() else {
        return Ok(None);
    };
    let volume = leg
        .volume_tag()
        .and_then(|tag| volumes.by_tag(tag))
        .filter(|v| v.intact())
        .ok_or_else(|| {
            Error::NotFound(format!("volume holding the secret of task {}", task.tag()))
        })?;
    volume
        .secret(task.tag())
        .map(Some)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "secret of task {} in volume {}",
                task.tag(),
                volume.tag()
            ))
        })
}

fn reveal_required(task: &Task, token: Option<&str>, obscurer: &dyn Obscurer) -> Result<String> {
    let token = token.ok_or_else(|| Error::NotFound(format!("secret of task {}", task.tag())))?;
    obscurer.reveal(token)
}

/// Concrete location of a leg, failing if its volume is gone.
pub(crate) fn location(endpoint: &Endpoint, volumes: &VolumeRegistry) -> Result<String> {
    endpoint
        .location(volumes)
        .ok_or_else(|| Error::NotFound(format!("endpoint {} does not resolve", endpoint)))
}
