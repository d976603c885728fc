//! rclone command lines for the copy-family operations.

use crate::exec::{Invocation, Tools, location};
use crate::models::{CryptMode, Encryption, Filters, Rclone, Task};
use crate::registry::VolumeRegistry;
use crate::{Error, Result};

/// Build the single rclone invocation of a transfer.
///
/// `verb` is the rclone subcommand with its mode flags, e.g. `["copy", "--update"]`.
/// An encrypted leg is wrapped in an on-the-fly crypt remote keyed by `token`.
pub fn transfer(
    verb: &[&str],
    payload: &Rclone,
    task: &Task,
    volumes: &VolumeRegistry,
    tools: &Tools,
    token: Option<&str>,
    simulate: bool,
) -> Result<Vec<Invocation>> {
    let mut source = location(&payload.source, volumes)?;
    let mut destination = location(&payload.destination, volumes)?;
    if let Some(encryption) = &payload.encryption {
        let token = token
            .ok_or_else(|| Error::NotFound(format!("secret of task {}", task.tag())))?;
        match encryption.mode {
            CryptMode::Encrypt => destination = crypt_remote(&destination, token, encryption),
            CryptMode::Decrypt => source = crypt_remote(&source, token, encryption),
        }
    }
    let invocation = Invocation::new(tools.rclone.clone())
        .args(verb.iter().copied())
        .flag_if(simulate, "--dry-run")
        .args(payload.options.iter().cloned())
        .args(filter_args(task.filters()))
        .arg(source)
        .arg(destination);
    Ok(vec![invocation])
}

/// rclone filter rules: excludes first, then includes, then a catch-all
/// exclude when any include is present.
pub fn filter_args(filters: &Filters) -> Vec<String> {
    let mut args = Vec::new();
    for pattern in &filters.exclude {
        args.push("--filter".to_string());
        args.push(format!("- {}", pattern));
    }
    for pattern in &filters.include {
        args.push("--filter".to_string());
        args.push(format!("+ {}", pattern));
    }
    if !filters.include.is_empty() {
        args.push("--filter".to_string());
        args.push("- **".to_string());
    }
    args
}

/// Connection string of a crypt remote layered over `location`.
pub fn crypt_remote(location: &str, token: &str, encryption: &Encryption) -> String {
    format!(
        ":crypt,remote={},password={},filename_encryption={},filename_encoding={}:",
        quote(location),
        quote(token),
        encryption.filename_encryption.as_str(),
        encryption.filename_encoding.as_str()
    )
}

/// Quote a connection string parameter; embedded quotes are doubled.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
