//! restic command lines for backup and restore.

use std::path::Path;

use crate::exec::{Invocation, Tools, location};
use crate::models::{Endpoint, ResticBackup, ResticRestore, Task};
use crate::registry::VolumeRegistry;
use crate::Result;

/// Environment variable restic reads the repository password from.
pub const PASSWORD_ENV: &str = "RESTIC_PASSWORD";

/// Repository argument: remotes go through restic's rclone backend.
pub fn repository(endpoint: &Endpoint, volumes: &VolumeRegistry) -> Result<String> {
    match endpoint {
        Endpoint::Remote { remote } => Ok(format!("rclone:{}", remote)),
        _ => location(endpoint, volumes),
    }
}

/// A local repository without a `config` file has not been initialized.
fn needs_init(endpoint: &Endpoint, repository: &str) -> bool {
    !endpoint.is_remote() && !Path::new(repository).join("config").exists()
}

fn base(tools: &Tools, repository: &str, password: &str, command: &str) -> Invocation {
    Invocation::new(tools.restic.clone())
        .env(PASSWORD_ENV, password)
        .flag_with_value("--repo", repository)
        .arg(command)
}

/// `init` (when needed), `backup`, then optional `forget --prune` and `check`.
///
/// The backup runs inside the directory so snapshot paths are relative.
pub fn backup(
    payload: &ResticBackup,
    task: &Task,
    volumes: &VolumeRegistry,
    tools: &Tools,
    password: &str,
    simulate: bool,
) -> Result<Vec<Invocation>> {
    let directory = location(&payload.directory, volumes)?;
    let repository = repository(&payload.repository, volumes)?;
    let mut invocations = Vec::new();

    if !simulate && needs_init(&payload.repository, &repository) {
        invocations.push(base(tools, &repository, password, "init"));
    }

    let mut backup = base(tools, &repository, password, "backup")
        .arg(".")
        .flag_if(simulate, "--dry-run")
        .args(payload.options.iter().cloned());
    for pattern in &task.filters().exclude {
        backup = backup.flag_with_value("--exclude", pattern.clone());
    }
    invocations.push(backup.cwd(directory));

    if let Some(options) = &payload.forget {
        invocations.push(
            base(tools, &repository, password, "forget")
                .arg("--prune")
                .flag_if(simulate, "--dry-run")
                .args(options.iter().cloned()),
        );
    }
    if let Some(options) = &payload.check {
        if simulate {
            tracing::debug!(task = %task.tag(), "simulation: skip repository check");
        } else {
            invocations
                .push(base(tools, &repository, password, "check").args(options.iter().cloned()));
        }
    }
    Ok(invocations)
}

/// `restore latest` into the directory.
pub fn restore(
    payload: &ResticRestore,
    task: &Task,
    volumes: &VolumeRegistry,
    tools: &Tools,
    password: &str,
    simulate: bool,
) -> Result<Vec<Invocation>> {
    let directory = location(&payload.directory, volumes)?;
    let repository = repository(&payload.repository, volumes)?;
    let mut restore = base(tools, &repository, password, "restore")
        .arg("latest")
        .flag_with_value("--target", directory)
        .flag_if(simulate, "--dry-run")
        .args(payload.options.iter().cloned());
    for pattern in &task.filters().include {
        restore = restore.flag_with_value("--include", pattern.clone());
    }
    for pattern in &task.filters().exclude {
        restore = restore.flag_with_value("--exclude", pattern.clone());
    }
    Ok(vec![restore])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filters, Operation};
    use std::fs;
    use tempfile::TempDir;

    fn backup_task(payload: &ResticBackup, exclude: &[&str]) -> Task {
        let filters = Filters {
            include: Vec::new(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        };
        Task::new(Operation::Backup(payload.clone()), filters)
    }

    fn commands(invocations: &[Invocation]) -> Vec<&str> {
        invocations.iter().map(|i| i.args[2].as_str()).collect()
    }

    #[test]
    fn test_backup_initializes_fresh_repository() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let payload = ResticBackup {
            directory: Endpoint::local("/home/me"),
            repository: Endpoint::local(repo.clone()),
            options: vec!["--compression=max".to_string()],
            forget: Some(vec!["--keep-last=1".to_string()]),
            check: Some(Vec::new()),
        };
        let task = backup_task(&payload, &["*.cache"]);
        let volumes = VolumeRegistry::default();
        let invs = backup(&payload, &task, &volumes, &Tools::default(), "pw", false).unwrap();

        assert_eq!(commands(&invs), vec!["init", "backup", "forget", "check"]);
        let repo = repo.display().to_string();
        assert_eq!(
            invs[1].args,
            vec![
                "--repo",
                repo.as_str(),
                "backup",
                ".",
                "--compression=max",
                "--exclude",
                "*.cache",
            ]
        );
        assert_eq!(invs[1].cwd.as_deref(), Some(Path::new("/home/me")));
        assert_eq!(invs[2].args[3..], ["--prune", "--keep-last=1"]);
        for inv in &invs {
            assert_eq!(inv.env, vec![(PASSWORD_ENV.to_string(), "pw".to_string())]);
        }
    }

    #[test]
    fn test_backup_existing_repository_skips_init() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config"), "").unwrap();
        let payload = ResticBackup {
            directory: Endpoint::local("/data"),
            repository: Endpoint::local(dir.path()),
            options: Vec::new(),
            forget: None,
            check: None,
        };
        let task = backup_task(&payload, &[]);
        let volumes = VolumeRegistry::default();
        let invs = backup(&payload, &task, &volumes, &Tools::default(), "pw", false).unwrap();
        assert_eq!(commands(&invs), vec!["backup"]);
    }

    #[test]
    fn test_simulated_backup_to_remote() {
        let payload = ResticBackup {
            directory: Endpoint::local("/data"),
            repository: Endpoint::remote("b2:repo"),
            options: Vec::new(),
            forget: Some(Vec::new()),
            check: Some(Vec::new()),
        };
        let task = backup_task(&payload, &[]);
        let volumes = VolumeRegistry::default();
        let invs = backup(&payload, &task, &volumes, &Tools::default(), "pw", true).unwrap();
        assert_eq!(commands(&invs), vec!["backup", "forget"]);
        assert_eq!(invs[0].args[1], "rclone:b2:repo");
        assert!(invs[0].args.contains(&"--dry-run".to_string()));
        assert!(invs[1].args.contains(&"--dry-run".to_string()));
    }

    #[test]
    fn test_restore_latest() {
        let payload = ResticRestore {
            repository: Endpoint::remote("s3:repo"),
            directory: Endpoint::local("/restore"),
            options: vec!["--verify".to_string()],
        };
        let filters = Filters {
            include: vec!["docs".to_string()],
            exclude: vec!["*.iso".to_string()],
        };
        let task = Task::new(Operation::Restore(payload.clone()), filters);
        let volumes = VolumeRegistry::default();
        let invs = restore(&payload, &task, &volumes, &Tools::default(), "pw", false).unwrap();
        assert_eq!(
            invs[0].args,
            vec![
                "--repo", "rclone:s3:repo", "restore", "latest", "--target", "/restore", "--verify",
                "--include", "docs", "--exclude", "*.iso",
            ]
        );
    }
}
