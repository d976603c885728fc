//! Option bags for external tools.
//!
//! Users pass extra tool options either as a profile name, a literal
//! comma-separated option list, or `-` to disable them. The choice is
//! resolved once, when a task is created, against a fixed profile table;
//! the resulting option list is what gets persisted.

use std::str::FromStr;

use crate::{Error, Result};

/// Unresolved option selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OptionSpec {
    /// Nothing given, use the table default
    #[default]
    Unset,
    /// Explicitly disabled (`-`)
    Disabled,
    /// Profile name looked up in the table
    Named(String),
    /// Literal option list
    Literal(Vec<String>),
}

impl FromStr for OptionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(OptionSpec::Unset);
        }
        if s == "-" {
            return Ok(OptionSpec::Disabled);
        }
        if s.starts_with('-') {
            let options = s
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
            return Ok(OptionSpec::Literal(options));
        }
        if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Ok(OptionSpec::Named(s.to_lowercase()));
        }
        Err(Error::InvalidInput(format!(
            "expected profile name, option list starting with '-', or '-' to disable, got: {}",
            s
        )))
    }
}

/// A fixed table of named option profiles.
#[derive(Debug)]
pub struct ProfileTable {
    /// What the options are for, used in error messages
    pub purpose: &'static str,
    /// Profile used when nothing is specified (`None` = options disabled)
    pub default: Option<&'static str>,
    pub profiles: &'static [(&'static str, &'static [&'static str])],
}

impl ProfileTable {
    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Option<Vec<String>> {
        self.profiles
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, opts)| opts.iter().map(|o| o.to_string()).collect())
    }

    /// Names of every profile in the table.
    pub fn names(&self) -> Vec<&'static str> {
        self.profiles.iter().map(|(n, _)| *n).collect()
    }
}

impl OptionSpec {
    /// Resolve against a profile table.
    ///
    /// `Ok(None)` means the options are disabled.
    pub fn resolve(&self, table: &ProfileTable) -> Result<Option<Vec<String>>> {
        match self {
            OptionSpec::Unset => Ok(table.default.and_then(|name| table.get(name))),
            OptionSpec::Disabled => Ok(None),
            OptionSpec::Named(name) => table.get(name).map(Some).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown {} profile '{}' (expected one of: {})",
                    table.purpose,
                    name,
                    table.names().join(", ")
                ))
            }),
            OptionSpec::Literal(options) => Ok(Some(options.clone())),
        }
    }
}

/// Extra options for rclone transfers.
pub const RCLONE_PROCESS: ProfileTable = ProfileTable {
    purpose: "rclone",
    default: Some("default"),
    profiles: &[
        ("default", &["--metadata"]),
        ("fast", &["--metadata", "--transfers=16", "--checkers=32"]),
        ("checksum", &["--metadata", "--checksum"]),
    ],
};

/// Extra options for `restic backup`.
pub const RESTIC_BACKUP: ProfileTable = ProfileTable {
    purpose: "restic backup",
    default: None,
    profiles: &[
        ("compressed", &["--compression=max"]),
        ("fast", &["--compression=off"]),
    ],
};

/// Retention policy passed to `restic forget` after a backup.
pub const RESTIC_FORGET: ProfileTable = ProfileTable {
    purpose: "restic forget",
    default: Some("default"),
    profiles: &[
        (
            "default",
            &[
                "--keep-within-hourly=24h",
                "--keep-within-daily=7d",
                "--keep-within-weekly=30d",
                "--keep-within-monthly=1y",
                "--keep-within-yearly=100y",
            ],
        ),
        ("minimal", &["--keep-last=1"]),
    ],
};

/// Options for `restic check` after a backup.
pub const RESTIC_CHECK: ProfileTable = ProfileTable {
    purpose: "restic check",
    default: None,
    profiles: &[
        ("default", &[]),
        ("spot", &["--read-data-subset=10%"]),
        ("full", &["--read-data"]),
    ],
};

/// Extra options for `restic restore`.
pub const RESTIC_RESTORE: ProfileTable = ProfileTable {
    purpose: "restic restore",
    default: None,
    profiles: &[("verify", &["--verify"])],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec() {
        assert_eq!("".parse::<OptionSpec>().unwrap(), OptionSpec::Unset);
        assert_eq!("-".parse::<OptionSpec>().unwrap(), OptionSpec::Disabled);
        assert_eq!("Fast".parse::<OptionSpec>().unwrap(), OptionSpec::Named("fast".to_string()));
        assert_eq!(
            "--checksum, --transfers=8".parse::<OptionSpec>().unwrap(),
            OptionSpec::Literal(vec!["--checksum".to_string(), "--transfers=8".to_string()])
        );
        assert!("bad name!".parse::<OptionSpec>().is_err());
    }

    #[test]
    fn test_resolve_unset_uses_default() {
        let opts = OptionSpec::Unset.resolve(&RCLONE_PROCESS).unwrap();
        assert_eq!(opts, Some(vec!["--metadata".to_string()]));

        let opts = OptionSpec::Unset.resolve(&RESTIC_CHECK).unwrap();
        assert_eq!(opts, None);
    }

    #[test]
    fn test_resolve_named_and_disabled() {
        let opts = OptionSpec::Named("full".to_string()).resolve(&RESTIC_CHECK).unwrap();
        assert_eq!(opts, Some(vec!["--read-data".to_string()]));

        let opts = OptionSpec::Named("default".to_string()).resolve(&RESTIC_CHECK).unwrap();
        assert_eq!(opts, Some(Vec::new()));

        assert_eq!(OptionSpec::Disabled.resolve(&RESTIC_FORGET).unwrap(), None);
    }

    #[test]
    fn test_resolve_unknown_profile() {
        let err = OptionSpec::Named("nope".to_string())
            .resolve(&RESTIC_FORGET)
            .unwrap_err();
        assert!(err.to_string().contains("unknown restic forget profile 'nope'"));
        assert!(err.to_string().contains("minimal"));
    }
}
