//! Precedence resolution for configuration.
//!
//! ## Scalar precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`BITFERRY_*`)
//! 3. config.kdl
//! 4. Built-in defaults
//!
//! ## Search paths
//!
//! Search paths accumulate instead: CLI `-S` entries come first, then
//! `BITFERRY_SEARCH_PATH`, then config.kdl, duplicates dropped.

use std::path::PathBuf;

use crate::config::schema::{BitferryConfig, CONFIG_FILE};
use crate::exec::Tools;
use crate::{Error, Result};

/// Overrides the config directory (`<config dir>/bitferry` otherwise).
pub const CONFIG_DIR_ENV: &str = "BITFERRY_CONFIG_DIR";
/// Extra search paths, in the platform's PATH list format.
pub const SEARCH_PATH_ENV: &str = "BITFERRY_SEARCH_PATH";
/// Enable/disable mount point scanning (`1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`).
pub const SCAN_MOUNTS_ENV: &str = "BITFERRY_SCAN_MOUNTS";
pub const RCLONE_ENV: &str = "BITFERRY_RCLONE";
pub const RESTIC_ENV: &str = "BITFERRY_RESTIC";
/// Task password, read instead of prompting.
pub const PASSWORD_ENV: &str = "BITFERRY_PASSWORD";
/// Log filter directive, used when no verbosity flag is given.
pub const LOG_ENV: &str = "BITFERRY_LOG";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// config.kdl location (it may not exist)
    pub config_path: PathBuf,
    pub search_paths: Vec<Resolved<PathBuf>>,
    pub scan_mounts: Resolved<bool>,
    pub rclone: Resolved<PathBuf>,
    pub restic: Resolved<PathBuf>,
}

impl ResolvedConfig {
    /// Search path values without sources.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.iter().map(|r| r.value.clone()).collect()
    }

    pub fn tools(&self) -> Tools {
        Tools {
            rclone: self.rclone.value.clone(),
            restic: self.restic.value.clone(),
        }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub search_paths: Vec<PathBuf>,
    pub scan_mounts: Option<bool>,
    pub rclone: Option<PathBuf>,
    pub restic: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_scan_mounts(mut self, scan: bool) -> Self {
        self.scan_mounts = Some(scan);
        self
    }
}

/// Directory holding config.kdl.
pub fn config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("bitferry")),
    }
}

/// Resolve configuration from CLI overrides, the process environment and config.kdl.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let config_path = config_dir()
        .map(|d| d.join(CONFIG_FILE))
        .ok_or_else(|| Error::Other("cannot determine the configuration directory".to_string()))?;
    let file = BitferryConfig::load_from_file(&config_path)?;
    resolve_with(overrides, &file, config_path, |name| std::env::var(name).ok())
}

/// Resolve configuration against an explicit environment lookup.
pub fn resolve_with(
    overrides: &ConfigOverrides,
    file: &BitferryConfig,
    config_path: PathBuf,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let env = |name: &str| env(name).filter(|v| !v.is_empty());

    // Search paths accumulate across sources
    let mut search_paths: Vec<Resolved<PathBuf>> = Vec::new();
    let mut add = |path: PathBuf, source: ValueSource| {
        if !search_paths.iter().any(|r| r.value == path) {
            search_paths.push(Resolved::new(path, source));
        }
    };
    for path in &overrides.search_paths {
        add(path.clone(), ValueSource::CliFlag);
    }
    if let Some(list) = env(SEARCH_PATH_ENV) {
        for path in std::env::split_paths(&list).filter(|p| !p.as_os_str().is_empty()) {
            add(path, ValueSource::EnvVar(SEARCH_PATH_ENV.to_string()));
        }
    }
    for path in &file.search_paths {
        add(path.clone(), ValueSource::ConfigFile);
    }

    // Resolve scan_mounts
    let scan_mounts = if let Some(scan) = overrides.scan_mounts {
        Resolved::new(scan, ValueSource::CliFlag)
    } else if let Some(value) = env(SCAN_MOUNTS_ENV) {
        let scan = parse_bool(&value).ok_or_else(|| {
            Error::InvalidInput(format!("{} must be a boolean, got: {}", SCAN_MOUNTS_ENV, value))
        })?;
        Resolved::new(scan, ValueSource::EnvVar(SCAN_MOUNTS_ENV.to_string()))
    } else if let Some(scan) = file.scan_mounts {
        Resolved::new(scan, ValueSource::ConfigFile)
    } else {
        Resolved::new(true, ValueSource::Default)
    };

    let defaults = Tools::default();
    let rclone = resolve_tool(&overrides.rclone, &env, RCLONE_ENV, &file.rclone, defaults.rclone);
    let restic = resolve_tool(&overrides.restic, &env, RESTIC_ENV, &file.restic, defaults.restic);

    Ok(ResolvedConfig {
        config_path,
        search_paths,
        scan_mounts,
        rclone,
        restic,
    })
}

fn resolve_tool(
    flag: &Option<PathBuf>,
    env: &impl Fn(&str) -> Option<String>,
    env_name: &str,
    file: &Option<PathBuf>,
    default: PathBuf,
) -> Resolved<PathBuf> {
    if let Some(path) = flag {
        Resolved::new(path.clone(), ValueSource::CliFlag)
    } else if let Some(path) = env(env_name) {
        Resolved::new(PathBuf::from(path), ValueSource::EnvVar(env_name.to_string()))
    } else if let Some(path) = file {
        Resolved::new(path.clone(), ValueSource::ConfigFile)
    } else {
        Resolved::new(default, ValueSource::Default)
    }
}

/// Parse a boolean environment value.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn resolve(
        overrides: &ConfigOverrides,
        file: &BitferryConfig,
        env: &[(&str, &str)],
    ) -> ResolvedConfig {
        resolve_with(overrides, file, PathBuf::from("/cfg/config.kdl"), env_of(env)).unwrap()
    }

    // === ValueSource ===

    #[test]
    fn test_value_source_display() {
        assert_eq!(format!("{}", ValueSource::EnvVar("FOO".to_string())), "env:FOO");
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::ConfigFile), "config");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    // === Scalars ===

    #[test]
    fn test_resolve_defaults() {
        let config = resolve(&ConfigOverrides::default(), &BitferryConfig::default(), &[]);
        assert!(config.search_paths.is_empty());
        assert_eq!(config.scan_mounts, Resolved::new(true, ValueSource::Default));
        assert_eq!(config.rclone.value, PathBuf::from("rclone"));
        assert_eq!(config.restic.source, ValueSource::Default);
        assert_eq!(config.tools(), Tools::default());
    }

    #[test]
    fn test_resolve_precedence() {
        let file = BitferryConfig {
            scan_mounts: Some(false),
            rclone: Some(PathBuf::from("/file/rclone")),
            restic: Some(PathBuf::from("/file/restic")),
            ..Default::default()
        };
        let env = [(RCLONE_ENV, "/env/rclone"), (SCAN_MOUNTS_ENV, "yes")];

        let config = resolve(&ConfigOverrides::default(), &file, &env);
        assert_eq!(config.rclone.value, PathBuf::from("/env/rclone"));
        assert_eq!(config.rclone.source, ValueSource::EnvVar(RCLONE_ENV.to_string()));
        assert_eq!(config.restic.source, ValueSource::ConfigFile);
        assert!(config.scan_mounts.value);

        let overrides = ConfigOverrides {
            rclone: Some(PathBuf::from("/cli/rclone")),
            ..ConfigOverrides::new().with_scan_mounts(false)
        };
        let config = resolve(&overrides, &file, &env);
        assert_eq!(config.rclone.value, PathBuf::from("/cli/rclone"));
        assert_eq!(config.scan_mounts, Resolved::new(false, ValueSource::CliFlag));
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let config = resolve(
            &ConfigOverrides::default(),
            &BitferryConfig::default(),
            &[(RESTIC_ENV, "")],
        );
        assert_eq!(config.restic.source, ValueSource::Default);
    }

    #[test]
    fn test_invalid_scan_mounts_env() {
        let result = resolve_with(
            &ConfigOverrides::default(),
            &BitferryConfig::default(),
            PathBuf::from("/cfg/config.kdl"),
            env_of(&[(SCAN_MOUNTS_ENV, "sometimes")]),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    // === Search paths ===

    #[test]
    fn test_search_paths_accumulate() {
        let file = BitferryConfig {
            search_paths: vec![PathBuf::from("/file"), PathBuf::from("/shared")],
            ..Default::default()
        };
        let list = std::env::join_paths(["/env", "/shared"]).unwrap();
        let list = list.to_str().unwrap();
        let overrides = ConfigOverrides::new().with_search_path("/cli");

        let config = resolve(&overrides, &file, &[(SEARCH_PATH_ENV, list)]);
        assert_eq!(
            config.search_paths(),
            vec![
                PathBuf::from("/cli"),
                PathBuf::from("/env"),
                PathBuf::from("/shared"),
                PathBuf::from("/file"),
            ]
        );
        assert_eq!(config.search_paths[0].source, ValueSource::CliFlag);
        assert_eq!(
            config.search_paths[2].source,
            ValueSource::EnvVar(SEARCH_PATH_ENV.to_string())
        );
        assert_eq!(config.search_paths[3].source, ValueSource::ConfigFile);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
