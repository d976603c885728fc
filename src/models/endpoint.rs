//! Task endpoints.
//!
//! An endpoint is a value describing one leg of a task: a bare local path,
//! a path relative to a managed volume, or an opaque rclone remote.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::registry::VolumeRegistry;
use crate::{Error, Result};

/// One leg of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "lowercase")]
pub enum Endpoint {
    /// Absolute filesystem path outside of any volume.
    Local { root: PathBuf },

    /// Path relative to the root of the volume with the given tag.
    Volume {
        volume: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        path: String,
    },

    /// Opaque rclone remote specification (`name:path`), passed through as-is.
    Remote { remote: String },
}

impl Endpoint {
    /// Local endpoint for an absolute path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Endpoint::Local { root: root.into() }
    }

    /// Volume-relative endpoint. The relative path is stored with `/` separators.
    ///
    /// Fails if the path is absolute or climbs out through `..`.
    pub fn volume(tag: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Endpoint::Volume {
            volume: tag.into(),
            path: portable_path(path)?,
        })
    }

    /// Remote pass-through endpoint.
    pub fn remote(remote: impl Into<String>) -> Self {
        Endpoint::Remote {
            remote: remote.into(),
        }
    }

    /// Generation of the endpoint.
    ///
    /// Mirrors the owning volume's generation for volume endpoints, 0 otherwise.
    pub fn generation(&self, volumes: &VolumeRegistry) -> u64 {
        match self {
            Endpoint::Volume { volume, .. } => {
                volumes.by_tag(volume).map(|v| v.generation()).unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Check whether the endpoint currently resolves.
    pub fn intact(&self, volumes: &VolumeRegistry) -> bool {
        match self {
            Endpoint::Volume { volume, .. } => volumes.by_tag(volume).is_some_and(|v| v.intact()),
            _ => true,
        }
    }

    /// Check whether the endpoint lives in the volume with the given tag.
    pub fn refers(&self, volume_tag: &str) -> bool {
        matches!(self, Endpoint::Volume { volume, .. } if volume == volume_tag)
    }

    /// Tag of the owning volume, if any.
    pub fn volume_tag(&self) -> Option<&str> {
        match self {
            Endpoint::Volume { volume, .. } => Some(volume),
            _ => None,
        }
    }

    /// Concrete location understood by external tools.
    ///
    /// Returns `None` for a volume endpoint whose volume is not intact.
    pub fn location(&self, volumes: &VolumeRegistry) -> Option<String> {
        match self {
            Endpoint::Local { root } => Some(root.display().to_string()),
            Endpoint::Volume { volume, path } => {
                let v = volumes.by_tag(volume).filter(|v| v.intact())?;
                let mut location = v.root().to_path_buf();
                for part in path.split('/').filter(|p| !p.is_empty()) {
                    location.push(part);
                }
                Some(location.display().to_string())
            }
            Endpoint::Remote { remote } => Some(remote.clone()),
        }
    }

    /// True for remote pass-through endpoints.
    pub fn is_remote(&self) -> bool {
        matches!(self, Endpoint::Remote { .. })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local { root } => write!(f, "{}", root.display()),
            Endpoint::Volume { volume, path } => write!(f, ":{}:{}", volume, path),
            Endpoint::Remote { remote } => write!(f, "{}", remote),
        }
    }
}

/// Render a relative path with `/` separators, dropping `.` components.
fn portable_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidInput(format!(
                    "volume path must stay inside the volume: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Volume;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_local_endpoint() {
        let volumes = VolumeRegistry::default();
        let e = Endpoint::local("/srv/data");
        assert_eq!(e.generation(&volumes), 0);
        assert!(e.intact(&volumes));
        assert!(!e.refers("01234567"));
        assert_eq!(e.location(&volumes).as_deref(), Some("/srv/data"));
    }

    #[test]
    fn test_volume_endpoint_tracks_registry() {
        let env = TestEnv::new();
        let mut volumes = VolumeRegistry::default();
        let volume = Volume::new(&env.root("v"), false).unwrap();
        let tag = volume.tag().to_string();
        let e = Endpoint::volume(&tag, Path::new("docs/notes")).unwrap();

        assert!(!e.intact(&volumes));
        assert_eq!(e.location(&volumes), None);

        volumes.register(volume).unwrap();
        assert!(e.intact(&volumes));
        assert!(e.refers(&tag));
        assert!(!e.refers("ffffffff"));
        let location = e.location(&volumes).unwrap();
        assert!(location.ends_with(&format!(
            "v{}docs{}notes",
            std::path::MAIN_SEPARATOR,
            std::path::MAIN_SEPARATOR
        )));
    }

    #[test]
    fn test_portable_path() {
        assert_eq!(portable_path(Path::new("a/./b")).unwrap(), "a/b");
        assert_eq!(portable_path(Path::new("")).unwrap(), "");
    }

    #[test]
    fn test_volume_path_cannot_climb_out() {
        let err = Endpoint::volume("abcd1234", Path::new("sub/../../outside")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(Endpoint::volume("abcd1234", Path::new("/etc")).is_err());
    }

    #[test]
    fn test_display() {
        let e = Endpoint::volume("abcd1234", Path::new("x/y")).unwrap();
        assert_eq!(e.to_string(), ":abcd1234:x/y");
        assert_eq!(Endpoint::remote("gdrive:backup").to_string(), "gdrive:backup");
    }

    #[test]
    fn test_serialized_shape() {
        let e = Endpoint::volume("abcd1234", Path::new("")).unwrap();
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json, serde_json::json!({"endpoint": "volume", "volume": "abcd1234"}));

        let json = serde_json::json!({"endpoint": "local", "root": "/tmp"});
        let e: Endpoint = serde_json::from_value(json).unwrap();
        assert_eq!(e, Endpoint::local("/tmp"));

        let bad = serde_json::from_value::<Endpoint>(serde_json::json!({"endpoint": "ftp"}));
        assert!(bad.is_err());
    }
}
