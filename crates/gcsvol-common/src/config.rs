//! Plugin configuration model.
//!
//! Resolved once at startup and handed to the supervisor by value; nothing
//! reads it from global state afterwards.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, VolumeError};

/// Root configuration for the volume plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Directory below which every bucket gets its own mountpoint.
    pub root: PathBuf,
    /// Service account key (JSON) passed to the mounter, if any.
    pub key_file: Option<PathBuf>,
    /// Mounter executable, looked up on `PATH` when not absolute.
    pub mounter: PathBuf,
    /// Extra flags placed before the credential and positional arguments.
    pub mounter_args: Vec<String>,
    /// Unix socket the plugin protocol is served on.
    pub socket: PathBuf,
    /// Bound on the wait for the mounter's status line; `None` waits forever.
    pub startup_timeout: Option<Duration>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(constants::DEFAULT_ROOT),
            key_file: None,
            mounter: PathBuf::from(constants::MOUNTER_BINARY),
            mounter_args: Vec::new(),
            socket: PathBuf::from(constants::DEFAULT_SOCKET),
            startup_timeout: Some(Duration::from_secs(constants::DEFAULT_STARTUP_TIMEOUT_SECS)),
        }
    }
}

impl PluginConfig {
    /// Creates a configuration with defaults and the given root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Checks the configuration for values the plugin cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Config`] if root or socket are relative paths
    /// or the key file does not exist.
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            return Err(VolumeError::Config {
                message: format!("root {} must be an absolute path", self.root.display()),
            });
        }
        if !self.socket.is_absolute() {
            return Err(VolumeError::Config {
                message: format!("socket {} must be an absolute path", self.socket.display()),
            });
        }
        if let Some(key_file) = &self.key_file {
            if !key_file.is_file() {
                return Err(VolumeError::Config {
                    message: format!("key file {} does not exist", key_file.display()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_docker_conventions() {
        let config = PluginConfig::default();
        assert_eq!(config.root, PathBuf::from("/var/lib/docker-volumes/gcs"));
        assert_eq!(config.socket, PathBuf::from("/run/docker/plugins/gcs.sock"));
        assert_eq!(config.mounter, PathBuf::from("gcsfuse"));
        assert_eq!(config.startup_timeout, Some(Duration::from_secs(60)));
        assert!(config.key_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relative_root_is_rejected() {
        let config = PluginConfig::with_root("volumes");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn missing_key_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PluginConfig {
            key_file: Some(dir.path().join("missing.json")),
            ..PluginConfig::with_root(dir.path())
        };
        assert!(matches!(config.validate(), Err(VolumeError::Config { .. })));
    }

    #[test]
    fn existing_key_file_is_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = dir.path().join("key.json");
        std::fs::write(&key, "{}").expect("write key");
        let config = PluginConfig {
            key_file: Some(key),
            ..PluginConfig::with_root(dir.path())
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_value(PluginConfig::default()).expect("serialize");
        assert_eq!(json["root"], "/var/lib/docker-volumes/gcs");
        assert!(json["key_file"].is_null());
    }
}
