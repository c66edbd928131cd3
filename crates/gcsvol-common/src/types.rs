//! Domain primitive types used across the gcsvol workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolumeError};

/// Top-level bucket a volume name refers to.
///
/// A volume name is either `bucket` or `bucket/object`; only the bucket
/// segment selects the daemon and the directory below root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketName(String);

impl BucketName {
    /// Derives the bucket from a volume name: everything before the first
    /// `/`, or the whole name.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidName`] if the bucket segment is empty,
    /// `.`, `..`, or contains a NUL byte.
    pub fn from_volume(name: &str) -> Result<Self> {
        let bucket = name.split_once('/').map_or(name, |(bucket, _)| bucket);
        let reason = match bucket {
            "" => Some("bucket segment is empty"),
            "." | ".." => Some("bucket segment is a relative path component"),
            b if b.contains('\0') => Some("bucket segment contains a NUL byte"),
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(VolumeError::InvalidName {
                name: name.to_string(),
                reason,
            });
        }
        Ok(Self(bucket.to_string()))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the mountpoint of this bucket below `root`.
    #[must_use]
    pub fn mountpoint(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a bucket daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// Registered by `Create`, no process spawned yet.
    Unstarted,
    /// Process spawned, status line not yet seen.
    Starting,
    /// Process reported a successful mount.
    Mounted,
    /// Process has terminated.
    Exited,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::Starting => write!(f, "starting"),
            Self::Mounted => write!(f, "mounted"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Visibility of volumes created by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Volumes exist only on the engine that created them.
    Local,
    /// Volumes are visible across every engine in a cluster.
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Global => write!(f, "global"),
        }
    }
}
