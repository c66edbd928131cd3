//! Unified error type for the gcsvol workspace.
//!
//! Every variant renders to the human-readable message Docker receives in
//! the `Err` field of a plugin response.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// The operation referenced a bucket that has no daemon entry.
    #[error("unknown volume {name}, no gcsfuse instance found")]
    UnknownVolume {
        /// Volume name as requested by the caller.
        name: String,
    },

    /// A registry entry outlived its process.
    #[error("found gcsfuse instance for bucket {bucket} where there should be none")]
    ZombieDaemon {
        /// Bucket whose daemon already exited.
        bucket: String,
    },

    /// Reading the mounter's status line failed.
    #[error("failed to read from gcsfuse, caused by: {source}")]
    BadRead {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The mounter reported something other than a successful mount.
    #[error("Unexpected output from gcsfuse: \"{line}\"")]
    UnexpectedOutput {
        /// The literal first line emitted on stderr.
        line: String,
    },

    /// The mounter did not report its status within the startup timeout.
    #[error("gcsfuse for bucket {bucket} did not report mount status within {timeout:?}")]
    StartupTimeout {
        /// Bucket being mounted.
        bucket: String,
        /// Configured bound on the wait.
        timeout: Duration,
    },

    /// The mounter exited non-successfully while being shut down.
    #[error("gcsfuse for bucket {bucket} did not exit cleanly ({status})")]
    DaemonDirty {
        /// Bucket whose daemon was torn down.
        bucket: String,
        /// Rendered exit status.
        status: String,
    },

    /// Spawning, signaling, or waiting on the mounter failed.
    #[error("failed to {action} gcsfuse for bucket {bucket}: {source}")]
    Process {
        /// Operation that failed (`spawn`, `signal`, `wait`).
        action: &'static str,
        /// Bucket the process belongs to.
        bucket: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A volume name cannot be mapped onto a directory below root.
    #[error("invalid volume name {name:?}: {reason}")]
    InvalidName {
        /// Offending volume name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Internal state could not be accessed.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VolumeError>;
