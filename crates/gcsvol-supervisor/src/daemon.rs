//! Bucket daemon: one supervised mounter process and its reference count.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gcsvol_common::error::{Result, VolumeError};
use gcsvol_common::types::{BucketName, DaemonState};
use serde::Serialize;

use crate::process::{Launcher, MountProcess, ProcessExit};
use crate::relay::{self, Handshake, OutputSink, ReadFailure};

/// Snapshot of a daemon for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    /// Current lifecycle state.
    pub state: DaemonState,
    /// Number of outstanding mounts.
    pub references: usize,
    /// PID of the mounter, once spawned.
    pub pid: Option<u32>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Rendered exit status, once the process is known to have terminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<String>,
}

/// A `gcsfuse` process that owns a bucket.
pub struct BucketDaemon {
    bucket: BucketName,
    mountpoint: PathBuf,
    process: Option<Box<dyn MountProcess>>,
    state: DaemonState,
    refs: usize,
    exit: Option<ProcessExit>,
    created_at: String,
}

impl std::fmt::Debug for BucketDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketDaemon")
            .field("bucket", &self.bucket)
            .field("mountpoint", &self.mountpoint)
            .field("pid", &self.pid())
            .field("state", &self.state)
            .field("refs", &self.refs)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl BucketDaemon {
    /// Creates a daemon in the `Unstarted` state with no references.
    #[must_use]
    pub fn new(bucket: BucketName, mountpoint: PathBuf) -> Self {
        Self {
            bucket,
            mountpoint,
            process: None,
            state: DaemonState::Unstarted,
            refs: 0,
            exit: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Bucket this daemon mounts.
    #[must_use]
    pub const fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    /// Directory the bucket is mounted on.
    #[must_use]
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Last known lifecycle state; see [`refresh`](Self::refresh).
    #[must_use]
    pub const fn state(&self) -> DaemonState {
        self.state
    }

    /// Outstanding mount references.
    #[must_use]
    pub const fn refs(&self) -> usize {
        self.refs
    }

    /// PID of the mounter, once spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.pid())
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            state: self.state,
            references: self.refs,
            pid: self.pid(),
            created_at: self.created_at.clone(),
            exit: self.exit.map(|exit| exit.to_string()),
        }
    }

    /// Polls the process and moves to `Exited` if it terminated on its own.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Process`] if the status cannot be queried.
    pub fn refresh(&mut self) -> Result<DaemonState> {
        if self.state == DaemonState::Exited {
            return Ok(self.state);
        }
        if let Some(process) = self.process.as_mut() {
            let polled = process.try_wait().map_err(|source| VolumeError::Process {
                action: "wait",
                bucket: self.bucket.to_string(),
                source,
            })?;
            if let Some(exit) = polled {
                tracing::warn!(bucket = %self.bucket, %exit, refs = self.refs, "mounter exited unexpectedly");
                self.exit = Some(exit);
                self.state = DaemonState::Exited;
            }
        }
        Ok(self.state)
    }

    /// Whether this entry outlived its process without anyone relying on it.
    #[must_use]
    pub fn is_zombie(&self) -> bool {
        self.state == DaemonState::Exited && self.refs == 0
    }

    /// Takes one mount reference.
    pub const fn acquire(&mut self) {
        self.refs += 1;
    }

    /// Drops one mount reference, never going below zero, and returns the
    /// references left.
    pub const fn release(&mut self) -> usize {
        self.refs = self.refs.saturating_sub(1);
        self.refs
    }

    /// Spawns the mounter and waits for its status line.
    ///
    /// On success the daemon is `Mounted` and its stderr keeps flowing into
    /// `sink`. On failure the half-started process is interrupted and reaped
    /// and the daemon is left `Exited`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Process`] if spawning fails,
    /// [`VolumeError::BadRead`] if the status line cannot be read,
    /// [`VolumeError::StartupTimeout`] if it does not arrive in time, and
    /// [`VolumeError::UnexpectedOutput`] if it is not the mount sentinel.
    pub fn start(
        &mut self,
        launcher: &dyn Launcher,
        args: &[OsString],
        sink: &dyn OutputSink,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut process = launcher.launch(args).map_err(|source| VolumeError::Process {
            action: "spawn",
            bucket: self.bucket.to_string(),
            source,
        })?;
        let pid = process.pid();
        self.state = DaemonState::Starting;
        tracing::info!(bucket = %self.bucket, pid, mountpoint = %self.mountpoint.display(), "mounter started");

        let outcome = match process.take_stderr() {
            Some(stderr) => relay::spawn_relay(self.bucket.as_str(), stderr, sink.writer())
                .map_err(|source| VolumeError::BadRead { source })
                .and_then(|rx| self.interpret(relay::await_status(&rx, timeout))),
            None => Err(VolumeError::BadRead {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "mounter stderr was not captured",
                ),
            }),
        };
        self.process = Some(process);

        match outcome {
            Ok(()) => {
                self.state = DaemonState::Mounted;
                tracing::info!(bucket = %self.bucket, pid, "bucket mounted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(bucket = %self.bucket, pid, error = %e, "mount failed, stopping mounter");
                self.abort();
                Err(e)
            }
        }
    }

    /// Interrupts the process and waits for it to exit.
    ///
    /// A daemon that never spawned stops trivially. One that already exited
    /// reports its recorded status.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Process`] if signaling or waiting fails and
    /// [`VolumeError::DaemonDirty`] if the process did not exit cleanly.
    pub fn stop(&mut self) -> Result<()> {
        let Some(process) = self.process.as_mut() else {
            self.state = DaemonState::Exited;
            return Ok(());
        };

        let exit = if let Some(exit) = self.exit {
            exit
        } else {
            let pid = process.pid();
            tracing::info!(bucket = %self.bucket, pid, "interrupting mounter");
            process.interrupt().map_err(|source| VolumeError::Process {
                action: "signal",
                bucket: self.bucket.to_string(),
                source,
            })?;
            let exit = process.wait().map_err(|source| VolumeError::Process {
                action: "wait",
                bucket: self.bucket.to_string(),
                source,
            })?;
            self.exit = Some(exit);
            self.state = DaemonState::Exited;
            exit
        };

        if exit.success() {
            tracing::info!(bucket = %self.bucket, "mounter exited cleanly");
            Ok(())
        } else {
            tracing::warn!(bucket = %self.bucket, %exit, "mounter did not exit cleanly");
            Err(VolumeError::DaemonDirty {
                bucket: self.bucket.to_string(),
                status: exit.to_string(),
            })
        }
    }

    /// Maps the handshake result onto the error taxonomy.
    fn interpret(&self, status: std::result::Result<Handshake, ReadFailure>) -> Result<()> {
        match status {
            Ok(Handshake::Mounted) => Ok(()),
            Ok(Handshake::Unexpected(line)) => Err(VolumeError::UnexpectedOutput { line }),
            Err(ReadFailure::Io(source)) => Err(VolumeError::BadRead { source }),
            Err(ReadFailure::TimedOut(timeout)) => Err(VolumeError::StartupTimeout {
                bucket: self.bucket.to_string(),
                timeout,
            }),
        }
    }

    /// Best-effort teardown after a failed start.
    fn abort(&mut self) {
        self.state = DaemonState::Exited;
        let Some(process) = self.process.as_mut() else {
            return;
        };
        match process.try_wait() {
            Ok(Some(exit)) => {
                self.exit = Some(exit);
                return;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(bucket = %self.bucket, error = %e, "failed to poll mounter"),
        }
        if let Err(e) = process.interrupt() {
            tracing::warn!(bucket = %self.bucket, error = %e, "failed to interrupt mounter");
            return;
        }
        match process.wait() {
            Ok(exit) => self.exit = Some(exit),
            Err(e) => tracing::warn!(bucket = %self.bucket, error = %e, "failed to reap mounter"),
        }
    }
}
