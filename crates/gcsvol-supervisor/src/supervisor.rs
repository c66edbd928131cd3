//! Mount supervisor that serves the volume plugin lifecycle.
//!
//! Every operation takes the registry lock for its whole duration,
//! including spawning a mounter and waiting for its status line. Mount and
//! unmount are rare administrative calls, so a slow bucket stalling the
//! others is accepted in exchange for never racing two daemons or two
//! reference count updates.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use gcsvol_common::config::PluginConfig;
use gcsvol_common::error::{Result, VolumeError};
use gcsvol_common::types::{BucketName, DaemonState, Scope};
use serde::Serialize;

use crate::daemon::{BucketDaemon, DaemonStatus};
use crate::process::{self, GcsfuseLauncher, Launcher};
use crate::registry::MountRegistry;
use crate::relay::{OutputSink, StderrSink};

/// A volume as reported by `Get` and `List`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    /// Volume name.
    pub name: String,
    /// Directory the volume is mounted on.
    pub mountpoint: PathBuf,
    /// Daemon status, when a daemon is registered for the bucket.
    pub status: Option<DaemonStatus>,
}

/// Driver capabilities reported to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Visibility of volumes created by this driver.
    pub scope: Scope,
}

/// Owns the mount registry and translates plugin calls into daemon
/// management.
pub struct Supervisor {
    config: PluginConfig,
    launcher: Box<dyn Launcher>,
    sink: Box<dyn OutputSink>,
    registry: Mutex<MountRegistry>,
}

impl Supervisor {
    /// Creates a supervisor that runs the configured mounter executable and
    /// relays its output to stderr.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Config`] if the mounter cannot be found.
    pub fn new(config: PluginConfig) -> Result<Self> {
        let launcher = GcsfuseLauncher::locate(&config.mounter)?;
        Ok(Self::with_launcher(config, Box::new(launcher), Box::new(StderrSink)))
    }

    /// Creates a supervisor with a custom launcher and output sink.
    #[must_use]
    pub fn with_launcher(
        config: PluginConfig,
        launcher: Box<dyn Launcher>,
        sink: Box<dyn OutputSink>,
    ) -> Self {
        Self {
            config,
            launcher,
            sink,
            registry: Mutex::new(MountRegistry::new()),
        }
    }

    /// Registers a daemon for the volume's bucket without spawning it.
    ///
    /// Succeeds without changes if a live or referenced daemon exists.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::ZombieDaemon`] if the registered daemon
    /// exited with no references left, or an I/O error if the mountpoint
    /// cannot be created.
    pub fn create(&self, name: &str) -> Result<()> {
        let bucket = BucketName::from_volume(name)?;
        let mut registry = self.lock()?;

        if let Some(daemon) = registry.get_mut(&bucket) {
            let state = daemon.refresh()?;
            if !daemon.is_zombie() {
                tracing::debug!(%bucket, %state, refs = daemon.refs(), "volume already created");
                return Ok(());
            }
            tracing::warn!(%bucket, "refusing to create over an exited daemon");
            return Err(VolumeError::ZombieDaemon {
                bucket: bucket.to_string(),
            });
        }

        let mountpoint = bucket.mountpoint(&self.config.root);
        std::fs::create_dir_all(&mountpoint).map_err(|e| VolumeError::Io {
            path: mountpoint.clone(),
            source: e,
        })?;
        tracing::info!(%bucket, mountpoint = %mountpoint.display(), "volume created");
        let _ = registry.insert(BucketDaemon::new(bucket, mountpoint));
        Ok(())
    }

    /// Takes a mount reference, spawning the bucket's daemon on first use.
    ///
    /// Returns the mountpoint.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::UnknownVolume`] if the volume was never
    /// created, [`VolumeError::ZombieDaemon`] if its daemon has exited, and
    /// any spawn or handshake error from the first mount.
    pub fn mount(&self, name: &str) -> Result<PathBuf> {
        let bucket = BucketName::from_volume(name)?;
        let mut registry = self.lock()?;

        let daemon = registry
            .get_mut(&bucket)
            .ok_or_else(|| VolumeError::UnknownVolume {
                name: name.to_string(),
            })?;

        if daemon.refresh()? == DaemonState::Exited {
            tracing::warn!(%bucket, refs = daemon.refs(), "mount requested on exited daemon");
            return Err(VolumeError::ZombieDaemon {
                bucket: bucket.to_string(),
            });
        }

        daemon.acquire();
        if daemon.state() == DaemonState::Unstarted {
            let args = process::mount_args(&self.config, &bucket, daemon.mountpoint());
            let started = daemon.start(
                self.launcher.as_ref(),
                &args,
                self.sink.as_ref(),
                self.config.startup_timeout,
            );
            if let Err(e) = started {
                let _ = daemon.release();
                return Err(e);
            }
        } else {
            tracing::debug!(%bucket, refs = daemon.refs(), "reusing running mounter");
        }

        Ok(daemon.mountpoint().to_path_buf())
    }

    /// Drops a mount reference, tearing the daemon down on the last one.
    ///
    /// Unknown volumes are ignored. When the last reference goes, the
    /// entry leaves the registry before the process is stopped, so the slot
    /// is free even if shutdown fails.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::DaemonDirty`] if the mounter did not exit
    /// cleanly and [`VolumeError::Process`] if it could not be signaled or
    /// awaited.
    pub fn unmount(&self, name: &str) -> Result<()> {
        let bucket = BucketName::from_volume(name)?;
        let mut registry = self.lock()?;

        let Some(daemon) = registry.get_mut(&bucket) else {
            tracing::debug!(%bucket, "unmount of unknown volume ignored");
            return Ok(());
        };

        let remaining = daemon.release();
        if remaining > 0 {
            tracing::debug!(%bucket, refs = remaining, "mounter still referenced");
            return Ok(());
        }

        let Some(mut daemon) = registry.remove(&bucket) else {
            return Ok(());
        };
        tracing::info!(%bucket, "last reference released, stopping mounter");
        daemon.stop()
    }

    /// Accepted for protocol completeness; daemon teardown is driven by
    /// unmount.
    ///
    /// # Errors
    ///
    /// Only fails for volume names that map to no bucket.
    pub fn remove(&self, name: &str) -> Result<()> {
        let bucket = BucketName::from_volume(name)?;
        tracing::debug!(%bucket, "remove is a no-op");
        Ok(())
    }

    /// Returns the mountpoint a volume has or would have.
    ///
    /// # Errors
    ///
    /// Only fails for volume names that map to no bucket.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let bucket = BucketName::from_volume(name)?;
        let _registry = self.lock()?;
        Ok(bucket.mountpoint(&self.config.root))
    }

    /// Describes a volume whose directory exists below root.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::UnknownVolume`] if the directory is missing.
    pub fn get(&self, name: &str) -> Result<VolumeInfo> {
        let bucket = BucketName::from_volume(name)?;
        let registry = self.lock()?;

        let mountpoint = bucket.mountpoint(&self.config.root);
        if !mountpoint.is_dir() {
            return Err(VolumeError::UnknownVolume {
                name: name.to_string(),
            });
        }
        Ok(VolumeInfo {
            name: name.to_string(),
            mountpoint,
            status: registry.get(&bucket).map(BucketDaemon::status),
        })
    }

    /// Lists the subdirectories of root as volumes, sorted by name.
    ///
    /// The listing reflects the filesystem, not the registry: a directory
    /// left behind by a torn down daemon is still reported, without status.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if root exists but cannot be read.
    pub fn list(&self) -> Result<Vec<VolumeInfo>> {
        let registry = self.lock()?;
        let root = &self.config.root;

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(VolumeError::Io {
                    path: root.clone(),
                    source: e,
                });
            }
        };

        let mut volumes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VolumeError::Io {
                path: root.clone(),
                source: e,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let status = BucketName::from_volume(&name)
                .ok()
                .and_then(|bucket| registry.get(&bucket).map(BucketDaemon::status));
            volumes.push(VolumeInfo {
                mountpoint: entry.path(),
                name,
                status,
            });
        }
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(volumes)
    }

    /// Reports the fixed, cluster-wide scope of this driver.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            scope: Scope::Global,
        }
    }

    /// Returns the daemon status for a volume's bucket, if registered.
    ///
    /// # Errors
    ///
    /// Fails for invalid names or a poisoned registry lock.
    pub fn status(&self, name: &str) -> Result<Option<DaemonStatus>> {
        let bucket = BucketName::from_volume(name)?;
        let registry = self.lock()?;
        Ok(registry.get(&bucket).map(BucketDaemon::status))
    }

    /// Stops every registered daemon and empties the registry.
    ///
    /// All daemons are stopped even if some fail; the first failure is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first stop error encountered.
    pub fn shutdown(&self) -> Result<()> {
        let daemons = self.lock()?.drain();
        tracing::info!(count = daemons.len(), "stopping all mounters");

        let mut first_error = None;
        for mut daemon in daemons {
            if let Err(e) = daemon.stop() {
                tracing::error!(bucket = %daemon.bucket(), error = %e, "failed to stop mounter");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Locks the registry, mapping a poisoned lock to a domain error.
    fn lock(&self) -> Result<MutexGuard<'_, MountRegistry>> {
        self.registry.lock().map_err(|_| VolumeError::Internal {
            message: "mount registry lock poisoned".into(),
        })
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::Path;

    use super::*;
    use crate::process::MountProcess;
    use crate::relay::MemorySink;

    /// Launcher for tests that never reach the spawn path.
    struct NoLauncher;

    impl Launcher for NoLauncher {
        fn launch(&self, _args: &[OsString]) -> std::io::Result<Box<dyn MountProcess>> {
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no launcher"))
        }
    }

    fn supervisor(root: &Path) -> Supervisor {
        Supervisor::with_launcher(
            PluginConfig::with_root(root),
            Box::new(NoLauncher),
            Box::new(MemorySink::new()),
        )
    }

    #[test]
    fn path_uses_bucket_segment_only() {
        let s = supervisor(Path::new("/mnt/gcs"));
        assert_eq!(s.path("mybucket/myobj").unwrap(), Path::new("/mnt/gcs/mybucket"));
        assert_eq!(s.path("mybucket").unwrap(), Path::new("/mnt/gcs/mybucket"));
    }

    #[test]
    fn capabilities_are_global() {
        let s = supervisor(Path::new("/mnt/gcs"));
        assert_eq!(s.capabilities().scope, Scope::Global);
    }

    #[test]
    fn create_makes_directory_and_registers_unstarted_daemon() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = supervisor(dir.path());
        s.create("photos/2024").unwrap();

        assert!(dir.path().join("photos").is_dir());
        let status = s.status("photos").unwrap().expect("registered");
        assert_eq!(status.state, DaemonState::Unstarted);
        assert_eq!(status.references, 0);
    }

    #[test]
    fn create_twice_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = supervisor(dir.path());
        s.create("photos").unwrap();
        s.create("photos/other").unwrap();
        assert_eq!(s.list().unwrap().len(), 1);
    }

    #[test]
    fn create_rejects_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = supervisor(dir.path());
        assert!(matches!(s.create("../etc"), Err(VolumeError::InvalidName { .. })));
    }

    #[test]
    fn spawn_failure_releases_reference() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = supervisor(dir.path());
        s.create("photos").unwrap();
        let err = s.mount("photos").unwrap_err();
        assert!(matches!(err, VolumeError::Process { action: "spawn", .. }));

        let status = s.status("photos").unwrap().expect("still registered");
        assert_eq!(status.references, 0);
        assert_eq!(status.state, DaemonState::Unstarted);
    }

    #[test]
    fn list_of_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = supervisor(&dir.path().join("absent"));
        assert!(s.list().unwrap().is_empty());
    }

    #[test]
    fn list_skips_plain_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        let s = supervisor(dir.path());
        let names: Vec<_> = s.list().unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["logs"]);
    }

    #[test]
    fn get_requires_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = supervisor(dir.path());
        assert!(matches!(s.get("photos"), Err(VolumeError::UnknownVolume { .. })));

        s.create("photos").unwrap();
        let info = s.get("photos/obj").unwrap();
        assert_eq!(info.name, "photos/obj");
        assert_eq!(info.mountpoint, dir.path().join("photos"));
        assert!(info.status.is_some());
    }

    #[test]
    fn remove_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = supervisor(dir.path());
        s.create("photos").unwrap();
        s.remove("photos").unwrap();
        assert!(s.status("photos").unwrap().is_some());
    }
}
