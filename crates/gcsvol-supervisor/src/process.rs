//! Mounter process spawning and control.
//!
//! The supervisor talks to mounter processes only through [`Launcher`] and
//! [`MountProcess`], so the lifecycle logic can be exercised without a real
//! `gcsfuse` binary.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, Read};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use gcsvol_common::config::PluginConfig;
use gcsvol_common::constants::KEY_FILE_FLAG;
use gcsvol_common::error::{Result, VolumeError};
use gcsvol_common::types::BucketName;

/// How a mounter process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// A normal exit with the given code.
    #[must_use]
    pub const fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by the given signal number.
    #[must_use]
    pub const fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Whether the process exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// A running mounter process owned by exactly one daemon.
pub trait MountProcess: Send {
    /// OS process identifier.
    fn pid(&self) -> u32;

    /// Hands out the captured stderr stream. Returns `None` once taken.
    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Asks the process to unmount and exit (SIGINT for `gcsfuse`).
    ///
    /// # Errors
    ///
    /// Returns the OS error if the signal cannot be delivered.
    fn interrupt(&mut self) -> io::Result<()>;

    /// Blocks until the process exits.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the wait syscall fails.
    fn wait(&mut self) -> io::Result<ProcessExit>;

    /// Reports the exit status if the process has already terminated.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the status cannot be queried.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;
}

/// Starts mounter processes.
pub trait Launcher: Send + Sync {
    /// Spawns the mounter with the given arguments, stdout inherited and
    /// stderr captured.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the process cannot be started.
    fn launch(&self, args: &[OsString]) -> io::Result<Box<dyn MountProcess>>;
}

/// Launches the real `gcsfuse` executable.
#[derive(Debug, Clone)]
pub struct GcsfuseLauncher {
    program: PathBuf,
}

impl GcsfuseLauncher {
    /// Creates a launcher for an already resolved executable path.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolves the mounter on `PATH` and creates a launcher for it.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Config`] if the executable cannot be found.
    pub fn locate(program: &Path) -> Result<Self> {
        let resolved = which::which(program).map_err(|e| VolumeError::Config {
            message: format!("mounter {} not found: {e}", program.display()),
        })?;
        tracing::debug!(mounter = %resolved.display(), "mounter located");
        Ok(Self::new(resolved))
    }

    /// Returns the executable this launcher runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Launcher for GcsfuseLauncher {
    fn launch(&self, args: &[OsString]) -> io::Result<Box<dyn MountProcess>> {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()?;
        tracing::debug!(pid = child.id(), program = %self.program.display(), "mounter spawned");
        Ok(Box::new(ChildProcess { child }))
    }
}

/// [`MountProcess`] backed by a `std::process::Child`.
struct ChildProcess {
    child: Child,
}

impl MountProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as Box<dyn Read + Send>)
    }

    fn interrupt(&mut self) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let raw = i32::try_from(self.child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(raw), Signal::SIGINT).map_err(io::Error::from)
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        self.child.wait().map(ProcessExit::from)
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }
}

/// Builds the mounter argument list for a bucket.
///
/// Order: extra configured flags, the credential flag when a key file is
/// configured, the bucket, and the absolute mountpoint.
#[must_use]
pub fn mount_args(config: &PluginConfig, bucket: &BucketName, mountpoint: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = config.mounter_args.iter().map(OsString::from).collect();
    if let Some(key_file) = &config.key_file {
        args.push(KEY_FILE_FLAG.into());
        args.push(key_file.as_os_str().to_owned());
    }
    args.push(bucket.as_str().into());
    args.push(mountpoint.as_os_str().to_owned());
    args
}
