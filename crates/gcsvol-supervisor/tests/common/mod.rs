//! Scripted mounter processes for supervisor tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::ffi::OsString;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gcsvol_common::config::PluginConfig;
use gcsvol_common::constants::MOUNT_SENTINEL;
use gcsvol_supervisor::Supervisor;
use gcsvol_supervisor::process::{Launcher, MountProcess, ProcessExit};
use gcsvol_supervisor::relay::MemorySink;
use nix::errno::Errno;

/// What a fake mounter writes to stderr.
#[derive(Debug, Clone)]
pub enum Stderr {
    /// Fixed bytes, then end of stream.
    Script(Vec<u8>),
    /// Nothing until the process exits.
    Silent,
}

/// System call a fake process fails on during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Delivering SIGINT fails with `ESRCH`.
    Interrupt,
    /// Reaping fails with `ECHILD`.
    Wait,
}

/// Shared view of one fake process, kept by the test after spawn.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandle {
    exit: Arc<Mutex<Option<ProcessExit>>>,
    interrupts: Arc<AtomicUsize>,
}

impl ProcessHandle {
    /// Makes the process terminate outside the supervisor's control.
    pub fn exit_on_its_own(&self, exit: ProcessExit) {
        *self.exit.lock().unwrap() = Some(exit);
    }

    /// Number of interrupts delivered.
    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// Whether the process is still alive.
    pub fn is_running(&self) -> bool {
        self.exit.lock().unwrap().is_none()
    }

    fn exit(&self) -> Option<ProcessExit> {
        *self.exit.lock().unwrap()
    }
}

struct FakeProcess {
    pid: u32,
    stderr: Option<Stderr>,
    handle: ProcessHandle,
    exit_on_interrupt: ProcessExit,
    fault: Option<Fault>,
}

/// Stream that stays silent until its process exits.
struct SilentStream(ProcessHandle);

impl Read for SilentStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        while self.0.is_running() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(0)
    }
}

impl MountProcess for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stderr.take().map(|stderr| match stderr {
            Stderr::Script(bytes) => Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>,
            Stderr::Silent => Box::new(SilentStream(self.handle.clone())),
        })
    }

    fn interrupt(&mut self) -> io::Result<()> {
        let _ = self.handle.interrupts.fetch_add(1, Ordering::SeqCst);
        if self.fault == Some(Fault::Interrupt) {
            return Err(io::Error::from(Errno::ESRCH));
        }
        let mut exit = self.handle.exit.lock().unwrap();
        if exit.is_none() {
            *exit = Some(self.exit_on_interrupt);
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        if self.fault == Some(Fault::Wait) {
            return Err(io::Error::from(Errno::ECHILD));
        }
        loop {
            if let Some(exit) = self.handle.exit() {
                return Ok(exit);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.handle.exit())
    }
}

/// Launcher that hands out scripted processes and records every spawn.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    stderr: Stderr,
    exit_on_interrupt: ProcessExit,
    fault: Option<Fault>,
    next_pid: Arc<AtomicU32>,
    launches: Arc<Mutex<Vec<Vec<OsString>>>>,
    handles: Arc<Mutex<Vec<ProcessHandle>>>,
}

impl FakeLauncher {
    fn new(stderr: Stderr, exit_on_interrupt: ProcessExit) -> Self {
        Self {
            stderr,
            exit_on_interrupt,
            fault: None,
            next_pid: Arc::new(AtomicU32::new(1000)),
            launches: Arc::new(Mutex::new(Vec::new())),
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mounter that reports success and exits cleanly on interrupt.
    pub fn mounting() -> Self {
        let mut script = MOUNT_SENTINEL.as_bytes().to_vec();
        script.extend_from_slice(b"serving bucket\n");
        Self::new(Stderr::Script(script), ProcessExit::exited(0))
    }

    /// Mounter whose first stderr line is `line`.
    pub fn printing(line: &str) -> Self {
        Self::new(Stderr::Script(line.as_bytes().to_vec()), ProcessExit::exited(1))
    }

    /// Mounter that never reports a status line.
    pub fn silent() -> Self {
        Self::new(Stderr::Silent, ProcessExit::signaled(2))
    }

    /// Same behaviour, but exiting with `exit` when interrupted.
    pub fn exiting_with(self, exit: ProcessExit) -> Self {
        Self {
            exit_on_interrupt: exit,
            ..self
        }
    }

    /// Same behaviour, but teardown fails on `fault`.
    pub fn failing(self, fault: Fault) -> Self {
        Self {
            fault: Some(fault),
            ..self
        }
    }

    /// Number of processes spawned so far.
    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    /// Arguments of every spawn, in order.
    pub fn launches(&self) -> Vec<Vec<OsString>> {
        self.launches.lock().unwrap().clone()
    }

    /// Handle of the `index`-th spawned process.
    pub fn handle(&self, index: usize) -> ProcessHandle {
        self.handles.lock().unwrap()[index].clone()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, args: &[OsString]) -> io::Result<Box<dyn MountProcess>> {
        let handle = ProcessHandle::default();
        self.launches.lock().unwrap().push(args.to_vec());
        self.handles.lock().unwrap().push(handle.clone());
        Ok(Box::new(FakeProcess {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            stderr: Some(self.stderr.clone()),
            handle,
            exit_on_interrupt: self.exit_on_interrupt,
            fault: self.fault,
        }))
    }
}

/// Builds a supervisor over `root` with the given launcher.
pub fn supervisor(root: &Path, launcher: &FakeLauncher) -> (Supervisor, MemorySink) {
    supervisor_with(PluginConfig::with_root(root), launcher)
}

/// Builds a supervisor with a custom configuration.
pub fn supervisor_with(config: PluginConfig, launcher: &FakeLauncher) -> (Supervisor, MemorySink) {
    let sink = MemorySink::new();
    let supervisor =
        Supervisor::with_launcher(config, Box::new(launcher.clone()), Box::new(sink.clone()));
    (supervisor, sink)
}
