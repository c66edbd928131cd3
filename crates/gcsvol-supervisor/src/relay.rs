//! Mounter stderr relay and the startup handshake.
//!
//! A mounter writes exactly one status line to stderr before it starts
//! logging. The relay thread reads that line, tees it to the driver's own
//! error output, reports it over a channel, and then copies everything else
//! the process writes until the stream closes.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use gcsvol_common::constants::MOUNT_SENTINEL;

/// Destination for mounter stderr output.
pub trait OutputSink: Send + Sync {
    /// Returns a writer appending to the sink.
    fn writer(&self) -> Box<dyn Write + Send>;
}

/// Forwards mounter output to the driver's own stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn writer(&self) -> Box<dyn Write + Send> {
        Box::new(io::stderr())
    }
}

/// In-memory sink that collects everything written to it.
///
/// Test support: lets supervisor and plugin tests assert on relayed mounter
/// output. The plugin binary always relays to [`StderrSink`].
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl OutputSink for MemorySink {
    fn writer(&self) -> Box<dyn Write + Send> {
        Box::new(self.clone())
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Outcome of a completed status line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// The line ended with the mount sentinel.
    Mounted,
    /// Any other line, verbatim.
    Unexpected(String),
}

impl Handshake {
    /// Classifies a complete status line.
    #[must_use]
    pub fn from_line(line: &str) -> Self {
        if line.ends_with(MOUNT_SENTINEL) {
            Self::Mounted
        } else {
            Self::Unexpected(line.to_string())
        }
    }
}

/// Why no status line could be obtained.
#[derive(Debug)]
pub enum ReadFailure {
    /// Reading the stream failed or it closed before a full line.
    Io(io::Error),
    /// No line arrived within the startup timeout.
    TimedOut(Duration),
}

/// Spawns the relay thread for a mounter's stderr stream.
///
/// The returned channel yields the first line (including its newline) or
/// the read error. After reporting, the thread keeps copying the stream to
/// the sink until EOF without any further coordination.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_relay(
    label: &str,
    stream: Box<dyn Read + Send>,
    sink: Box<dyn Write + Send>,
) -> io::Result<Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel();
    let label = label.to_string();
    let _handle = thread::Builder::new()
        .name(format!("gcsfuse-{label}"))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut sink = sink;
            let first = read_status_line(&mut reader, &mut sink);
            let failed = first.is_err();
            // Receiver may be gone after a timeout; the drain still matters.
            let _ = tx.send(first);
            if failed {
                return;
            }
            match io::copy(&mut reader, &mut sink) {
                Ok(bytes) => tracing::debug!(bucket = %label, bytes, "mounter stderr closed"),
                Err(e) => tracing::warn!(bucket = %label, error = %e, "mounter stderr relay failed"),
            }
        })?;
    Ok(rx)
}

/// Waits for the relay to report the status line.
///
/// `None` waits without bound.
///
/// # Errors
///
/// Returns [`ReadFailure::TimedOut`] when the bound elapses and
/// [`ReadFailure::Io`] when the stream failed or the relay vanished.
pub fn await_status(
    rx: &Receiver<io::Result<String>>,
    timeout: Option<Duration>,
) -> Result<Handshake, ReadFailure> {
    let received = match timeout {
        Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
            RecvTimeoutError::Timeout => ReadFailure::TimedOut(limit),
            RecvTimeoutError::Disconnected => ReadFailure::Io(relay_vanished()),
        })?,
        None => rx.recv().map_err(|_| ReadFailure::Io(relay_vanished()))?,
    };
    let line = received.map_err(ReadFailure::Io)?;
    Ok(Handshake::from_line(&line))
}

/// Reads one newline-terminated line and tees it to the sink.
fn read_status_line<R: BufRead, W: Write>(reader: &mut R, sink: &mut W) -> io::Result<String> {
    let mut raw = Vec::new();
    let read = reader.read_until(b'\n', &mut raw)?;
    if read > 0 {
        sink.write_all(&raw)?;
        sink.flush()?;
    }
    if raw.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed before a complete status line",
        ));
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn relay_vanished() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stderr relay stopped without reporting")
}
