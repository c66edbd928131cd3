//! System-wide constants and default paths.

/// Default root directory; every bucket gets its own subdirectory below it.
pub const DEFAULT_ROOT: &str = "/var/lib/docker-volumes/gcs";

/// Socket address by convention. Docker looks for plugin sockets here, so
/// this has to stay in sync with upstream.
pub const DEFAULT_SOCKET: &str = "/run/docker/plugins/gcs.sock";

/// Name of the mounter binary looked up on `PATH`.
pub const MOUNTER_BINARY: &str = "gcsfuse";

/// Mounter flag that precedes the service account key file path.
pub const KEY_FILE_FLAG: &str = "--key-file";

/// First line `gcsfuse` writes to stderr once the bucket is mounted.
pub const MOUNT_SENTINEL: &str = "File system has been successfully mounted.\n";

/// Default bound on the wait for the mounter's status line, in seconds.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

/// Binary name for the plugin executable.
pub const BIN_NAME: &str = "docker-volume-gcs";
