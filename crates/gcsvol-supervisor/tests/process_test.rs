//! Supervision of real child processes.
//!
//! A small shell script stands in for `gcsfuse`: it prints a status line on
//! stderr, records its positional arguments, and exits on SIGINT.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use gcsvol_common::config::PluginConfig;
use gcsvol_common::error::VolumeError;
use gcsvol_common::types::DaemonState;
use gcsvol_supervisor::Supervisor;

/// Writes a mounter script and returns a config that runs it through `sh`.
fn config_for(dir: &Path, script: &str) -> PluginConfig {
    let script_path = dir.join("fake-gcsfuse.sh");
    std::fs::write(&script_path, script).expect("write script");
    PluginConfig {
        mounter: PathBuf::from("/bin/sh"),
        mounter_args: vec![script_path.to_string_lossy().into_owned()],
        startup_timeout: Some(Duration::from_secs(10)),
        ..PluginConfig::with_root(dir.join("volumes"))
    }
}

fn mounting_script(dir: &Path, exit_code: i32) -> String {
    let args_file = dir.join("args");
    format!(
        "trap 'exit {exit_code}' INT\n\
         echo \"$1 $2\" > '{}'\n\
         echo 'File system has been successfully mounted.' >&2\n\
         while :; do sleep 1; done\n",
        args_file.display()
    )
}

#[test]
fn real_mounter_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_for(dir.path(), &mounting_script(dir.path(), 0));
    let root = config.root.clone();
    let s = Supervisor::new(config).expect("sh is available");

    s.create("bucket/object").unwrap();
    let mountpoint = s.mount("bucket/object").unwrap();
    assert_eq!(mountpoint, root.join("bucket"));

    let status = s.status("bucket").unwrap().expect("registered");
    assert_eq!(status.state, DaemonState::Mounted);
    assert!(status.pid.is_some());

    let args = std::fs::read_to_string(dir.path().join("args")).expect("script ran");
    assert_eq!(args.trim(), format!("bucket {}", root.join("bucket").display()));

    s.unmount("bucket/object").unwrap();
    assert!(s.status("bucket").unwrap().is_none());
}

#[test]
fn real_mounter_dirty_exit_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let s = Supervisor::new(config_for(dir.path(), &mounting_script(dir.path(), 3)))
        .expect("sh is available");

    s.create("bucket").unwrap();
    let _ = s.mount("bucket").unwrap();
    let err = s.unmount("bucket").unwrap_err();
    assert!(matches!(err, VolumeError::DaemonDirty { ref status, .. } if status == "exit code 3"));
    assert!(s.status("bucket").unwrap().is_none());
}

#[test]
fn real_mounter_failure_is_surfaced_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = "echo 'mountWithArgs: bucket does not exist' >&2\nexit 1\n";
    let s = Supervisor::new(config_for(dir.path(), script)).expect("sh is available");

    s.create("bucket").unwrap();
    let err = s.mount("bucket").unwrap_err();
    match err {
        VolumeError::UnexpectedOutput { line } => {
            assert_eq!(line, "mountWithArgs: bucket does not exist\n");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(s.mount("bucket"), Err(VolumeError::ZombieDaemon { .. })));
}
