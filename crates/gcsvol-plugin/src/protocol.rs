//! Wire types of the Docker volume plugin protocol.
//!
//! Field names follow the engine's capitalised JSON keys. Every response
//! except `Plugin.Activate` and `VolumeDriver.Capabilities` carries an
//! `Err` string that is empty on success.

use std::collections::HashMap;
use std::path::PathBuf;

use gcsvol_common::types::Scope;
use gcsvol_supervisor::VolumeInfo;
use gcsvol_supervisor::daemon::DaemonStatus;
use serde::{Deserialize, Serialize};

/// Content type the engine sends and expects back.
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";

/// Subsystem advertised by `Plugin.Activate`.
pub const VOLUME_DRIVER: &str = "VolumeDriver";

/// Body of every request that names a volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VolumeRequest {
    /// Volume name, `bucket` or `bucket/object`.
    #[serde(rename = "Name")]
    pub name: String,
    /// Driver options passed to `docker volume create -o`.
    #[serde(rename = "Opts", default)]
    pub opts: Option<HashMap<String, String>>,
    /// Caller identity on `Mount` and `Unmount`.
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
}

/// Answer to `Plugin.Activate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateResponse {
    /// Implemented plugin subsystems.
    #[serde(rename = "Implements")]
    pub implements: Vec<&'static str>,
}

impl ActivateResponse {
    /// The volume driver handshake.
    #[must_use]
    pub fn volume_driver() -> Self {
        Self {
            implements: vec![VOLUME_DRIVER],
        }
    }
}

/// Answer carrying only an error message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Error message, empty on success.
    #[serde(rename = "Err")]
    pub err: String,
}

impl ErrorResponse {
    /// A response reporting `err`.
    #[must_use]
    pub fn new(err: impl Into<String>) -> Self {
        Self { err: err.into() }
    }
}

/// Answer to `Mount` and `Path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountpointResponse {
    /// Host directory backing the volume.
    #[serde(rename = "Mountpoint")]
    pub mountpoint: PathBuf,
    /// Error message, empty on success.
    #[serde(rename = "Err")]
    pub err: String,
}

impl MountpointResponse {
    /// Successful answer pointing at `mountpoint`.
    #[must_use]
    pub const fn ok(mountpoint: PathBuf) -> Self {
        Self {
            mountpoint,
            err: String::new(),
        }
    }
}

/// One volume in `Get` and `List` answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    /// Volume name as requested.
    #[serde(rename = "Name")]
    pub name: String,
    /// Host directory backing the volume.
    #[serde(rename = "Mountpoint")]
    pub mountpoint: PathBuf,
    /// Daemon status for volumes with a registered mounter.
    #[serde(rename = "Status", skip_serializing_if = "Option::is_none")]
    pub status: Option<DaemonStatus>,
}

impl From<VolumeInfo> for Volume {
    fn from(info: VolumeInfo) -> Self {
        Self {
            name: info.name,
            mountpoint: info.mountpoint,
            status: info.status,
        }
    }
}

/// Answer to `Get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetResponse {
    /// The requested volume.
    #[serde(rename = "Volume")]
    pub volume: Volume,
    /// Error message, empty on success.
    #[serde(rename = "Err")]
    pub err: String,
}

/// Answer to `List`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResponse {
    /// Every known volume.
    #[serde(rename = "Volumes")]
    pub volumes: Vec<Volume>,
    /// Error message, empty on success.
    #[serde(rename = "Err")]
    pub err: String,
}

/// Answer to `Capabilities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilitiesResponse {
    /// Driver capabilities.
    #[serde(rename = "Capabilities")]
    pub capabilities: DriverCapabilities,
}

/// Capabilities object nested in [`CapabilitiesResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverCapabilities {
    /// Whether volumes are visible per engine or cluster wide.
    #[serde(rename = "Scope")]
    pub scope: Scope,
}
