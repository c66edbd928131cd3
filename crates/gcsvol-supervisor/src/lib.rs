//! Mount supervision for the gcsvol volume plugin.
//!
//! The [`Supervisor`](supervisor::Supervisor) owns a registry of bucket
//! daemons, each wrapping one `gcsfuse` process, and translates the volume
//! plugin lifecycle calls into spawning, reference counting, and teardown.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod daemon;
pub mod process;
pub mod registry;
pub mod relay;
pub mod supervisor;

pub use supervisor::{Supervisor, VolumeInfo};
