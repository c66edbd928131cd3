//! # gcsvol-plugin
//!
//! Docker volume plugin protocol for the gcsvol driver.
//!
//! Docker talks to volume plugins with JSON POST requests over a Unix
//! socket. This crate maps those requests onto the
//! [`Supervisor`](gcsvol_supervisor::Supervisor) and its answers back onto
//! the wire format.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod protocol;
pub mod server;

pub use server::PluginServer;
