//! # docker-volume-gcs
//!
//! Docker volume plugin that mounts Google Cloud Storage buckets through
//! `gcsfuse`, one supervised process per bucket.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod logging;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);
    commands::execute(cli)
}
