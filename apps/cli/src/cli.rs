//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "otapush")]
#[command(version, about = "Push firmware updates to a device over HTTP")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings that override the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Device base URL (e.g. http://192.168.4.1)
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Bytes per chunk-write
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Wait before each status query after a failed chunk
    #[arg(long, global = true)]
    pub retry_delay_ms: Option<u64>,

    /// Give up after this many failed status queries in a row
    #[arg(long, global = true)]
    pub max_reconcile_attempts: Option<u32>,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload an update container (resumable) or a firmware .bin
    Upload {
        /// File to upload
        path: PathBuf,

        /// Send through the resumable session even if the file is not a
        /// valid container
        #[arg(long)]
        force: bool,

        /// Use a single multipart request instead of a session
        #[arg(long)]
        simple: bool,
    },

    /// Show the device's network status
    Status {
        /// Keep polling and print indicator changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Let the device fetch and install a published release
    Release {
        #[command(subcommand)]
        action: ReleaseAction,
    },

    /// Build an update container from a firmware and a filesystem image
    Pack {
        #[arg(long)]
        firmware: PathBuf,

        #[arg(long)]
        filesystem: PathBuf,

        #[arg(short, long, default_value = "update.zip")]
        output: PathBuf,
    },

    /// Check an update container and print its layout
    Inspect {
        path: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Subcommand)]
pub enum ReleaseAction {
    /// Ask the device which release it would install
    Check,

    /// Start the release update and follow its progress
    Update {
        /// Return as soon as the device accepts the request
        #[arg(long)]
        no_wait: bool,
    },
}
