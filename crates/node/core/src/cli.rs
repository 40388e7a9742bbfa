//! Command-line interface for a peer pool node.

use std::path::PathBuf;

use clap::Parser;

use crate::args::{LogArgs, PoolArgs};
use crate::constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};

/// Encrypted peer pool node
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file, created with defaults when missing.
    #[arg(long, value_name = "FILE", env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Seed candidates ("host[:port]", or a '|'-separated batch). Repeatable.
    #[arg(long = "seed", value_name = "CANDIDATE")]
    pub seeds: Vec<String>,

    #[command(flatten)]
    pub pool: PoolArgs,

    #[command(flatten)]
    pub log: LogArgs,
}
