//! Logging CLI arguments.

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::constants::LOG_FILTER_ENV;

/// Logging configuration.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Logging")]
#[serde(default)]
pub struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv, -vvv, etc.).
    #[arg(short, long, action = clap::ArgAction::Count)]
    #[serde(skip)] // CLI-only, count action doesn't make sense in config
    pub verbosity: u8,

    /// Log filter directive (e.g., "tlsp2p_net_peers=debug").
    #[arg(long = "log.filter", value_name = "DIRECTIVE", env = LOG_FILTER_ENV)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json")]
    pub json: bool,
}

impl LogArgs {
    /// Merges command line flags over values loaded from a file.
    pub fn merge(&mut self, cli: &LogArgs) {
        self.quiet |= cli.quiet;
        self.json |= cli.json;
        self.verbosity = self.verbosity.max(cli.verbosity);
        if cli.filter.is_some() {
            self.filter.clone_from(&cli.filter);
        }
    }

    /// Base level implied by the verbosity count.
    pub fn base_level(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
