//! Node configuration handling.
//!
//! The file holds a `[pool]` table (every [`PoolConfig`] option), a `[log]`
//! table and a `seeds` list. Command line flags override file values.

use std::{fs, path::Path};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tlsp2p_net_peer::Candidate;
use tlsp2p_net_peers::PoolConfig;
use tracing::{debug, info};

use crate::args::LogArgs;
use crate::cli::Cli;

/// Configuration for a peer pool node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Seed candidates, each a single candidate or a `|`-separated batch.
    pub seeds: Vec<String>,

    /// Peer pool options.
    pub pool: PoolConfig,

    /// Logging options.
    pub log: LogArgs,
}

impl NodeConfig {
    /// Load the configuration from the given path, or create a default one if it doesn't exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = fs::read_to_string(path)
                .wrap_err_with(|| format!("reading config {}", path.display()))?;
            let config: Self = toml::from_str(&content)
                .wrap_err_with(|| format!("parsing config {}", path.display()))?;
            debug!(path = %path.display(), "loaded configuration");
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Save the configuration to the given path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).wrap_err_with(|| format!("writing config {}", path.display()))?;

        Ok(())
    }

    /// Apply command line arguments to override the configuration.
    ///
    /// Seeds given on the command line replace the file's list.
    pub fn apply_cli_args(&mut self, cli: &Cli) {
        cli.pool.apply_to(&mut self.pool);
        self.log.merge(&cli.log);
        if !cli.seeds.is_empty() {
            self.seeds.clone_from(&cli.seeds);
        }
    }

    /// Loads `cli.config` and applies the remaining flags on top.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = Self::load_or_create(&cli.config)?;
        config.apply_cli_args(cli);
        Ok(config)
    }

    /// Validated pool options.
    pub fn pool_config(&self) -> Result<PoolConfig> {
        self.pool
            .validate()
            .wrap_err("invalid [pool] configuration")?;
        Ok(self.pool.clone())
    }

    /// Every seed entry split into individual candidates.
    pub fn seed_candidates<S>(&self) -> Vec<Candidate<S>> {
        self.seeds
            .iter()
            .flat_map(|seed| Candidate::parse_batch(seed))
            .collect()
    }
}
