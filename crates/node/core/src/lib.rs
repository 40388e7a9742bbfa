//! Node infrastructure for the peer pool.
//!
//! - [`args`] - CLI argument structs for pool and logging configuration
//! - [`cli`] - Top-level command line parser
//! - [`config`] - TOML configuration loading and CLI overrides
//! - [`logging`] - Logging initialization

pub mod args;
pub mod cli;
pub mod config;
pub mod constants;
pub mod logging;
