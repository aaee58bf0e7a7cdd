//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - simulate: run one request against a synthetic worker pool
//! - config: print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Botqueue - bulk comment scheduling across a pool of bot accounts
#[derive(Parser, Debug)]
#[command(name = "botqueue")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a request against synthetic workers without contacting anything
    Simulate {
        /// Profile or group id to comment on
        target: String,

        /// Number of comments to post
        #[arg(default_value_t = 1)]
        amount: u32,

        /// Treat the target as a group instead of a profile
        #[arg(short, long)]
        group: bool,

        /// Number of synthetic workers
        #[arg(short, long, default_value_t = 5)]
        workers: usize,

        /// Number of proxies the workers are spread over
        #[arg(short, long, default_value_t = 2)]
        proxies: usize,

        /// Mark the last N workers as limited
        #[arg(short, long, default_value_t = 0)]
        limited: usize,

        /// Comment text; repeat for several
        #[arg(short, long = "quote")]
        quotes: Vec<String>,

        /// Override the action delay in milliseconds
        #[arg(short, long)]
        delay_ms: Option<u64>,
    },

    /// Print the effective configuration as YAML
    Config,
}
