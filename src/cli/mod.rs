//! CLI module for botqueue - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for dry-run simulation
//! and configuration inspection.

pub mod commands;

pub use commands::Cli;
