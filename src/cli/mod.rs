//! CLI module for watchpuppy.
//!
//! Provides command-line interface parsing and the watch command.

pub mod args;
pub mod commands;

pub use args::Cli;
