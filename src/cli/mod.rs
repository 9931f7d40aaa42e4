//! CLI module for opsgate - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for chatting, listing
//! tools, dry-running the policy engine, and reading history.

pub mod commands;

pub use commands::Cli;
