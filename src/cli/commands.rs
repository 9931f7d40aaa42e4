//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - chat: run one turn of a conversation
//! - tools: list the tool catalog
//! - check: dry-run the policy engine
//! - history: print a stored conversation

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// opsgate - natural-language operations for one remote host
#[derive(Parser, Debug)]
#[command(name = "opsgate")]
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
    /// Send one message and stream the reply
    Chat {
        /// Conversation ID ([A-Za-z0-9_-], up to 64 chars)
        conversation: String,

        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Print tool output without asking the model to explain it
        #[arg(short, long)]
        plain: bool,
    },

    /// List available tools
    Tools,

    /// Show the policy verdict for a tool call without running it
    Check {
        /// Tool name
        tool: String,

        /// Argument as key=value (repeatable)
        #[arg(short, long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, Value)>,
    },

    /// Print the stored messages of a conversation
    History {
        /// Conversation ID
        conversation: String,
    },
}

/// Parse `key=value`; integers become JSON numbers, everything else a string
pub fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("missing argument name in '{}'", raw));
    }
    let value = match value.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(value),
    };
    Ok((key.to_string(), value))
}
