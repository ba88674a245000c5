//! Clap CLI definitions for openpeer.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  openpeer demo                 Parent plus one child on an in-process hub
  openpeer demo --peers 3       Parent plus three children
  openpeer demo --id room       Run the demo on channel id \"room\"
  openpeer config               Print the effective configuration

Set RUST_LOG=debug to watch the handshake and call traffic.";

/// Open Peer Channel: events and remote calls between peers.
#[derive(Parser)]
#[command(name = "openpeer", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a parent and its children on an in-process hub.
    Demo {
        /// Channel id, overriding the config file.
        #[arg(long)]
        id: Option<String>,
        /// Number of child channels.
        #[arg(long, default_value_t = 1)]
        peers: usize,
    },
    /// Print the effective configuration as TOML.
    Config,
}
