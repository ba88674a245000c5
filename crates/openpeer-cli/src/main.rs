//! openpeer CLI: runs an in-process demo mesh and inspects configuration.

mod cli;
mod cmd;

use crate::cli::*;
use clap::Parser;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    match cli.command {
        Commands::Demo { id, peers } => cmd::demo::cmd_demo(cli.config, id, peers),
        Commands::Config => cmd::config::cmd_config_show(cli.config),
    }
}
