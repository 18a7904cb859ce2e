mod cli;
mod config;
mod scenarios;
mod shutdown;
mod watch;

use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.clone())?;
    tracing::debug!(config_path = ?cli.config, "resolved clusterctl config");

    match cli.command {
        Command::Scenario { name } => scenarios::run(name),
        Command::Watch => watch::run(cfg).await,
    }
}
