//! safe-authz: operator CLI for Safe transaction authorization

mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Digest(args) => commands::digest::run(args, cli.json),
        Commands::RejectionHash(args) => commands::digest::run_rejection(args, cli.json),
        Commands::Policy(args) => commands::policy::run(args, cli.json),
        Commands::Aggregate(args) => commands::aggregate::run(args, cli.json),
        Commands::ParseUri(args) => commands::bridge::run(args, cli.json),
        Commands::Watch(args) => commands::watch::run(args, cli.json).await,
    }
}
