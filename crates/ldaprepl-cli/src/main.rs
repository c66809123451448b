use anyhow::Result;
use clap::Parser;
use ldaprepl_cli::commands::{self, OutputContext};
use ldaprepl_cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ldaprepl=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ldaprepl=warn".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let output = OutputContext {
        json: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Decode(args) => commands::decode::execute(args, &output),
        Commands::Csn(args) => commands::csn::execute(args, &output),
        Commands::Config(args) => commands::config::execute(args, &output),
    }
}
