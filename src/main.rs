//! factkeep CLI - Entry point
//!
//! Usage: factkeep <command> [options]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use factkeep::cli::utils::Workspace;
use factkeep::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // --verbose beats RUST_LOG; logs go to stderr so --format json stays clean
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Init(args) = cli.command {
        return factkeep::cli::init::run(args);
    }

    let ws = Workspace::discover(cli.config.as_deref(), cli.project.as_deref())?;
    match cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Add(args) => factkeep::cli::add::run(args, &ws),
        Commands::Ingest(args) => factkeep::cli::ingest::run(args, &ws),
        Commands::Recall(args) => factkeep::cli::recall::run_recall(args, &ws),
        Commands::Semantic(args) => factkeep::cli::recall::run_semantic(args, &ws),
        Commands::Concepts(args) => factkeep::cli::recall::run_concepts(args, &ws),
        Commands::Explain(args) => factkeep::cli::explain::run(args, &ws),
        Commands::Conflicts(args) => factkeep::cli::conflicts::run(args, &ws),
        Commands::Changes(args) => factkeep::cli::changes::run(args, &ws),
        Commands::Promote(args) => factkeep::cli::promote::run(args, &ws),
        Commands::Stats(args) => factkeep::cli::stats::execute(args, &ws),
    }
}
