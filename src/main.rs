use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use syncq::cli::args::{Cli, Commands};
use syncq::cli::commands::{self, Context};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    if let Commands::Completions { shell } = cli.command {
        println!("{}", commands::completions(shell)?);
        return Ok(());
    }

    let (paths, config) =
        Context::resolve(cli.home).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::open(paths, config);

    let output = match cli.command {
        Commands::Status => commands::status(&ctx, format).await?,
        Commands::List => commands::list(&ctx, format).await?,
        Commands::Add {
            action_type,
            data,
            priority,
        } => commands::add(&ctx, &action_type, data.as_deref(), priority, format).await?,
        Commands::Remove { id } => commands::remove(&ctx, &id, format).await?,
        Commands::Clear { force } => commands::clear(&ctx, force, format).await?,
        Commands::Drain { url } => commands::drain(&ctx, url, format).await?,
        Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
