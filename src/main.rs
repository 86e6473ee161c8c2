use anyhow::Result;
use clap::{Parser, Subcommand};
use spotfeed::core::config::AppConfig;
use spotfeed::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an env file to load before reading the environment
    #[arg(short, long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll prices and serve the latest ones (default)
    Serve,
    /// Fetch one price from the configured provider and print it
    Fetch {
        /// Base instrument, e.g. BTC
        base: String,
        /// Quoted instrument, defaults to QUOTED_CURRENCY
        #[arg(short, long)]
        quoted: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match AppConfig::load(cli.env_file.as_deref()) {
        Ok(config) => match cli.command.unwrap_or(Commands::Serve) {
            Commands::Serve => spotfeed::run(config).await,
            Commands::Fetch { base, quoted } => {
                spotfeed::fetch_once(&config, &base, quoted.as_deref())
                    .await
                    .map(|price| println!("{price}"))
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
