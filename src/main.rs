//! dealer-scout CLI
//!
//! Finds each dealer's inventory page and extracts vehicle listings with
//! headless Chrome.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dealer_scout::config::Settings;
use dealer_scout::crawl::{run_crawl, CrawlArgs};
use dealer_scout::discovery::{run_discover, DiscoverArgs};
use dealer_scout::init::{run_init, InitArgs};
use dealer_scout::listing::{run_extract, ExtractArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dealer-scout")]
#[command(version)]
#[command(about = "Dealer inventory discovery and vehicle listing extraction")]
#[command(long_about = "Finds each dealer's inventory page from its homepage and extracts vehicle listings with headless Chrome.\n\nCommands:\n  crawl          Crawl a whole dealer roster into a vehicle catalog\n  discover       Find the inventory page of one homepage\n  extract        Extract vehicles from one inventory page\n  init-config    Write a default settings file")]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true, env = "DEALER_SCOUT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a dealer roster and write the vehicle catalog
    Crawl(CrawlArgs),
    /// Find the inventory page linked from a dealer homepage
    Discover(DiscoverArgs),
    /// Extract vehicle listings from an inventory page
    Extract(ExtractArgs),
    /// Write a settings file with the default timings
    InitConfig(InitArgs),
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Crawl(args) => run_crawl(args, &Settings::load(config)?).await,
        Commands::Discover(args) => run_discover(args, &Settings::load(config)?).await,
        Commands::Extract(args) => run_extract(args, &Settings::load(config)?).await,
        Commands::InitConfig(args) => run_init(args).await,
    }
}
