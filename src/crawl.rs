//! crawl command: Discover and extract inventory for a whole dealer roster
//!
//! Summary goes to stdout as compact JSON, progress to stderr.

use crate::browser::ChromeRenderer;
use crate::catalog::CsvCatalog;
use crate::config::Settings;
use crate::discovery::PageDiscovery;
use crate::listing::ListingExtractor;
use crate::orchestrator::{CrawlOrchestrator, CrawlPipeline};
use crate::patterns::PatternTable;
use crate::roster::CsvRoster;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct CrawlArgs {
    /// Dealer roster CSV
    #[arg(long, short, value_name = "FILE")]
    pub roster: PathBuf,

    /// Vehicle catalog CSV to write (replaced on success)
    #[arg(long, short, value_name = "FILE", default_value = "vehicles.csv")]
    pub output: PathBuf,

    /// Only crawl the first N dealers of the roster
    #[arg(long, value_name = "N")]
    pub max_dealers: Option<usize>,
}

/// Build an orchestrator with the CSV adapters, live discovery and
/// headless-Chrome extraction
pub fn build_orchestrator(args: &CrawlArgs, settings: &Settings) -> Result<CrawlOrchestrator> {
    let patterns = PatternTable::default();

    let discovery = PageDiscovery::new(&settings.discovery)
        .context("Failed to build HTTP client")?
        .with_rules(patterns.inventory_rules.clone());

    let renderer = Arc::new(ChromeRenderer::new(settings.render.clone()));
    let extractor = ListingExtractor::new(renderer)
        .with_patterns(patterns)
        .with_max_containers(settings.crawl.max_containers);

    Ok(CrawlOrchestrator::new(CrawlPipeline {
        roster: Arc::new(CsvRoster::new(&args.roster)),
        locator: Arc::new(discovery),
        listings: Arc::new(extractor),
        catalog: Arc::new(CsvCatalog::new(&args.output)),
        throttle: settings.crawl.throttle(),
    }))
}

pub async fn run_crawl(args: CrawlArgs, settings: &Settings) -> Result<()> {
    let orchestrator = build_orchestrator(&args, settings)?;

    let summary = orchestrator.run(args.max_dealers).await?;

    println!("{}", serde_json::to_string(&summary)?);
    tracing::info!(
        "Done: {}/{} dealers OK, {} vehicles",
        summary.success_count,
        summary.total_dealers,
        summary.total_vehicles
    );

    Ok(())
}
