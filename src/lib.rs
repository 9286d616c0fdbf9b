//! dealer-scout: inventory discovery and listing extraction for dealer websites
//!
//! Commands:
//! - crawl: Discover inventory pages and extract vehicles for a dealer roster
//! - discover: Find the inventory page of one homepage
//! - extract: Extract vehicles from one inventory page
//! - init-config: Write a default settings file

pub mod browser;
pub mod catalog;
pub mod config;
pub mod crawl;
pub mod discovery;
pub mod init;
pub mod listing;
pub mod orchestrator;
pub mod patterns;
pub mod roster;
pub mod schema;

pub use catalog::{read_catalog, write_catalog, CatalogError, CatalogSink, CsvCatalog};
pub use config::Settings;
pub use discovery::{discover_in_html, PageDiscovery};
pub use listing::ListingExtractor;
pub use orchestrator::{
    CrawlError, CrawlOrchestrator, CrawlPipeline, CrawlState, CrawlStatus, InventoryLocator,
    ListingSource,
};
pub use roster::{CsvRoster, RosterSource};
pub use schema::{
    CrawlSummary, DealerOutcome, DealerRecord, DealerReport, InventoryCandidate, VehicleRecord,
};
