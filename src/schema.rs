//! Dealer, vehicle and crawl-outcome records
//!
//! Shared by discovery, extraction, the orchestrator and the CSV adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the dealer roster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerRecord {
    pub brand: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    /// Homepage URL, may be empty
    pub website: String,
    pub validation_status: String,
    pub last_checked: String,
}

impl DealerRecord {
    /// Homepage to start discovery from, or `None` when the roster has no website.
    ///
    /// Bare hosts (`www.dealer.com`) are given an `https://` scheme.
    pub fn homepage(&self) -> Option<String> {
        let site = self.website.trim();
        if site.is_empty() {
            return None;
        }
        if site.starts_with("http://") || site.starts_with("https://") {
            Some(site.to_string())
        } else {
            Some(format!("https://{}", site))
        }
    }
}

/// A scored link that may be the dealer's inventory page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCandidate {
    pub url: String,
    pub confidence_score: u32,
    /// Path substring of the rule that produced this score
    pub matched_pattern: String,
    pub anchor_text: String,
}

/// One extracted vehicle listing, also one row of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleRecord {
    pub dealer: String,
    pub brand: String,
    pub city: String,
    pub make: String,
    pub model: String,
    pub year: String,
    pub trim: String,
    pub price: String,
    pub stock: String,
    pub scraped_at: DateTime<Utc>,
    #[serde(rename = "SourceURL")]
    pub source_url: String,
}

/// What happened to one dealer during a crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DealerOutcome {
    Success {
        vehicles: Vec<VehicleRecord>,
        inventory_url: String,
    },
    NoWebsite,
    NoInventoryPage,
    Error {
        message: String,
    },
}

impl DealerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DealerOutcome::Success { .. })
    }

    /// Vehicles found for this dealer (empty unless `Success`)
    pub fn vehicles(&self) -> &[VehicleRecord] {
        match self {
            DealerOutcome::Success { vehicles, .. } => vehicles,
            _ => &[],
        }
    }
}

impl std::fmt::Display for DealerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DealerOutcome::Success { vehicles, .. } => {
                write!(f, "success ({} vehicles)", vehicles.len())
            }
            DealerOutcome::NoWebsite => write!(f, "no_website"),
            DealerOutcome::NoInventoryPage => write!(f, "no_inventory_page"),
            DealerOutcome::Error { message } => write!(f, "error: {}", message),
        }
    }
}

/// Outcome paired with the dealer it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerReport {
    pub dealer: String,
    #[serde(flatten)]
    pub outcome: DealerOutcome,
}

/// Totals for one finished crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub total_dealers: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub total_vehicles: usize,
    pub timestamp: DateTime<Utc>,
    /// In roster order
    pub outcomes: Vec<DealerReport>,
}

impl CrawlSummary {
    pub fn from_reports(outcomes: Vec<DealerReport>, timestamp: DateTime<Utc>) -> Self {
        let success_count = outcomes.iter().filter(|r| r.outcome.is_success()).count();
        let total_vehicles = outcomes.iter().map(|r| r.outcome.vehicles().len()).sum();
        Self {
            total_dealers: outcomes.len(),
            success_count,
            fail_count: outcomes.len() - success_count,
            total_vehicles,
            timestamp,
            outcomes,
        }
    }
}
