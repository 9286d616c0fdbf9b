//! Fleet crawl orchestration
//!
//! Dealers are processed one at a time in roster order: discovery, then
//! extraction, then a throttle pause. A dealer's failure becomes its outcome
//! and never stops the crawl. Only one crawl may run per [`CrawlState`].

use crate::catalog::{CatalogError, CatalogSink};
use crate::roster::{RosterError, RosterSource};
use crate::schema::{
    CrawlSummary, DealerOutcome, DealerRecord, DealerReport, InventoryCandidate, VehicleRecord,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

/// Finds a dealer's inventory page from its homepage
#[async_trait]
pub trait InventoryLocator: Send + Sync {
    async fn locate(&self, homepage: &str) -> Result<Option<InventoryCandidate>>;
}

/// Produces vehicle listings from an inventory page
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn listings(&self, inventory_url: &str, dealer: &DealerRecord)
        -> Result<Vec<VehicleRecord>>;
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("A crawl is already running")]
    AlreadyRunning,

    #[error("Failed to load dealer roster: {0}")]
    Roster(#[from] RosterError),

    #[error("Failed to persist vehicle catalog: {0}")]
    Persistence(#[from] CatalogError),

    #[error("Crawl worker stopped unexpectedly: {0}")]
    Worker(String),
}

/// Point-in-time view of a [`CrawlState`]
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStatus {
    pub in_progress: bool,
    pub last_summary: Option<CrawlSummary>,
    pub last_error: Option<String>,
}

/// Single-flight flag plus the result of the last crawl
#[derive(Debug, Default)]
pub struct CrawlState {
    in_progress: AtomicBool,
    last_summary: RwLock<Option<CrawlSummary>>,
    last_error: RwLock<Option<String>>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Claim the crawl slot; `None` if a crawl already holds it.
    pub fn try_begin(self: &Arc<Self>) -> Option<RunGuard> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(RunGuard {
            state: Arc::clone(self),
        })
    }

    pub fn status(&self) -> CrawlStatus {
        CrawlStatus {
            in_progress: self.is_in_progress(),
            last_summary: self
                .last_summary
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            last_error: self
                .last_error
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn clear(&self) {
        *self
            .last_summary
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn record(&self, result: &Result<CrawlSummary, CrawlError>) {
        match result {
            Ok(summary) => {
                *self
                    .last_summary
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
            }
            Err(e) => {
                *self
                    .last_error
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
            }
        }
    }
}

/// Holds the crawl slot; releases it when dropped
pub struct RunGuard {
    state: Arc<CrawlState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.in_progress.store(false, Ordering::Release);
    }
}

/// Collaborators for one orchestrator
pub struct CrawlPipeline {
    pub roster: Arc<dyn RosterSource>,
    pub locator: Arc<dyn InventoryLocator>,
    pub listings: Arc<dyn ListingSource>,
    pub catalog: Arc<dyn CatalogSink>,
    /// Pause after each dealer
    pub throttle: Duration,
}

pub struct CrawlOrchestrator {
    state: Arc<CrawlState>,
    pipeline: Arc<CrawlPipeline>,
}

impl CrawlOrchestrator {
    pub fn new(pipeline: CrawlPipeline) -> Self {
        Self {
            state: Arc::new(CrawlState::new()),
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn state(&self) -> Arc<CrawlState> {
        Arc::clone(&self.state)
    }

    pub fn status(&self) -> CrawlStatus {
        self.state.status()
    }

    /// Start a crawl in the background.
    ///
    /// Fails with [`CrawlError::AlreadyRunning`] while another crawl holds
    /// the slot. The returned handle resolves to the same result that is
    /// recorded in the state.
    pub fn start(
        &self,
        max_dealers: Option<usize>,
    ) -> Result<JoinHandle<Result<CrawlSummary, CrawlError>>, CrawlError> {
        let guard = self.state.try_begin().ok_or(CrawlError::AlreadyRunning)?;
        self.state.clear();

        let pipeline = Arc::clone(&self.pipeline);
        let state = Arc::clone(&self.state);
        Ok(tokio::spawn(async move {
            let _guard = guard;
            // inner task so a panic outside the per-dealer tasks is still recorded
            let result = match tokio::spawn(pipeline.crawl(max_dealers)).await {
                Ok(result) => result,
                Err(e) => Err(CrawlError::Worker(join_error_message(e))),
            };
            if let Err(e) = &result {
                tracing::error!("Crawl failed: {}", e);
            }
            state.record(&result);
            result
        }))
    }

    /// Start a crawl and wait for it to finish
    pub async fn run(&self, max_dealers: Option<usize>) -> Result<CrawlSummary, CrawlError> {
        let handle = self.start(max_dealers)?;
        handle
            .await
            .map_err(|e| CrawlError::Worker(join_error_message(e)))?
    }
}

impl CrawlPipeline {
    async fn crawl(self: Arc<Self>, max_dealers: Option<usize>) -> Result<CrawlSummary, CrawlError> {
        let mut dealers = self.roster.load().await?;
        if let Some(max) = max_dealers {
            dealers.truncate(max);
        }

        let total = dealers.len();
        tracing::info!("Crawling {} dealers", total);

        let mut reports = Vec::with_capacity(total);
        for (i, dealer) in dealers.into_iter().enumerate() {
            tracing::info!("[{}/{}] {}", i + 1, total, dealer.name);
            let name = dealer.name.clone();
            let outcome = self.process_isolated(dealer).await;
            tracing::info!("[{}/{}] {} -> {}", i + 1, total, name, outcome);

            reports.push(DealerReport {
                dealer: name,
                outcome,
            });

            tokio::time::sleep(self.throttle).await;
        }

        let vehicles: Vec<VehicleRecord> = reports
            .iter()
            .flat_map(|r| r.outcome.vehicles().iter().cloned())
            .collect();
        if !vehicles.is_empty() {
            self.catalog.replace_all(&vehicles).await?;
        }

        let summary = CrawlSummary::from_reports(reports, Utc::now());
        tracing::info!(
            "Crawl done: {}/{} dealers OK, {} vehicles",
            summary.success_count,
            summary.total_dealers,
            summary.total_vehicles
        );
        Ok(summary)
    }

    /// Run one dealer on its own task so an error or panic stays contained
    async fn process_isolated(self: &Arc<Self>, dealer: DealerRecord) -> DealerOutcome {
        let pipeline = Arc::clone(self);
        let task = tokio::spawn(async move { pipeline.process_dealer(&dealer).await });

        match task.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => DealerOutcome::Error {
                message: format!("{:#}", e),
            },
            Err(e) => DealerOutcome::Error {
                message: join_error_message(e),
            },
        }
    }

    async fn process_dealer(&self, dealer: &DealerRecord) -> Result<DealerOutcome> {
        let Some(homepage) = dealer.homepage() else {
            return Ok(DealerOutcome::NoWebsite);
        };

        let Some(candidate) = self.locator.locate(&homepage).await? else {
            return Ok(DealerOutcome::NoInventoryPage);
        };

        tracing::debug!(
            "{}: inventory page {} (score {})",
            dealer.name,
            candidate.url,
            candidate.confidence_score
        );
        let vehicles = self.listings.listings(&candidate.url, dealer).await?;

        Ok(DealerOutcome::Success {
            vehicles,
            inventory_url: candidate.url,
        })
    }
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let panic = e.into_panic();
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
