//! Orchestrator behavior with in-memory collaborators

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use dealer_scout::catalog::{CatalogError, CatalogSink};
use dealer_scout::discovery::discover_in_html;
use dealer_scout::orchestrator::{
    CrawlError, CrawlOrchestrator, CrawlPipeline, InventoryLocator, ListingSource,
};
use dealer_scout::schema::{
    DealerOutcome, DealerRecord, InventoryCandidate, VehicleRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use url::Url;

/// Discovery over canned homepage HTML, keyed by homepage URL
#[derive(Default)]
struct CannedLocator {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl CannedLocator {
    fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InventoryLocator for CannedLocator {
    async fn locate(&self, homepage: &str) -> Result<Option<InventoryCandidate>> {
        self.calls.lock().unwrap().push(homepage.to_string());
        if homepage.contains("explode") {
            return Err(anyhow!("connection reset"));
        }
        if homepage.contains("panic") {
            panic!("locator bug");
        }
        let html = self.pages.get(homepage).cloned().unwrap_or_default();
        let base = Url::parse(homepage)?;
        Ok(discover_in_html(&html, &base))
    }
}

/// Returns one vehicle per call, optionally waiting for a release signal
#[derive(Default)]
struct FakeListings {
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ListingSource for FakeListings {
    async fn listings(
        &self,
        inventory_url: &str,
        dealer: &DealerRecord,
    ) -> Result<Vec<VehicleRecord>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(vec![VehicleRecord {
            dealer: dealer.name.clone(),
            brand: dealer.brand.clone(),
            city: dealer.city.clone(),
            make: dealer.brand.clone(),
            model: "Camry, SE".to_string(),
            year: "2024".to_string(),
            trim: String::new(),
            price: "$30,000".to_string(),
            stock: String::new(),
            scraped_at: Utc::now(),
            source_url: inventory_url.to_string(),
        }])
    }
}

/// Slow discovery that records whether two dealers ever overlap
#[derive(Default)]
struct PacedLocator {
    active: AtomicUsize,
    max_active: AtomicUsize,
    started_at: Mutex<Vec<Instant>>,
}

#[async_trait]
impl InventoryLocator for PacedLocator {
    async fn locate(&self, homepage: &str) -> Result<Option<InventoryCandidate>> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.started_at.lock().unwrap().push(Instant::now());

        tokio::time::sleep(Duration::from_millis(100)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if homepage.contains("explode") {
            return Err(anyhow!("connection reset"));
        }
        Ok(discover_in_html(
            r#"<a href="/new-vehicles">New Vehicles</a>"#,
            &Url::parse(homepage)?,
        ))
    }
}

#[derive(Default)]
struct MemoryCatalog {
    panic: bool,
    fail: bool,
    writes: Mutex<Vec<Vec<VehicleRecord>>>,
}

#[async_trait]
impl CatalogSink for MemoryCatalog {
    async fn replace_all(&self, vehicles: &[VehicleRecord]) -> Result<(), CatalogError> {
        if self.panic {
            panic!("disk driver bug");
        }
        if self.fail {
            return Err(CatalogError::Io {
                path: "vehicles.csv".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.writes.lock().unwrap().push(vehicles.to_vec());
        Ok(())
    }
}

fn dealer(name: &str, website: &str) -> DealerRecord {
    DealerRecord {
        brand: "Toyota".to_string(),
        name: name.to_string(),
        city: "Austin".to_string(),
        website: website.to_string(),
        ..Default::default()
    }
}

fn orchestrator(
    roster: Vec<DealerRecord>,
    locator: Arc<CannedLocator>,
    listings: FakeListings,
    catalog: Arc<MemoryCatalog>,
) -> CrawlOrchestrator {
    CrawlOrchestrator::new(CrawlPipeline {
        roster: Arc::new(roster),
        locator,
        listings: Arc::new(listings),
        catalog,
        throttle: Duration::ZERO,
    })
}

fn scenario_locator() -> CannedLocator {
    CannedLocator::default()
        .with_page(
            "https://x.test",
            r#"<a href="/about">About Us</a><a href="/contact">Contact</a>"#,
        )
        .with_page(
            "https://y.test",
            r#"<a href="/service">Service</a><a href="/new-vehicles">New Vehicles</a>"#,
        )
}

#[tokio::test]
async fn test_three_dealer_scenario() {
    let locator = Arc::new(scenario_locator());
    let catalog = Arc::new(MemoryCatalog::default());
    let orch = orchestrator(
        vec![
            dealer("No Site", ""),
            dealer("X Motors", "https://x.test"),
            dealer("Y Motors", "https://y.test"),
        ],
        Arc::clone(&locator),
        FakeListings::default(),
        Arc::clone(&catalog),
    );

    let summary = orch.run(None).await.unwrap();

    assert_eq!(summary.total_dealers, 3);
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.fail_count, 2);
    assert_eq!(summary.total_vehicles, 1);

    let dealers: Vec<&str> = summary.outcomes.iter().map(|r| r.dealer.as_str()).collect();
    assert_eq!(dealers, vec!["No Site", "X Motors", "Y Motors"]);
    assert_eq!(summary.outcomes[0].outcome, DealerOutcome::NoWebsite);
    assert_eq!(summary.outcomes[1].outcome, DealerOutcome::NoInventoryPage);
    match &summary.outcomes[2].outcome {
        DealerOutcome::Success {
            vehicles,
            inventory_url,
        } => {
            assert_eq!(inventory_url, "https://y.test/new-vehicles");
            assert_eq!(vehicles.len(), 1);
        }
        other => panic!("expected success, got {:?}", other),
    }

    // discovery never saw the dealer without a website
    assert_eq!(locator.calls(), vec!["https://x.test", "https://y.test"]);

    let candidate = discover_in_html(
        r#"<a href="/new-vehicles">New Vehicles</a>"#,
        &Url::parse("https://y.test").unwrap(),
    )
    .unwrap();
    assert_eq!(candidate.confidence_score, 10);

    let writes = catalog.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0][0].dealer, "Y Motors");

    let status = orch.status();
    assert!(!status.in_progress);
    assert_eq!(status.last_summary.unwrap().total_dealers, 3);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_max_dealers_truncates_roster() {
    let locator = Arc::new(scenario_locator());
    let orch = orchestrator(
        vec![
            dealer("A", ""),
            dealer("B", ""),
            dealer("C", "https://y.test"),
        ],
        Arc::clone(&locator),
        FakeListings::default(),
        Arc::new(MemoryCatalog::default()),
    );

    let summary = orch.run(Some(2)).await.unwrap();
    assert_eq!(summary.total_dealers, 2);
    assert!(locator.calls().is_empty());
}

#[tokio::test]
async fn test_dealer_failures_are_isolated() {
    let locator = Arc::new(scenario_locator());
    let catalog = Arc::new(MemoryCatalog::default());
    let orch = orchestrator(
        vec![
            dealer("Broken", "https://explode.test"),
            dealer("Buggy", "https://panic.test"),
            dealer("Y Motors", "https://y.test"),
        ],
        locator,
        FakeListings::default(),
        Arc::clone(&catalog),
    );

    let summary = orch.run(None).await.unwrap();

    match &summary.outcomes[0].outcome {
        DealerOutcome::Error { message } => assert!(message.contains("connection reset")),
        other => panic!("expected error, got {:?}", other),
    }
    match &summary.outcomes[1].outcome {
        DealerOutcome::Error { message } => assert!(message.contains("locator bug")),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(summary.outcomes[2].outcome.is_success());
    assert_eq!(summary.success_count, 1);
    assert_eq!(catalog.writes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_vehicles_skips_persistence() {
    let catalog = Arc::new(MemoryCatalog {
        fail: true,
        ..Default::default()
    });
    let orch = orchestrator(
        vec![dealer("X Motors", "https://x.test")],
        Arc::new(scenario_locator()),
        FakeListings::default(),
        catalog,
    );

    // the failing catalog is never touched
    let summary = orch.run(None).await.unwrap();
    assert_eq!(summary.total_vehicles, 0);
}

#[tokio::test]
async fn test_persistence_failure_fails_crawl_and_releases_slot() {
    let catalog = Arc::new(MemoryCatalog {
        fail: true,
        ..Default::default()
    });
    let orch = orchestrator(
        vec![dealer("Y Motors", "https://y.test")],
        Arc::new(scenario_locator()),
        FakeListings::default(),
        catalog,
    );

    let err = orch.run(None).await.unwrap_err();
    assert!(matches!(err, CrawlError::Persistence(_)));

    let status = orch.status();
    assert!(!status.in_progress);
    assert!(status.last_summary.is_none());
    assert!(status
        .last_error
        .unwrap()
        .contains("Failed to persist vehicle catalog"));

    // a later crawl is accepted
    assert!(matches!(
        orch.run(None).await,
        Err(CrawlError::Persistence(_))
    ));
}

#[tokio::test]
async fn test_second_start_rejected_while_running() {
    let gate = Arc::new(Notify::new());
    let catalog = Arc::new(MemoryCatalog::default());
    let orch = orchestrator(
        vec![dealer("Y Motors", "https://y.test")],
        Arc::new(scenario_locator()),
        FakeListings {
            gate: Some(Arc::clone(&gate)),
        },
        Arc::clone(&catalog),
    );

    let first = orch.start(None).unwrap();
    assert!(orch.status().in_progress);
    assert!(matches!(orch.start(None), Err(CrawlError::AlreadyRunning)));
    assert!(matches!(orch.run(None).await, Err(CrawlError::AlreadyRunning)));

    gate.notify_one();
    let summary = first.await.unwrap().unwrap();
    assert_eq!(summary.success_count, 1);
    assert!(!orch.status().in_progress);

    // accepted again once the first crawl is done
    let second = orch.start(None).unwrap();
    gate.notify_one();
    assert!(second.await.unwrap().is_ok());
    assert_eq!(catalog.writes.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_clears_previous_result() {
    let gate = Arc::new(Notify::new());
    let orch = orchestrator(
        vec![dealer("Y Motors", "https://y.test")],
        Arc::new(scenario_locator()),
        FakeListings {
            gate: Some(Arc::clone(&gate)),
        },
        Arc::new(MemoryCatalog::default()),
    );

    gate.notify_one();
    orch.run(None).await.unwrap();
    assert!(orch.status().last_summary.is_some());

    let handle = orch.start(None).unwrap();
    assert!(orch.status().last_summary.is_none());
    gate.notify_one();
    handle.await.unwrap().unwrap();
    assert!(orch.status().last_summary.is_some());
}

#[tokio::test]
async fn test_roster_error_is_crawl_failure() {
    let orch = CrawlOrchestrator::new(CrawlPipeline {
        roster: Arc::new(dealer_scout::roster::CsvRoster::new("/nonexistent/dealers.csv")),
        locator: Arc::new(CannedLocator::default()),
        listings: Arc::new(FakeListings::default()),
        catalog: Arc::new(MemoryCatalog::default()),
        throttle: Duration::ZERO,
    });

    assert!(matches!(orch.run(None).await, Err(CrawlError::Roster(_))));
    assert!(!orch.status().in_progress);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_after_every_dealer_without_overlap() {
    let throttle = Duration::from_secs(2);
    let locator = Arc::new(PacedLocator::default());
    let orch = CrawlOrchestrator::new(CrawlPipeline {
        roster: Arc::new(vec![
            dealer("No Site", ""),
            dealer("Broken", "https://explode.test"),
            dealer("Y Motors", "https://y.test"),
        ]),
        locator: Arc::clone(&locator) as Arc<dyn InventoryLocator>,
        listings: Arc::new(FakeListings::default()),
        catalog: Arc::new(MemoryCatalog::default()),
        throttle,
    });

    let started = Instant::now();
    let summary = orch.run(None).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.outcomes[0].outcome, DealerOutcome::NoWebsite);
    assert!(matches!(
        summary.outcomes[1].outcome,
        DealerOutcome::Error { .. }
    ));
    assert!(summary.outcomes[2].outcome.is_success());

    // one pause per dealer, the website-less and failed ones included
    assert!(elapsed >= throttle * 3, "elapsed {:?}", elapsed);
    assert_eq!(locator.max_active.load(Ordering::SeqCst), 1);

    // dealer 2 waited out dealer 1's pause, dealer 3 waited out dealer 2's
    let starts = locator.started_at.lock().unwrap();
    assert_eq!(starts.len(), 2);
    assert!(starts[0] - started >= throttle);
    assert!(starts[1] - starts[0] >= throttle);
}

#[tokio::test]
async fn test_panic_outside_dealer_is_recorded() {
    let catalog = Arc::new(MemoryCatalog {
        panic: true,
        ..Default::default()
    });
    let orch = orchestrator(
        vec![dealer("Y Motors", "https://y.test")],
        Arc::new(scenario_locator()),
        FakeListings::default(),
        catalog,
    );

    let err = orch.run(None).await.unwrap_err();
    assert!(matches!(err, CrawlError::Worker(_)));

    let status = orch.status();
    assert!(!status.in_progress);
    assert!(status.last_summary.is_none());
    assert!(status.last_error.unwrap().contains("disk driver bug"));

    // slot released
    assert!(orch.start(None).is_ok());
}
