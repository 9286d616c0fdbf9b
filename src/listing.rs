//! Vehicle listing extraction from rendered inventory pages
//!
//! The page is rendered once, then the container cascade picks the listing
//! boundary and each field cascade picks a value inside every container.
//! Misses at any level are absent values, never errors.

use crate::browser::{ChromeRenderer, PageRenderer};
use crate::config::Settings;
use crate::patterns::{PatternTable, SelectorCascade, ValueSource, VehicleField};
use crate::schema::{DealerRecord, VehicleRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Args;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Args)]
pub struct ExtractArgs {
    /// Inventory page URL
    #[arg(value_name = "URL")]
    pub url: String,

    /// Dealer name to attach to each record
    #[arg(long, default_value = "")]
    pub dealer: String,

    /// Dealer brand, used when a listing has no make
    #[arg(long, default_value = "")]
    pub brand: String,

    /// Dealer city
    #[arg(long, default_value = "")]
    pub city: String,
}

const PLACEHOLDERS: &[&str] = &[
    "-", "--", "—", "n/a", "na", "null", "undefined", "none", "call", "tbd",
];

const NAME_MAX_CHARS: usize = 50;
const TEXT_MAX_CHARS: usize = 100;
const YEAR_FALLBACK_CHARS: usize = 10;

pub struct ListingExtractor {
    renderer: Arc<dyn PageRenderer>,
    patterns: PatternTable,
    max_containers: usize,
}

impl ListingExtractor {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            renderer,
            patterns: PatternTable::default(),
            max_containers: 20,
        }
    }

    pub fn with_patterns(mut self, patterns: PatternTable) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_max_containers(mut self, max_containers: usize) -> Self {
        self.max_containers = max_containers;
        self
    }

    /// Render `inventory_url` and extract its listings.
    ///
    /// A render failure is logged and yields no vehicles.
    pub async fn extract(&self, inventory_url: &str, dealer: &DealerRecord) -> Vec<VehicleRecord> {
        match self.renderer.render(inventory_url).await {
            Ok(html) => self.extract_from_html(&html, dealer, inventory_url, Utc::now()),
            Err(e) => {
                tracing::warn!("Render failed for {}: {}", dealer.name, e);
                Vec::new()
            }
        }
    }

    /// Extract listings from already rendered HTML
    pub fn extract_from_html(
        &self,
        html: &str,
        dealer: &DealerRecord,
        source_url: &str,
        scraped_at: DateTime<Utc>,
    ) -> Vec<VehicleRecord> {
        let doc = Html::parse_document(html);
        let fields: HashMap<_, _> = VehicleField::ALL
            .iter()
            .map(|f| (*f, CompiledCascade::new(self.patterns.fields.for_field(*f))))
            .collect();

        for (selector, css) in CompiledCascade::new(&self.patterns.fields.container).entries() {
            let containers: Vec<ElementRef> =
                doc.select(selector).take(self.max_containers).collect();
            if containers.is_empty() {
                continue;
            }

            let vehicles: Vec<VehicleRecord> = containers
                .into_iter()
                .filter_map(|container| {
                    let raw = RawListing::read(container, &fields);
                    raw.into_record(dealer, source_url, scraped_at)
                })
                .collect();

            tracing::debug!(
                "Container selector {} matched, {} vehicles",
                css,
                vehicles.len()
            );
            if !vehicles.is_empty() {
                return vehicles;
            }
        }

        Vec::new()
    }
}

#[async_trait]
impl crate::orchestrator::ListingSource for ListingExtractor {
    async fn listings(
        &self,
        inventory_url: &str,
        dealer: &DealerRecord,
    ) -> Result<Vec<VehicleRecord>> {
        Ok(self.extract(inventory_url, dealer).await)
    }
}

/// A cascade with its CSS parsed; unparsable selectors are dropped
struct CompiledCascade {
    entries: Vec<(Selector, ValueSource, &'static str)>,
}

impl CompiledCascade {
    fn new(cascade: &SelectorCascade) -> Self {
        let entries = cascade
            .selectors
            .iter()
            .filter_map(|fs| match Selector::parse(fs.css) {
                Ok(sel) => Some((sel, fs.source, fs.css)),
                Err(_) => {
                    tracing::debug!("Skipping invalid selector {}", fs.css);
                    None
                }
            })
            .collect();
        Self { entries }
    }

    fn entries(&self) -> impl Iterator<Item = (&Selector, &'static str)> {
        self.entries.iter().map(|(sel, _, css)| (sel, *css))
    }

    /// First non-placeholder value inside `scope`
    fn first_value(&self, scope: ElementRef) -> Option<String> {
        self.entries
            .iter()
            .find_map(|(sel, source, _)| lookup(scope, sel, *source))
    }
}

fn lookup(scope: ElementRef, selector: &Selector, source: ValueSource) -> Option<String> {
    let el = scope.select(selector).next()?;
    let raw = match source {
        ValueSource::Text => el.text().collect::<Vec<_>>().join(" "),
        ValueSource::Attr(name) => el.value().attr(name)?.to_string(),
    };
    let raw = raw.trim();
    if is_placeholder(raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

fn is_placeholder(value: &str) -> bool {
    value.is_empty() || PLACEHOLDERS.contains(&value.to_lowercase().as_str())
}

/// Field values as found in one container, before normalization
#[derive(Debug, Default)]
struct RawListing {
    make: Option<String>,
    model: Option<String>,
    year: Option<String>,
    trim: Option<String>,
    price: Option<String>,
    stock: Option<String>,
}

impl RawListing {
    fn read(container: ElementRef, fields: &HashMap<VehicleField, CompiledCascade>) -> Self {
        let value = |field: VehicleField| fields.get(&field).and_then(|c| c.first_value(container));
        Self {
            make: value(VehicleField::Make),
            model: value(VehicleField::Model),
            year: value(VehicleField::Year),
            trim: value(VehicleField::Trim),
            price: value(VehicleField::Price),
            stock: value(VehicleField::Stock),
        }
    }

    /// Normalize and attach dealer data; `None` when neither make nor model
    /// was found in the container.
    fn into_record(
        self,
        dealer: &DealerRecord,
        source_url: &str,
        scraped_at: DateTime<Utc>,
    ) -> Option<VehicleRecord> {
        let make = self.make.as_deref().map(normalize_name).unwrap_or_default();
        let model = self.model.as_deref().map(normalize_name).unwrap_or_default();
        if make.is_empty() && model.is_empty() {
            return None;
        }

        let make = if make.is_empty() {
            dealer.brand.clone()
        } else {
            make
        };

        Some(VehicleRecord {
            dealer: dealer.name.clone(),
            brand: dealer.brand.clone(),
            city: dealer.city.clone(),
            make,
            model,
            year: self.year.as_deref().map(normalize_year).unwrap_or_default(),
            trim: self.trim.as_deref().map(normalize_name).unwrap_or_default(),
            price: self.price.as_deref().map(normalize_price).unwrap_or_default(),
            stock: self.stock.as_deref().map(normalize_text).unwrap_or_default(),
            scraped_at,
            source_url: source_url.to_string(),
        })
    }
}

/// Digits, separators and the dollar sign only
pub fn normalize_price(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '$'))
        .collect()
}

/// First `20xx` token, else the raw text cut to 10 characters
pub fn normalize_year(raw: &str) -> String {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let re = YEAR.get_or_init(|| Regex::new(r"\b20\d{2}\b").expect("year pattern is valid"));

    match re.find(raw) {
        Some(m) => m.as_str().to_string(),
        None => truncate_chars(raw.trim(), YEAR_FALLBACK_CHARS),
    }
}

/// Make, model and trim: alphanumerics, spaces and hyphens, capped at 50
pub fn normalize_name(raw: &str) -> String {
    let kept: String = collapse_whitespace(raw)
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-'))
        .collect();
    truncate_chars(kept.trim(), NAME_MAX_CHARS)
}

/// Any other field: single-spaced, capped at 100
pub fn normalize_text(raw: &str) -> String {
    truncate_chars(&collapse_whitespace(raw), TEXT_MAX_CHARS)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Run the extract command
pub async fn run_extract(args: ExtractArgs, settings: &Settings) -> Result<()> {
    let renderer = Arc::new(ChromeRenderer::new(settings.render.clone()));
    let extractor = ListingExtractor::new(renderer).with_max_containers(settings.crawl.max_containers);

    let dealer = DealerRecord {
        brand: args.brand,
        name: args.dealer,
        city: args.city,
        website: args.url.clone(),
        ..Default::default()
    };

    tracing::info!("Extracting listings from {}", args.url);
    let vehicles = extractor.extract(&args.url, &dealer).await;
    tracing::info!("Found {} vehicles", vehicles.len());

    println!("{}", serde_json::to_string(&vehicles)?);
    Ok(())
}
