//! Inventory-page discovery
//!
//! Fetches a dealer homepage and scores every outbound link against the
//! inventory rules. The best-scoring link is the inventory candidate.

use crate::config::{DiscoverySettings, Settings};
use crate::patterns::{InventoryRule, INVENTORY_RULES};
use crate::schema::InventoryCandidate;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use reqwest::Client;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

#[derive(Args)]
pub struct DiscoverArgs {
    /// Dealer homepage URL
    #[arg(value_name = "URL")]
    pub url: String,

    /// Print every scored candidate instead of the best one
    #[arg(long)]
    pub all: bool,
}

/// Why a homepage could not be used for discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid homepage URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("Request failed for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Not an HTML page ({content_type}): {url}")]
    NotHtml { url: String, content_type: String },
}

/// Homepage fetcher plus inventory rules
pub struct PageDiscovery {
    client: Client,
    rules: Vec<InventoryRule>,
}

impl PageDiscovery {
    pub fn new(settings: &DiscoverySettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout())
            .build()?;

        Ok(Self {
            client,
            rules: INVENTORY_RULES.to_vec(),
        })
    }

    /// Replace the inventory rules
    pub fn with_rules(mut self, rules: Vec<InventoryRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Best inventory candidate for `homepage`, or `None` if the page could
    /// not be fetched or no link scored.
    pub async fn discover(&self, homepage: &str) -> Option<InventoryCandidate> {
        let (base, html) = match self.fetch_homepage(homepage).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!("Discovery fetch failed: {}", e);
                return None;
            }
        };

        let candidate = score_links(&html, &base, &self.rules).into_iter().next();
        match &candidate {
            Some(c) => tracing::debug!(
                "Inventory candidate for {}: {} (score {}, pattern {})",
                homepage,
                c.url,
                c.confidence_score,
                c.matched_pattern
            ),
            None => tracing::debug!("No inventory link on {}", homepage),
        }
        candidate
    }

    async fn fetch_homepage(&self, homepage: &str) -> Result<(Url, String), DiscoveryError> {
        let base = Url::parse(homepage).map_err(|source| DiscoveryError::InvalidUrl {
            url: homepage.to_string(),
            source,
        })?;

        let response = self
            .client
            .get(base.clone())
            .send()
            .await
            .map_err(|source| DiscoveryError::Http {
                url: homepage.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                url: homepage.to_string(),
                status: status.as_u16(),
            });
        }

        // A missing Content-Type is given the benefit of the doubt
        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.to_lowercase().contains("html") {
                return Err(DiscoveryError::NotHtml {
                    url: homepage.to_string(),
                    content_type: content_type.to_string(),
                });
            }
        }

        let body = response.text().await.map_err(|source| DiscoveryError::Http {
            url: homepage.to_string(),
            source,
        })?;

        Ok((base, body))
    }
}

#[async_trait]
impl crate::orchestrator::InventoryLocator for PageDiscovery {
    async fn locate(&self, homepage: &str) -> Result<Option<InventoryCandidate>> {
        Ok(self.discover(homepage).await)
    }
}

/// An outbound link resolved against the homepage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub url: Url,
    pub href: String,
    pub anchor_text: String,
}

/// All `<a href>` links on the page, resolved, in document order.
///
/// Empty targets, unresolvable targets and non-HTTP schemes are skipped.
pub fn extract_links(html: &str, base: &Url) -> Vec<PageLink> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    doc.select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            let url = base.join(href).ok()?;
            if !matches!(url.scheme(), "http" | "https") {
                return None;
            }
            let anchor_text = el.text().collect::<Vec<_>>().join(" ");
            Some(PageLink {
                url,
                href: href.to_string(),
                anchor_text: collapse_whitespace(&anchor_text),
            })
        })
        .collect()
}

/// Every (link, rule) match scoring above zero, best first.
///
/// The sort is stable, so equal scores keep link order, then rule order.
pub fn score_links(html: &str, base: &Url, rules: &[InventoryRule]) -> Vec<InventoryCandidate> {
    let mut candidates = Vec::new();

    for link in extract_links(html, base) {
        for rule in rules {
            let score = rule.score_link(link.url.path(), &link.anchor_text, &link.href);
            if score > 0 {
                candidates.push(InventoryCandidate {
                    url: link.url.to_string(),
                    confidence_score: score,
                    matched_pattern: rule.path.to_string(),
                    anchor_text: link.anchor_text.clone(),
                });
            }
        }
    }

    candidates.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));
    candidates
}

/// Best candidate using the stock rules. Pure: same input, same answer.
pub fn discover_in_html(html: &str, base: &Url) -> Option<InventoryCandidate> {
    score_links(html, base, INVENTORY_RULES).into_iter().next()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Run the discover command
pub async fn run_discover(args: DiscoverArgs, settings: &Settings) -> Result<()> {
    let discovery = PageDiscovery::new(&settings.discovery)?;

    if args.all {
        let (base, html) = discovery.fetch_homepage(&args.url).await?;
        let candidates = score_links(&html, &base, &discovery.rules);
        tracing::info!("{} candidates on {}", candidates.len(), args.url);
        println!("{}", serde_json::to_string(&candidates)?);
        return Ok(());
    }

    let candidate = discovery.discover(&args.url).await;
    println!("{}", serde_json::to_string(&candidate)?);
    Ok(())
}
