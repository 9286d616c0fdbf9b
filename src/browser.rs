//! Headless Chrome rendering via chromiumoxide
//!
//! Every render launches its own browser with a throwaway profile and tears
//! it down afterwards, so no state leaks between dealers.

use crate::config::RenderSettings;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Interval between network-activity polls
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Consecutive polls with no new resource requests before the page counts as idle
const IDLE_QUIET_POLLS: u32 = 2;

const ACTIVITY_SCRIPT: &str = r#"
    (function() {
        return {
            readyState: document.readyState,
            resources: performance.getEntriesByType('resource').length
        };
    })()
"#;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to launch Chrome: {0}. Is Chrome/Chromium installed?")]
    Launch(String),

    #[error("Failed to prepare a page for {url}: {message}")]
    Page { url: String, message: String },

    #[error("Navigation to {url} failed ({kind}): {message}")]
    Navigation {
        url: String,
        kind: &'static str,
        message: String,
    },

    #[error("Navigation to {url} timed out")]
    Timeout { url: String },

    #[error("Failed to read rendered content of {url}: {message}")]
    Content { url: String, message: String },
}

/// Turns a URL into the HTML of the fully rendered page
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Renders with a fresh headless Chrome per call
pub struct ChromeRenderer {
    settings: RenderSettings,
}

impl ChromeRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let session = RenderSession::launch(&self.settings).await?;
        let result = session.snapshot(url).await;
        session.close().await;
        result
    }
}

/// One browser process and its profile directory
pub struct RenderSession {
    browser: Browser,
    handler: JoinHandle<()>,
    settings: RenderSettings,
    _profile: TempDir,
}

impl RenderSession {
    pub async fn launch(settings: &RenderSettings) -> Result<Self, RenderError> {
        let profile = TempDir::new().map_err(|e| RenderError::Launch(e.to_string()))?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-setuid-sandbox")
            .arg("--no-first-run")
            .arg("--headless=new")
            .request_timeout(settings.timeout())
            .user_data_dir(profile.path());
        if let Some(chrome) = &settings.chrome_path {
            builder = builder.chrome_executable(chrome);
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            handler,
            settings: settings.clone(),
            _profile: profile,
        })
    }

    /// Navigate, wait for network activity to die down, let the page
    /// settle, and return the rendered HTML
    pub async fn snapshot(&self, url: &str) -> Result<String, RenderError> {
        let page_error = |e: CdpError| RenderError::Page {
            url: url.to_string(),
            message: e.to_string(),
        };

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(page_error)?;

        page.execute(SetUserAgentOverrideParams::new(
            self.settings.user_agent.as_str(),
        ))
        .await
        .map_err(page_error)?;

        let started = Instant::now();
        let nav_result = tokio::time::timeout(self.settings.timeout(), async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        })
        .await;

        match nav_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let message = e.to_string();
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    kind: classify_error(&message),
                    message,
                });
            }
            Err(_) => {
                return Err(RenderError::Timeout {
                    url: url.to_string(),
                })
            }
        }

        let idle_budget = self.settings.timeout().saturating_sub(started.elapsed());
        if !wait_for_network_idle(&page, idle_budget).await {
            tracing::debug!("{} still loading after {:?}, reading it anyway", url, idle_budget);
        }

        tokio::time::sleep(self.settings.settle()).await;

        let html = page.content().await.map_err(|e| RenderError::Content {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page for {}: {}", url, e);
        }

        Ok(html)
    }

    /// Shut the browser down and wait for the process to exit
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            tracing::warn!("Failed to wait for browser exit: {}", e);
        }
        self.handler.abort();
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// What the page reports about its own loading
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageActivity {
    ready_state: String,
    resources: u64,
}

/// Decides when a page has stopped fetching: document complete and the
/// resource count unchanged for [`IDLE_QUIET_POLLS`] polls in a row
#[derive(Debug, Default)]
struct IdleTracker {
    last_resources: Option<u64>,
    quiet_polls: u32,
}

impl IdleTracker {
    fn observe(&mut self, activity: &PageActivity) -> bool {
        if activity.ready_state != "complete" {
            self.last_resources = None;
            self.quiet_polls = 0;
            return false;
        }

        if self.last_resources == Some(activity.resources) {
            self.quiet_polls += 1;
        } else {
            self.last_resources = Some(activity.resources);
            self.quiet_polls = 0;
        }
        self.quiet_polls >= IDLE_QUIET_POLLS
    }
}

/// Poll the page until it goes idle or `budget` runs out.
///
/// Returns `false` on timeout; the caller reads the page regardless.
async fn wait_for_network_idle(page: &Page, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    let mut tracker = IdleTracker::default();

    while Instant::now() < deadline {
        match page.evaluate(ACTIVITY_SCRIPT).await {
            Ok(result) => match result.into_value::<PageActivity>() {
                Ok(activity) => {
                    if tracker.observe(&activity) {
                        return true;
                    }
                }
                Err(e) => tracing::debug!("Unreadable page activity: {}", e),
            },
            Err(e) => tracing::debug!("Failed to poll page activity: {}", e),
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
    false
}

fn classify_error(error: &str) -> &'static str {
    if error.contains("ERR_NAME_NOT_RESOLVED") {
        "DNS_FAILED"
    } else if error.contains("ERR_CONNECTION_REFUSED") {
        "CONNECTION_REFUSED"
    } else if error.contains("ERR_CONNECTION_TIMED_OUT") {
        "TIMEOUT"
    } else if error.contains("ERR_CERT") || error.contains("SSL") {
        "SSL_ERROR"
    } else {
        "NETWORK_ERROR"
    }
}
