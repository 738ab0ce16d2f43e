//! Extractor: walks the job cards of the current page with a validated
//! selector set and reads one candidate per card.
//!
//! A card that cannot be read is skipped with a reason and never aborts the
//! page. A timeout while locating the cards interrupts the pass, which the
//! quality gate treats as low yield. Only cancellation or a capability
//! outage aborts the run.

use std::time::Duration;

use reqwest::Url;
use tracing::{debug, warn};

use crate::agent::selectors::{Role, SelectorSet};
use crate::agent::{AgentError, CallGuard};
use crate::browser::{BrowserSession, ElementRef};

/// Raw fields read for one card, before the quality gate.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCandidate {
    /// Position of the card on the page.
    pub index: usize,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub compensation: Option<String>,
    pub posted_text: Option<String>,
    pub description: Option<String>,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Extracted(JobCandidate),
    Skipped { index: usize, reason: String },
}

/// Outcome of one extraction pass over a page.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    pub outcomes: Vec<ItemOutcome>,
    /// The card list could not be read in time.
    pub interrupted: bool,
}

impl ExtractionBatch {
    pub fn candidates(&self) -> impl Iterator<Item = &JobCandidate> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Extracted(c) => Some(c),
            ItemOutcome::Skipped { .. } => None,
        })
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Skipped { .. }))
            .count()
    }

    /// Skipped plus `rejected` cards above `threshold` of those attempted.
    /// An interrupted pass is always low yield; an empty one never is.
    pub fn is_low_yield(&self, rejected: usize, threshold: f32) -> bool {
        if self.interrupted {
            return true;
        }
        let attempted = self.attempted();
        attempted > 0 && (self.skipped() + rejected) as f32 / attempted as f32 > threshold
    }

    fn interrupted_by(error: AgentError) -> Self {
        warn!("extraction pass interrupted: {error}");
        Self {
            outcomes: Vec::new(),
            interrupted: true,
        }
    }
}

pub struct Extractor {
    settle_delay: Duration,
}

impl Extractor {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Reads up to `capacity` cards from the current page.
    pub async fn extract(
        &self,
        browser: &dyn BrowserSession,
        set: &SelectorSet,
        capacity: usize,
        guard: &CallGuard,
    ) -> Result<ExtractionBatch, AgentError> {
        let mut batch = ExtractionBatch::default();
        if capacity == 0 {
            return Ok(batch);
        }
        let (Some(container_rule), Some(item_rule)) =
            (set.get(Role::ListContainer), set.get(Role::JobItem))
        else {
            return Err(AgentError::Schema("selector set lacks list roles".to_string()));
        };

        let containers = match guard
            .browser("find list", browser.query(None, &container_rule.css))
            .await
        {
            Ok(containers) => containers,
            Err(e @ AgentError::Timeout { .. }) => return Ok(ExtractionBatch::interrupted_by(e)),
            Err(e) => return Err(e),
        };
        let Some(container) = containers.into_iter().next() else {
            warn!("list container disappeared before extraction");
            return Ok(batch);
        };
        let items = match guard
            .browser("find items", browser.query(Some(&container), &item_rule.css))
            .await
        {
            Ok(items) => items,
            Err(e @ AgentError::Timeout { .. }) => return Ok(ExtractionBatch::interrupted_by(e)),
            Err(e) => return Err(e),
        };
        let page_url = match guard.browser("read url", browser.current_url()).await {
            Ok(url) => url,
            Err(e @ AgentError::Timeout { .. }) => return Ok(ExtractionBatch::interrupted_by(e)),
            Err(e) => return Err(e),
        };
        debug!("extracting {} of {} cards", items.len().min(capacity), items.len());

        for (index, item) in items.iter().take(capacity).enumerate() {
            guard.check()?;
            let outcome = match self.read_item(browser, set, item, index, &page_url, guard).await {
                Ok(candidate) => ItemOutcome::Extracted(candidate),
                Err(e @ (AgentError::Timeout { .. } | AgentError::Element(_))) => {
                    ItemOutcome::Skipped {
                        index,
                        reason: e.to_string(),
                    }
                }
                Err(AgentError::Schema(reason)) => ItemOutcome::Skipped { index, reason },
                Err(e) => return Err(e),
            };
            if let ItemOutcome::Skipped { reason, .. } = &outcome {
                debug!("skipped card {index}: {reason}");
            }
            batch.outcomes.push(outcome);
        }
        Ok(batch)
    }

    async fn read_item(
        &self,
        browser: &dyn BrowserSession,
        set: &SelectorSet,
        item: &ElementRef,
        index: usize,
        page_url: &str,
        guard: &CallGuard,
    ) -> Result<JobCandidate, AgentError> {
        // The link lives on the card and is read before the detail view opens.
        let source_url = self
            .read_link(browser, set, item, page_url, guard)
            .await?
            .unwrap_or_else(|| page_url.to_string());

        guard.browser("open item", browser.click(item)).await?;
        guard.pause(self.settle_delay).await?;
        if let Some(title) = set.get(Role::Title) {
            guard
                .browser(
                    "wait for detail view",
                    browser.wait_for(&title.css, guard.timeout()),
                )
                .await?;
        }

        let title = read_required(browser, set, Role::Title, guard).await?;
        let company = read_required(browser, set, Role::Company, guard).await?;

        Ok(JobCandidate {
            index,
            title,
            company,
            location: read_optional(browser, set, Role::Location, guard).await?,
            compensation: read_optional(browser, set, Role::Compensation, guard).await?,
            posted_text: read_optional(browser, set, Role::PostedAt, guard).await?,
            description: read_optional(browser, set, Role::Description, guard).await?,
            source_url,
        })
    }

    async fn read_link(
        &self,
        browser: &dyn BrowserSession,
        set: &SelectorSet,
        item: &ElementRef,
        page_url: &str,
        guard: &CallGuard,
    ) -> Result<Option<String>, AgentError> {
        let Some(rule) = set.get(Role::ItemLink) else {
            return Ok(None);
        };
        let links = match guard
            .browser("find item link", browser.query(Some(item), &rule.css))
            .await
        {
            Ok(links) => links,
            Err(AgentError::Element(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(link) = links.first() else {
            return Ok(None);
        };
        let attribute = rule.attribute.as_deref().unwrap_or("href");
        let href = match guard
            .browser("read item link", browser.attribute(link, attribute))
            .await
        {
            Ok(href) => href,
            Err(AgentError::Element(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(href.and_then(|href| resolve_url(page_url, &href)))
    }
}

/// Resolves a possibly relative link against the page it was found on.
pub fn resolve_url(page_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }
    let resolved = match Url::parse(page_url) {
        Ok(base) => base.join(href).ok()?,
        Err(_) => Url::parse(href).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

async fn read_field(
    browser: &dyn BrowserSession,
    set: &SelectorSet,
    role: Role,
    guard: &CallGuard,
) -> Result<Option<String>, AgentError> {
    let Some(rule) = set.get(role) else {
        return Ok(None);
    };
    let found = guard
        .browser("read field", browser.query(None, &rule.css))
        .await?;
    let Some(element) = found.first() else {
        return Ok(None);
    };
    let value = match &rule.attribute {
        Some(name) => guard
            .browser("read field attribute", browser.attribute(element, name))
            .await?,
        None => Some(guard.browser("read field text", browser.text(element)).await?),
    };
    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

async fn read_required(
    browser: &dyn BrowserSession,
    set: &SelectorSet,
    role: Role,
    guard: &CallGuard,
) -> Result<String, AgentError> {
    read_field(browser, set, role, guard)
        .await?
        .ok_or_else(|| AgentError::Schema(format!("required field {role} is empty")))
}

/// Optional fields never fail the card.
async fn read_optional(
    browser: &dyn BrowserSession,
    set: &SelectorSet,
    role: Role,
    guard: &CallGuard,
) -> Result<Option<String>, AgentError> {
    match read_field(browser, set, role, guard).await {
        Ok(value) => Ok(value),
        Err(AgentError::Element(_) | AgentError::Timeout { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::analyzer::parse_selector_set;
    use crate::testing::{good_selectors, FakeBrowser, CONTAINER};
    use tokio_util::sync::CancellationToken;

    fn guard() -> CallGuard {
        CallGuard::new(CancellationToken::new(), Duration::from_secs(5))
    }

    fn selectors() -> SelectorSet {
        parse_selector_set(good_selectors()).unwrap()
    }

    #[test]
    fn test_resolve_relative_url() {
        assert_eq!(
            resolve_url("https://jobs.example.com/search?page=1", "/jobs/view/42").as_deref(),
            Some("https://jobs.example.com/jobs/view/42")
        );
        assert_eq!(resolve_url("https://jobs.example.com/", "javascript:void(0)"), None);
        assert_eq!(resolve_url("https://jobs.example.com/", "mailto:a@b.c"), None);
    }

    #[test]
    fn test_low_yield_threshold() {
        let mut batch = ExtractionBatch::default();
        assert!(!batch.is_low_yield(0, 0.5));
        for index in 0..2 {
            batch.outcomes.push(ItemOutcome::Skipped {
                index,
                reason: "gone".to_string(),
            });
        }
        for index in 2..4 {
            batch.outcomes.push(ItemOutcome::Extracted(JobCandidate {
                index,
                title: "Rust Engineer".to_string(),
                company: "Acme".to_string(),
                location: None,
                compensation: None,
                posted_text: None,
                description: None,
                source_url: format!("https://jobs.example.com/{index}"),
            }));
        }
        assert!(!batch.is_low_yield(0, 0.5));
        assert!(batch.is_low_yield(1, 0.5));
        assert!(!batch.is_low_yield(2, 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_finding_cards_interrupts_the_pass() {
        let browser = FakeBrowser::paged(1, 5, 0);
        browser.hang_query(CONTAINER, 0);
        let guard = CallGuard::new(CancellationToken::new(), Duration::from_millis(100));
        let batch = Extractor::new(Duration::ZERO)
            .extract(&browser, &selectors(), 25, &guard)
            .await
            .unwrap();
        assert!(batch.interrupted);
        assert_eq!(batch.attempted(), 0);
        assert!(batch.is_low_yield(0, 1.0));
    }

    #[tokio::test]
    async fn test_extracts_cards_and_skips_broken_ones() {
        let browser = FakeBrowser::paged(1, 5, 2);
        let batch = Extractor::new(Duration::ZERO)
            .extract(&browser, &selectors(), 25, &guard())
            .await
            .unwrap();

        assert_eq!(batch.attempted(), 5);
        assert_eq!(batch.skipped(), 2);
        let first = batch.candidates().next().unwrap();
        assert_eq!(first.title, "Rust Engineer 0-0");
        assert_eq!(first.company, "Company 0");
        assert_eq!(first.location.as_deref(), Some("Remote"));
        assert_eq!(first.compensation, None);
        assert_eq!(
            first.source_url,
            "https://jobs.example.com/jobs/view/0-0?trk=list"
        );
    }

    #[tokio::test]
    async fn test_capacity_bounds_cards_read() {
        let browser = FakeBrowser::paged(1, 5, 0);
        let batch = Extractor::new(Duration::ZERO)
            .extract(&browser, &selectors(), 2, &guard())
            .await
            .unwrap();
        assert_eq!(batch.attempted(), 2);
        assert_eq!(browser.click_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_extraction() {
        let browser = FakeBrowser::paged(1, 5, 0);
        let token = CancellationToken::new();
        browser.cancel_on_click(2, token.clone());
        let guard = CallGuard::new(token, Duration::from_secs(5));
        let result = Extractor::new(Duration::ZERO)
            .extract(&browser, &selectors(), 25, &guard)
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
