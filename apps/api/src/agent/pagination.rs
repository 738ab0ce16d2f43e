//! Pagination: decides whether to continue and moves to the next page.

use reqwest::Url;
use tracing::{debug, info};

use crate::agent::context::{RunContext, StopReason};
use crate::agent::selectors::{Role, SelectorSet};
use crate::agent::{AgentError, AgentLimits, CallGuard};
use crate::browser::BrowserSession;

/// Empty pages in a row after which browsing stops.
const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    /// Landed on the next page. `reuse_selectors` is true when the page
    /// structure is expected to be unchanged.
    Continue { reuse_selectors: bool },
    Stop(StopReason),
}

pub struct Paginator {
    limits: AgentLimits,
}

impl Paginator {
    pub fn new(limits: AgentLimits) -> Self {
        Self { limits }
    }

    pub fn should_stop(&self, ctx: &RunContext) -> Option<StopReason> {
        if ctx.records.len() >= self.limits.max_jobs {
            Some(StopReason::JobLimit)
        } else if ctx.page_number >= self.limits.max_pages {
            Some(StopReason::PageLimit)
        } else if ctx.consecutive_empty_pages >= MAX_CONSECUTIVE_EMPTY_PAGES {
            Some(StopReason::EmptyPages)
        } else {
            None
        }
    }

    pub async fn advance(
        &self,
        browser: &dyn BrowserSession,
        set: Option<&SelectorSet>,
        guard: &CallGuard,
    ) -> Result<PageTurn, AgentError> {
        let Some(rule) = set.and_then(|s| s.get(Role::NextPage)) else {
            return Ok(PageTurn::Stop(StopReason::NoNextControl));
        };

        let controls = match guard
            .browser("find next control", browser.query(None, &rule.css))
            .await
        {
            Ok(controls) => controls,
            Err(AgentError::Element(_)) => return Ok(PageTurn::Stop(StopReason::NoNextControl)),
            Err(AgentError::Timeout { .. }) => {
                return Ok(PageTurn::Stop(StopReason::NavigationTimeout))
            }
            Err(e) => return Err(e),
        };
        let Some(next) = controls.first() else {
            return Ok(PageTurn::Stop(StopReason::NoNextControl));
        };

        let before = match guard.browser("read url", browser.current_url()).await {
            Ok(url) => url,
            Err(AgentError::Timeout { .. }) => {
                return Ok(PageTurn::Stop(StopReason::NavigationTimeout))
            }
            Err(e) => return Err(e),
        };
        match guard.browser("click next", browser.click(next)).await {
            Ok(()) => {}
            Err(AgentError::Timeout { .. }) => {
                return Ok(PageTurn::Stop(StopReason::NavigationTimeout))
            }
            Err(AgentError::Element(message)) => {
                debug!("next control not clickable: {message}");
                return Ok(PageTurn::Stop(StopReason::NoNextControl));
            }
            Err(e) => return Err(e),
        }
        guard.pause(self.limits.settle_delay).await?;

        let after = match guard.browser("read url", browser.current_url()).await {
            Ok(url) => url,
            Err(AgentError::Timeout { .. }) => {
                return Ok(PageTurn::Stop(StopReason::NavigationTimeout))
            }
            Err(e) => return Err(e),
        };
        let same_template = url_template(&before) == url_template(&after);
        info!("moved to next page: {after}");

        Ok(PageTurn::Continue {
            reuse_selectors: self.limits.reuse_selectors_across_pages && same_template,
        })
    }
}

/// Scheme, host and path; query strings carry the page number.
fn url_template(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    Some(format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.path()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::analyzer::parse_selector_set;
    use crate::testing::{good_selectors, FakeBrowser, NEXT};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn guard() -> CallGuard {
        CallGuard::new(CancellationToken::new(), Duration::from_secs(5))
    }

    fn limits(reuse: bool) -> AgentLimits {
        AgentLimits {
            settle_delay: Duration::ZERO,
            reuse_selectors_across_pages: reuse,
            ..AgentLimits::default()
        }
    }

    #[test]
    fn test_should_stop_conditions() {
        let paginator = Paginator::new(AgentLimits {
            max_pages: 3,
            ..AgentLimits::default()
        });
        let mut ctx = RunContext::new();
        assert_eq!(paginator.should_stop(&ctx), None);
        ctx.consecutive_empty_pages = 2;
        assert_eq!(paginator.should_stop(&ctx), Some(StopReason::EmptyPages));
        ctx.consecutive_empty_pages = 0;
        ctx.page_number = 3;
        assert_eq!(paginator.should_stop(&ctx), Some(StopReason::PageLimit));
    }

    #[test]
    fn test_url_template_ignores_query() {
        assert_eq!(
            url_template("https://a.io/jobs?page=1"),
            url_template("https://a.io/jobs?page=2&x=y")
        );
        assert_ne!(url_template("https://a.io/jobs"), url_template("https://a.io/careers"));
    }

    #[tokio::test]
    async fn test_advance_clicks_next() {
        let browser = FakeBrowser::paged(2, 3, 0);
        let set = parse_selector_set(good_selectors()).unwrap();
        let turn = Paginator::new(limits(true))
            .advance(&browser, Some(&set), &guard())
            .await
            .unwrap();
        assert_eq!(turn, PageTurn::Continue { reuse_selectors: true });
        assert_eq!(browser.current_page(), 1);
    }

    #[tokio::test]
    async fn test_reuse_disabled_by_default() {
        let browser = FakeBrowser::paged(2, 3, 0);
        let set = parse_selector_set(good_selectors()).unwrap();
        let turn = Paginator::new(limits(false))
            .advance(&browser, Some(&set), &guard())
            .await
            .unwrap();
        assert_eq!(turn, PageTurn::Continue { reuse_selectors: false });
    }

    #[tokio::test]
    async fn test_last_page_stops() {
        let browser = FakeBrowser::paged(1, 3, 0);
        let set = parse_selector_set(good_selectors()).unwrap();
        let turn = Paginator::new(limits(false))
            .advance(&browser, Some(&set), &guard())
            .await
            .unwrap();
        assert_eq!(turn, PageTurn::Stop(StopReason::NoNextControl));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_next_control_ends_pagination() {
        let browser = FakeBrowser::paged(2, 3, 0);
        browser.hang_query(NEXT, 0);
        let set = parse_selector_set(good_selectors()).unwrap();
        let guard = CallGuard::new(CancellationToken::new(), Duration::from_millis(100));
        let turn = Paginator::new(limits(false))
            .advance(&browser, Some(&set), &guard)
            .await
            .unwrap();
        assert_eq!(turn, PageTurn::Stop(StopReason::NavigationTimeout));
        assert_eq!(browser.current_page(), 0);
    }
}
