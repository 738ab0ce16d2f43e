//! Browser capability: the narrow contract the agent drives a live page through.
//!
//! One `BrowserSession` is opened per search run and driven strictly
//! sequentially. `webdriver` ships the W3C WebDriver implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod webdriver;

/// Opaque handle to an element in the live page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

#[derive(Debug, Error)]
pub enum BrowserError {
    /// Transport or session failure: the browser itself cannot be reached.
    #[error("browser unavailable: {0}")]
    Unavailable(String),

    #[error("browser operation timed out: {0}")]
    Timeout(String),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("browser command failed: {0}")]
    Command(String),
}

impl BrowserError {
    /// Element-level failures that only affect the element being touched.
    pub fn is_element_error(&self) -> bool {
        matches!(
            self,
            BrowserError::NoSuchElement(_)
                | BrowserError::StaleElement(_)
                | BrowserError::InvalidSelector(_)
        )
    }
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Serialized DOM of the current page.
    async fn page_source(&self) -> Result<String, BrowserError>;

    /// CSS query, page-wide or scoped to `within`. No match is `Ok(vec![])`.
    async fn query(
        &self,
        within: Option<&ElementRef>,
        selector: &str,
    ) -> Result<Vec<ElementRef>, BrowserError>;

    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError>;

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError>;

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    /// Lowercase tag name of the element.
    async fn tag_name(&self, element: &ElementRef) -> Result<String, BrowserError>;

    /// Resolves once `selector` matches at least one element.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Opens fresh sessions; one per run.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, BrowserError>;
}
