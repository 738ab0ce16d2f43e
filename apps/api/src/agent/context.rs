use std::collections::HashSet;

use crate::agent::extractor::ExtractionBatch;
use crate::agent::selectors::SelectorSet;
use crate::models::job::JobRecord;

/// Why browsing ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PageLimit,
    JobLimit,
    EmptyPages,
    NoNextControl,
    NavigationTimeout,
    LowYield,
}

impl StopReason {
    pub fn describe(self) -> &'static str {
        match self {
            StopReason::PageLimit => "page limit reached",
            StopReason::JobLimit => "job limit reached",
            StopReason::EmptyPages => "consecutive pages produced no new jobs",
            StopReason::NoNextControl => "no next-page control",
            StopReason::NavigationTimeout => "next page did not load in time",
            StopReason::LowYield => "extraction stayed low-yield after retries",
        }
    }
}

/// What the analyzer is told about the previous failed attempt.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFeedback {
    pub previous: Option<SelectorSet>,
    pub failures: Vec<String>,
}

/// Mutable state of one browsing run. Owned by the orchestrator; components
/// receive what they need and hand results back.
#[derive(Debug, Default)]
pub struct RunContext {
    /// 1-based number of the page being processed.
    pub page_number: u32,
    pub selectors: Option<SelectorSet>,
    pub reanalysis_count: u32,
    pub extraction_retries: u32,
    pub consecutive_empty_pages: u32,
    pub accepted_on_page: usize,
    pub feedback: Option<AnalysisFeedback>,
    pub pending_batch: Option<ExtractionBatch>,
    pub records: Vec<JobRecord>,
    /// Normalized source URLs of every accepted record.
    pub seen_urls: HashSet<String>,
    pub stop_reason: Option<StopReason>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            page_number: 1,
            ..Self::default()
        }
    }

    /// Resets per-page counters after moving to a new page.
    pub fn begin_page(&mut self, keep_selectors: bool) {
        self.page_number += 1;
        self.reanalysis_count = 0;
        self.extraction_retries = 0;
        self.accepted_on_page = 0;
        self.feedback = None;
        self.pending_batch = None;
        // Only the last page's low yield is reported.
        self.stop_reason = None;
        if !keep_selectors {
            self.selectors = None;
        }
    }

    /// Records the outcome of a finished page for the empty-page streak.
    pub fn close_page(&mut self) {
        if self.accepted_on_page == 0 {
            self.consecutive_empty_pages += 1;
        } else {
            self.consecutive_empty_pages = 0;
        }
    }
}
