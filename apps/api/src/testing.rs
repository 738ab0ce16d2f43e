//! In-process fakes for the browser and completion capabilities.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::agent::prompts::ANALYZE_SYSTEM;
use crate::browser::{BrowserError, BrowserLauncher, BrowserSession, ElementRef};
use crate::llm_client::{CompletionCapability, LlmError};
use crate::matching::prompts::SCORE_SYSTEM;

pub const CONTAINER: &str = "ul.results";
pub const ITEM: &str = "li.card";
pub const LINK: &str = "a.card-link";
pub const TITLE: &str = "h1.title";
pub const COMPANY: &str = "a.company";
pub const LOCATION: &str = "span.location";
pub const SALARY: &str = "span.salary";
pub const POSTED: &str = "time.posted";
pub const DESCRIPTION: &str = "div.description";
pub const NEXT: &str = "button.next";
/// Matches two elements page-wide.
pub const DUPLICATED: &str = "div.duplicated";

const ORIGIN: &str = "https://jobs.example.com";

/// Selector answer matching the fake page layout.
pub fn good_selectors() -> Value {
    json!({
        "selectors": {
            "list_container": {"css": CONTAINER, "confidence": 0.95},
            "job_item": {"css": ITEM, "confidence": 0.9},
            "item_link": {"css": LINK, "attribute": "href", "confidence": 0.9},
            "title": {"css": TITLE, "confidence": 0.9},
            "company": {"css": COMPANY, "confidence": 0.9},
            "location": LOCATION,
            "compensation": SALARY,
            "posted_at": POSTED,
            "description": DESCRIPTION,
            "next_page": NEXT
        },
        "confidence": 0.9
    })
}

/// Well-formed answer whose list container matches nothing.
pub fn stale_selectors() -> Value {
    let mut answer = good_selectors();
    answer["selectors"]["list_container"] = json!("section.gone");
    answer
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: String,
    pub posted: String,
    pub description: String,
    pub href: String,
}

#[derive(Debug, Default)]
struct PageState {
    page: usize,
    selected: Option<usize>,
    clicks: usize,
}

/// A scripted two-pane job board. Items that lack a title never render a
/// detail view, so waiting for the title times out.
pub struct FakeBrowser {
    pages: Vec<Vec<FakeItem>>,
    state: Mutex<PageState>,
    closed: AtomicBool,
    unavailable: AtomicBool,
    cancel_on_click: Mutex<Option<(usize, CancellationToken)>>,
    hung_selector: Mutex<Option<(String, usize)>>,
}

impl FakeBrowser {
    pub fn new(pages: Vec<Vec<FakeItem>>) -> Self {
        Self {
            pages,
            state: Mutex::new(PageState::default()),
            closed: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            cancel_on_click: Mutex::new(None),
            hung_selector: Mutex::new(None),
        }
    }

    /// `pages` pages of `per_page` items; the last `broken` items of each page
    /// have no detail view.
    pub fn paged(pages: usize, per_page: usize, broken: usize) -> Self {
        let pages = (0..pages)
            .map(|p| {
                (0..per_page)
                    .map(|i| FakeItem {
                        title: (i + broken < per_page).then(|| format!("Rust Engineer {p}-{i}")),
                        company: Some(format!("Company {i}")),
                        location: "Remote".to_string(),
                        posted: format!("{} days ago", i + 1),
                        description: format!("Build distributed systems in Rust. Role {p}-{i}."),
                        href: format!("/jobs/view/{p}-{i}?trk=list"),
                    })
                    .collect()
            })
            .collect();
        Self::new(pages)
    }

    pub fn page_url(&self, page: usize) -> String {
        format!("{ORIGIN}/jobs/search?page={page}")
    }

    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn cancel_on_click(&self, nth: usize, token: CancellationToken) {
        *self.cancel_on_click.lock().unwrap() = Some((nth, token));
    }

    /// Page-wide queries for `selector` never answer once `after_clicks`
    /// clicks have happened.
    pub fn hang_query(&self, selector: &str, after_clicks: usize) {
        *self.hung_selector.lock().unwrap() = Some((selector.to_string(), after_clicks));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn click_count(&self) -> usize {
        self.state.lock().unwrap().clicks
    }

    pub fn current_page(&self) -> usize {
        self.state.lock().unwrap().page
    }

    fn check(&self) -> Result<(), BrowserError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BrowserError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn items(&self, page: usize) -> &[FakeItem] {
        self.pages.get(page).map(Vec::as_slice).unwrap_or(&[])
    }

    fn selected_item(&self) -> Option<FakeItem> {
        let state = self.state.lock().unwrap();
        state
            .selected
            .and_then(|i| self.items(state.page).get(i).cloned())
    }

    fn has_next(&self) -> bool {
        self.state.lock().unwrap().page + 1 < self.pages.len()
    }

    fn detail_text(&self, id: &str) -> Option<String> {
        let item = self.selected_item()?;
        item.title.as_ref()?;
        match id {
            "title" => item.title,
            "company" => item.company,
            "location" => Some(item.location),
            "posted" => Some(item.posted),
            "description" => Some(item.description),
            _ => None,
        }
    }

    fn page_query(&self, selector: &str) -> Vec<ElementRef> {
        let detail = |id: &str| {
            self.detail_text(id)
                .map(|_| vec![ElementRef(id.to_string())])
                .unwrap_or_default()
        };
        match selector {
            CONTAINER => vec![ElementRef("container".to_string())],
            DUPLICATED => vec![ElementRef("dup-1".to_string()), ElementRef("dup-2".to_string())],
            TITLE => detail("title"),
            COMPANY => detail("company"),
            LOCATION => detail("location"),
            POSTED => detail("posted"),
            DESCRIPTION => detail("description"),
            NEXT if self.has_next() => vec![ElementRef("next".to_string())],
            ITEM => self.item_refs(),
            _ => Vec::new(),
        }
    }

    fn item_refs(&self) -> Vec<ElementRef> {
        let page = self.state.lock().unwrap().page;
        (0..self.items(page).len())
            .map(|i| ElementRef(format!("item-{i}")))
            .collect()
    }
}

fn item_index(element: &ElementRef, prefix: &str) -> Option<usize> {
    element.0.strip_prefix(prefix)?.parse().ok()
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.page = 0;
        state.selected = None;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.check()?;
        Ok(self.page_url(self.current_page()))
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.check()?;
        let page = self.current_page();
        let cards: String = self
            .items(page)
            .iter()
            .map(|item| {
                format!(
                    "<li class=\"card\"><a class=\"card-link\" href=\"{}\">{}</a></li>",
                    item.href,
                    item.title.as_deref().unwrap_or("")
                )
            })
            .collect();
        Ok(format!(
            "<html><head><script>track()</script></head><body><ul class=\"results\">{cards}</ul>\
             <button class=\"next\">Next</button></body></html>"
        ))
    }

    async fn query(
        &self,
        within: Option<&ElementRef>,
        selector: &str,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        self.check()?;
        if selector.contains("!!") {
            return Err(BrowserError::InvalidSelector(selector.to_string()));
        }
        let hung = within.is_none()
            && matches!(
                self.hung_selector.lock().unwrap().as_ref(),
                Some((hung, after)) if hung == selector && self.click_count() >= *after
            );
        if hung {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match within {
            None => Ok(self.page_query(selector)),
            Some(parent) if parent.0 == "container" && selector == ITEM => Ok(self.item_refs()),
            Some(parent) if selector == LINK => Ok(item_index(parent, "item-")
                .map(|i| vec![ElementRef(format!("link-{i}"))])
                .unwrap_or_default()),
            Some(_) => Ok(Vec::new()),
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.clicks += 1;
        if let Some((nth, token)) = self.cancel_on_click.lock().unwrap().as_ref() {
            if state.clicks == *nth {
                token.cancel();
            }
        }
        if element.0 == "next" {
            state.page += 1;
            state.selected = None;
        } else if let Some(i) = item_index(element, "item-") {
            state.selected = Some(i);
        }
        Ok(())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        self.check()?;
        self.detail_text(&element.0)
            .ok_or_else(|| BrowserError::NoSuchElement(element.0.clone()))
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.check()?;
        let page = self.current_page();
        Ok(match (item_index(element, "link-"), name) {
            (Some(i), "href") => self.items(page).get(i).map(|item| item.href.clone()),
            _ => None,
        })
    }

    async fn tag_name(&self, element: &ElementRef) -> Result<String, BrowserError> {
        self.check()?;
        let tag = match element.0.as_str() {
            "container" => "ul",
            "next" => "button",
            "title" => "h1",
            id if id.starts_with("item-") => "li",
            id if id.starts_with("link-") => "a",
            _ => "div",
        };
        Ok(tag.to_string())
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.check()?;
        if self.page_query(selector).is_empty() {
            Err(BrowserError::Timeout(format!("waiting for `{selector}`")))
        } else {
            Ok(())
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub browser: Arc<FakeBrowser>,
    pub unavailable: bool,
}

impl FakeLauncher {
    pub fn new(browser: Arc<FakeBrowser>) -> Self {
        Self {
            browser,
            unavailable: false,
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        if self.unavailable {
            return Err(BrowserError::Unavailable("no WebDriver endpoint".to_string()));
        }
        Ok(self.browser.clone())
    }
}

/// One scripted completion answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Malformed,
    Unavailable,
    Hang,
}

type Scorer = Box<dyn Fn(&str) -> Reply + Send + Sync>;

/// Completion fake that routes on the system prompt: page analysis answers
/// come from a queue (falling back to `good_selectors`), scoring answers from
/// a closure over the prompt, anything else gets the profile summary.
pub struct ScriptedCompletion {
    analysis: Mutex<VecDeque<Reply>>,
    analysis_prompts: Mutex<Vec<String>>,
    scorer: Scorer,
    score_calls: AtomicUsize,
    summary: Value,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            analysis: Mutex::new(VecDeque::new()),
            analysis_prompts: Mutex::new(Vec::new()),
            scorer: Box::new(|_| Reply::Json(uniform_scores(8.0))),
            score_calls: AtomicUsize::new(0),
            summary: json!({
                "skills": ["Rust", "Tokio", "PostgreSQL"],
                "experience": "Five years building backend services.",
                "education": "BSc Computer Science",
                "years_experience": 5
            }),
        }
    }

    pub fn with_scorer(mut self, scorer: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    pub fn push_analysis(&self, reply: Reply) {
        self.analysis.lock().unwrap().push_back(reply);
    }

    pub fn analysis_prompts(&self) -> Vec<String> {
        self.analysis_prompts.lock().unwrap().clone()
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }
}

pub fn uniform_scores(score: f32) -> Value {
    json!({
        "skills_match": score,
        "experience_match": score,
        "education_match": score,
        "overall_fit": score,
        "rationale": "Solid overlap with the candidate's background."
    })
}

async fn answer(reply: Reply) -> Result<Value, LlmError> {
    match reply {
        Reply::Json(value) => Ok(value),
        Reply::Malformed => Err(LlmError::Parse(
            serde_json::from_str::<Value>("{not json").unwrap_err(),
        )),
        Reply::Unavailable => Err(LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        }),
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(LlmError::EmptyContent)
        }
    }
}

#[async_trait]
impl CompletionCapability for ScriptedCompletion {
    async fn complete(&self, prompt: &str, system: &str) -> Result<Value, LlmError> {
        if system == ANALYZE_SYSTEM {
            self.analysis_prompts.lock().unwrap().push(prompt.to_string());
            let reply = self
                .analysis
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Reply::Json(good_selectors()));
            answer(reply).await
        } else if system == SCORE_SYSTEM {
            self.score_calls.fetch_add(1, Ordering::SeqCst);
            answer((self.scorer)(prompt)).await
        } else {
            Ok(self.summary.clone())
        }
    }
}
