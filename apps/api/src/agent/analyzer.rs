//! Page analyzer: asks the completion capability for a selector set that maps
//! each role onto the current page's markup.
//!
//! The page source is condensed (scripts, styles, inline SVG and comments
//! dropped, whitespace collapsed) and truncated before it is sent. On a
//! re-analysis the previous set and its validation failures are included so
//! the next answer is a fresh, complete set rather than a patch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::context::AnalysisFeedback;
use crate::agent::prompts::{ANALYZE_FEEDBACK_TEMPLATE, ANALYZE_PROMPT_TEMPLATE, ANALYZE_SYSTEM};
use crate::agent::selectors::{Role, SelectorRule, SelectorSet};
use crate::agent::{AgentError, CallGuard};
use crate::browser::BrowserSession;
use crate::llm_client::prompts::{truncate_chars, UNTRUSTED_CONTENT_INSTRUCTION};
use crate::llm_client::CompletionCapability;

/// Characters of condensed HTML sent to the model.
pub const MAX_HTML_CHARS: usize = 25_000;
const DEFAULT_RULE_CONFIDENCE: f32 = 0.5;

static RE_NOISE_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|svg|noscript|iframe)\b[^>]*>.*?</(script|style|svg|noscript|iframe)>")
        .unwrap()
});
static RE_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    selectors: HashMap<String, Value>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// A rule is either a bare CSS string or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRule {
    Css(String),
    Detailed {
        css: String,
        #[serde(default)]
        attribute: Option<String>,
        #[serde(default)]
        confidence: Option<f32>,
    },
}

pub struct Analyzer {
    completion: Arc<dyn CompletionCapability>,
}

impl Analyzer {
    pub fn new(completion: Arc<dyn CompletionCapability>) -> Self {
        Self { completion }
    }

    pub async fn analyze(
        &self,
        browser: &dyn BrowserSession,
        feedback: Option<&AnalysisFeedback>,
        guard: &CallGuard,
    ) -> Result<SelectorSet, AgentError> {
        let page_url = guard.browser("read url", browser.current_url()).await?;
        let html = guard.browser("read page source", browser.page_source()).await?;
        let condensed = condense_html(&html);
        debug!(
            "condensed page from {} to {} chars",
            html.len(),
            condensed.len()
        );

        let prompt = build_prompt(&page_url, &condensed, feedback);
        let answer = guard
            .completion(
                "analyze page",
                self.completion.complete(&prompt, ANALYZE_SYSTEM),
            )
            .await?;

        let set = parse_selector_set(answer)?;
        info!(
            "derived {} selectors for {page_url} (confidence {:.2})",
            set.len(),
            set.confidence
        );
        Ok(set)
    }
}

pub fn condense_html(html: &str) -> String {
    let without_blocks = RE_NOISE_BLOCKS.replace_all(html, "");
    let without_comments = RE_COMMENTS.replace_all(&without_blocks, "");
    let collapsed = RE_WHITESPACE.replace_all(&without_comments, " ");
    truncate_chars(collapsed.trim(), MAX_HTML_CHARS).to_string()
}

fn build_prompt(page_url: &str, html: &str, feedback: Option<&AnalysisFeedback>) -> String {
    let roles = Role::ALL
        .iter()
        .map(|role| {
            let marker = if role.is_required() { " (required)" } else { "" };
            format!("- {}{marker}: {}", role.key(), role.describe())
        })
        .collect::<Vec<_>>()
        .join("\n");

    ANALYZE_PROMPT_TEMPLATE
        .replace("{page_url}", page_url)
        .replace("{roles}", &roles)
        .replace("{feedback}", &render_feedback(feedback))
        .replace("{untrusted}", UNTRUSTED_CONTENT_INSTRUCTION)
        .replace("{html}", html)
}

fn render_feedback(feedback: Option<&AnalysisFeedback>) -> String {
    let Some(feedback) = feedback else {
        return String::new();
    };
    let previous = feedback
        .previous
        .as_ref()
        .map(|set| {
            set.rules()
                .map(|(role, rule)| format!("- {}: {}", role.key(), rule.css))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_else(|| "(none)".to_string());
    let failures = if feedback.failures.is_empty() {
        "(unspecified)".to_string()
    } else {
        feedback
            .failures
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    ANALYZE_FEEDBACK_TEMPLATE
        .replace("{previous}", &previous)
        .replace("{failures}", &failures)
}

/// Turns the model's answer into a selector set. Unknown role keys are
/// ignored; a missing or blank required role is a schema violation.
pub fn parse_selector_set(answer: Value) -> Result<SelectorSet, AgentError> {
    let response: AnalysisResponse = serde_json::from_value(answer)
        .map_err(|e| AgentError::Schema(format!("analysis answer: {e}")))?;

    let mut rules = BTreeMap::new();
    for (key, raw) in response.selectors {
        let Some(role) = Role::from_key(&key) else {
            debug!("ignoring unknown selector role `{key}`");
            continue;
        };
        if raw.is_null() {
            continue;
        }
        let raw: RawRule = serde_json::from_value(raw)
            .map_err(|e| AgentError::Schema(format!("selector for {role}: {e}")))?;
        let rule = match raw {
            RawRule::Css(css) => SelectorRule {
                css,
                attribute: None,
                confidence: DEFAULT_RULE_CONFIDENCE,
            },
            RawRule::Detailed {
                css,
                attribute,
                confidence,
            } => SelectorRule {
                css,
                attribute: attribute.filter(|a| !a.trim().is_empty()),
                confidence: confidence
                    .unwrap_or(DEFAULT_RULE_CONFIDENCE)
                    .clamp(0.0, 1.0),
            },
        };
        if rule.css.trim().is_empty() {
            if role.is_required() {
                return Err(AgentError::Schema(format!("selector for {role} is blank")));
            }
            continue;
        }
        rules.insert(role, rule);
    }

    let confidence = response.confidence.unwrap_or_else(|| {
        if rules.is_empty() {
            0.0
        } else {
            rules.values().map(|r: &SelectorRule| r.confidence).sum::<f32>() / rules.len() as f32
        }
    });
    let set = SelectorSet::new(rules, confidence);

    let missing = set.missing_required();
    if !missing.is_empty() {
        let names = missing.iter().map(|r| r.key()).collect::<Vec<_>>().join(", ");
        return Err(AgentError::Schema(format!("missing required roles: {names}")));
    }
    Ok(set)
}
