// Prompt constants for the browsing agent.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for page analysis. Enforces JSON-only output.
pub const ANALYZE_SYSTEM: &str = "You are an expert in web scraping and HTML structure analysis. \
    You derive robust CSS selectors for job listing pages. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Page analysis prompt.
/// Replace: {page_url}, {roles}, {feedback}, {untrusted}, {html}
pub const ANALYZE_PROMPT_TEMPLATE: &str = r#"Analyze the job search results page at {page_url} and derive CSS selectors for each role below.

ROLES:
{roles}

The page is a two-pane layout: clicking a job card in the list opens its details in a side panel.
`list_container`, `job_item` and `item_link` address the result list. `job_item` is evaluated
inside the container. Every other role addresses the detail panel after a card was clicked.

Prefer stable attributes (data-*, aria-*, semantic class names) over positional selectors.
Never use :nth-child unless nothing else distinguishes the element.

Return a JSON object with this EXACT schema:
{
  "selectors": {
    "list_container": {"css": "ul.jobs-search__results-list", "confidence": 0.9},
    "job_item": {"css": "li.job-card", "confidence": 0.9},
    "item_link": {"css": "a.job-card__link", "attribute": "href", "confidence": 0.8},
    "title": {"css": "h1.job-title", "confidence": 0.9}
  },
  "confidence": 0.85
}

`list_container`, `job_item`, `title` and `company` are required. Omit optional roles you cannot find.
`confidence` values are between 0 and 1.
{feedback}
{untrusted}

BEGIN PAGE HTML
{html}
END PAGE HTML"#;

/// Appended when a previous selector set failed validation.
/// Replace: {previous}, {failures}
pub const ANALYZE_FEEDBACK_TEMPLATE: &str = r#"
A PREVIOUS ATTEMPT FAILED. Derive a complete new set; do not repeat selectors that failed.
Previous selectors:
{previous}
Failures:
{failures}
"#;
