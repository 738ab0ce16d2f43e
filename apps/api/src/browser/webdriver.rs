//! W3C WebDriver client (chromedriver, geckodriver, Selenium Grid).
//!
//! Every command is a JSON request against `{base}/session/{id}/...`; the
//! reply is `{"value": ...}` on success and `{"value": {"error", "message"}}`
//! on failure. Connection-level failures are retried with exponential backoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserLauncher, BrowserSession, ElementRef};

/// W3C element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const MAX_RETRIES: u32 = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct WebDriverReply {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WebDriverFailure {
    error: String,
    #[serde(default)]
    message: String,
}

/// Launches WebDriver sessions against a remote end.
#[derive(Clone)]
pub struct WebDriverLauncher {
    client: Client,
    base_url: String,
    headless: bool,
}

impl WebDriverLauncher {
    pub fn new(base_url: String, headless: bool) -> Result<Self, BrowserError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| BrowserError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--window-size=1400,1000", "--disable-gpu"];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        let url = format!("{}/session", self.base_url);
        let value = send(&self.client, Method::POST, &url, Some(self.capabilities())).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Command("new session reply lacked sessionId".to_string()))?
            .to_string();
        info!("WebDriver session {session_id} opened");

        Ok(Arc::new(WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, session_id),
        }))
    }
}

pub struct WebDriverSession {
    client: Client,
    session_url: String,
}

impl WebDriverSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.client, method, &url, body).await
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "/url", None).await?;
        as_string(value)
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "/source", None).await?;
        as_string(value)
    }

    async fn query(
        &self,
        within: Option<&ElementRef>,
        selector: &str,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        let path = match within {
            Some(parent) => format!("/element/{}/elements", parent.0),
            None => "/elements".to_string(),
        };
        let body = json!({ "using": "css selector", "value": selector });
        let value = match self.command(Method::POST, &path, Some(body)).await {
            Ok(v) => v,
            Err(BrowserError::NoSuchElement(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let elements = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(|id| ElementRef(id.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(elements)
    }

    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        let path = format!("/element/{}/text", element.0);
        as_string(self.command(Method::GET, &path, None).await?)
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let path = format!("/element/{}/attribute/{}", element.0, name);
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn tag_name(&self, element: &ElementRef) -> Result<String, BrowserError> {
        let path = format!("/element/{}/name", element.0);
        as_string(self.command(Method::GET, &path, None).await?).map(|t| t.to_lowercase())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let started = Instant::now();
        loop {
            if !self.query(None, selector).await?.is_empty() {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(BrowserError::Timeout(format!("waiting for `{selector}`")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.command(Method::DELETE, "", None).await?;
        info!("WebDriver session closed: {}", self.session_url);
        Ok(())
    }
}

/// Sends one WebDriver command. Retries connection failures only: a request
/// that never reached the remote end is safe to resend.
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, BrowserError> {
    let mut last_error: Option<BrowserError> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
            warn!(
                "WebDriver command attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client.request(method.clone(), url);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_connect() => {
                last_error = Some(BrowserError::Unavailable(e.to_string()));
                continue;
            }
            Err(e) if e.is_timeout() => return Err(BrowserError::Timeout(e.to_string())),
            Err(e) => return Err(BrowserError::Unavailable(e.to_string())),
        };

        let status = response.status();
        let reply: WebDriverReply = response
            .json()
            .await
            .map_err(|e| BrowserError::Command(format!("unreadable reply ({status}): {e}")))?;

        if status.is_success() {
            debug!("WebDriver {} {} -> {}", method, url, status);
            return Ok(reply.value);
        }

        let failure: WebDriverFailure = serde_json::from_value(reply.value).unwrap_or(
            WebDriverFailure {
                error: "unknown error".to_string(),
                message: status.to_string(),
            },
        );
        return Err(classify_failure(&failure.error, failure.message));
    }

    Err(last_error.unwrap_or_else(|| BrowserError::Unavailable("no attempts made".to_string())))
}

fn classify_failure(code: &str, message: String) -> BrowserError {
    match code {
        "no such element" => BrowserError::NoSuchElement(message),
        "stale element reference" | "element not interactable" | "element click intercepted" => {
            BrowserError::StaleElement(message)
        }
        "invalid selector" => BrowserError::InvalidSelector(message),
        "timeout" | "script timeout" => BrowserError::Timeout(message),
        "invalid session id" | "session not created" => BrowserError::Unavailable(message),
        _ => BrowserError::Command(format!("{code}: {message}")),
    }
}

fn as_string(value: Value) -> Result<String, BrowserError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(BrowserError::Command(format!(
            "expected a string reply, got {other}"
        ))),
    }
}
