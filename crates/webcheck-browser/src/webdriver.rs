//! W3C WebDriver client (geckodriver, WebKitWebDriver, chromedriver, grids).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use webcheck_core::config::ProjectConfig;
use webcheck_core::devices::DevicePreset;
use webcheck_core::error::{Result, WebcheckError};
use webcheck_core::types::BrowserEngine;

use crate::{BrowserDriver, PageSession};

/// Opens one WebDriver session per launch against a remote end.
pub struct WebDriverDriver {
    client: reqwest::Client,
    endpoint: String,
    project: String,
    engine: BrowserEngine,
    device: &'static DevicePreset,
    headless: bool,
    executable_path: Option<String>,
}

impl WebDriverDriver {
    pub fn new(
        endpoint: String,
        project: &ProjectConfig,
        device: &'static DevicePreset,
        headless: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebcheckError::Browser(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project: project.name.clone(),
            engine: project.engine,
            device,
            headless,
            executable_path: project.executable_path.clone(),
        })
    }
}

/// Build the `alwaysMatch` capabilities for an engine and device.
pub fn capabilities(
    engine: BrowserEngine,
    device: &DevicePreset,
    headless: bool,
    executable_path: Option<&str>,
) -> Value {
    let vp = device.viewport;
    match engine {
        BrowserEngine::Chromium => {
            let mut args = vec![
                format!("--window-size={},{}", vp.width, vp.height),
                format!("--user-agent={}", device.user_agent),
            ];
            if headless {
                args.push("--headless=new".into());
            }
            let mut options = json!({ "args": args });
            if let Some(binary) = executable_path {
                options["binary"] = json!(binary);
            }
            json!({ "browserName": "chrome", "goog:chromeOptions": options })
        }
        BrowserEngine::Firefox => {
            let mut args = vec![
                "-width".to_string(),
                vp.width.to_string(),
                "-height".to_string(),
                vp.height.to_string(),
            ];
            if headless {
                args.push("-headless".into());
            }
            let mut options = json!({
                "args": args,
                "prefs": { "general.useragent.override": device.user_agent },
            });
            if let Some(binary) = executable_path {
                options["binary"] = json!(binary);
            }
            json!({ "browserName": "firefox", "moz:firefoxOptions": options })
        }
        BrowserEngine::Webkit => {
            webkit_capabilities(headless, executable_path, cfg!(target_os = "macos"))
        }
    }
}

/// safaridriver on macOS, WebKitWebDriver (WebKitGTK) elsewhere. An explicit
/// `executable_path` always selects WebKitGTK.
fn webkit_capabilities(headless: bool, executable_path: Option<&str>, macos: bool) -> Value {
    if macos && executable_path.is_none() {
        return json!({ "browserName": "safari" });
    }
    let mut args = vec!["--automation".to_string()];
    if headless {
        args.push("--headless".into());
    }
    // Without a binary WebKitWebDriver launches its bundled MiniBrowser.
    let mut options = json!({ "args": args });
    if let Some(binary) = executable_path {
        options["binary"] = json!(binary);
    }
    json!({ "webkitgtk:browserOptions": options })
}

#[derive(Deserialize)]
struct Envelope {
    value: Value,
}

#[derive(Deserialize)]
struct ErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Send a WebDriver command and unwrap its `value`.
async fn command(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value> {
    let mut req = client.request(method.clone(), url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let resp = req.send().await.map_err(|e| {
        if e.is_timeout() {
            WebcheckError::Timeout(format!("WebDriver {method} {url}: {e}"))
        } else {
            WebcheckError::Browser(format!("WebDriver {method} {url}: {e}"))
        }
    })?;

    let status = resp.status();
    let envelope: Envelope = resp
        .json()
        .await
        .map_err(|e| WebcheckError::Browser(format!("Invalid WebDriver response: {e}")))?;

    if !status.is_success() {
        let detail = serde_json::from_value::<ErrorValue>(envelope.value)
            .map(|e| format!("{}: {}", e.error, e.message))
            .unwrap_or_else(|_| status.to_string());
        return Err(WebcheckError::Browser(detail));
    }
    Ok(envelope.value)
}

#[async_trait]
impl BrowserDriver for WebDriverDriver {
    fn backend(&self) -> &str {
        "webdriver"
    }

    fn engine(&self) -> BrowserEngine {
        self.engine
    }

    async fn launch(&self) -> Result<Box<dyn PageSession>> {
        let caps = capabilities(
            self.engine,
            self.device,
            self.headless,
            self.executable_path.as_deref(),
        );
        let value = command(
            &self.client,
            Method::POST,
            &format!("{}/session", self.endpoint),
            Some(json!({ "capabilities": { "alwaysMatch": caps } })),
        )
        .await?;
        let session: NewSession = serde_json::from_value(value)?;

        info!(
            project = %self.project,
            session_id = %session.session_id,
            endpoint = %self.endpoint,
            "WebDriver session created"
        );

        let page = WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session.session_id),
        };

        // Not every remote end supports resizing (Safari does, WebKitGTK may not).
        let vp = self.device.viewport;
        if let Err(e) = page
            .send(
                Method::POST,
                "/window/rect",
                Some(json!({ "width": vp.width, "height": vp.height })),
            )
            .await
        {
            debug!(%e, "Window resize not supported");
        }

        Ok(Box::new(page))
    }
}

struct WebDriverSession {
    client: reqwest::Client,
    base: String,
}

impl WebDriverSession {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        command(&self.client, method, &format!("{}{path}", self.base), body).await
    }

    async fn get_string(&self, path: &str) -> Result<String> {
        let value = self.send(Method::GET, path, None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WebcheckError::Browser(format!("Expected string from {path}")))
    }
}

#[async_trait]
impl PageSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!(url, "WebDriver navigate");
        match self.send(Method::POST, "/url", Some(json!({ "url": url }))).await {
            Ok(_) => Ok(()),
            Err(WebcheckError::Browser(msg)) => {
                Err(WebcheckError::Navigation(format!("{url}: {msg}")))
            }
            Err(e) => Err(e),
        }
    }

    async fn title(&self) -> Result<String> {
        self.get_string("/title").await
    }

    async fn url(&self) -> Result<String> {
        self.get_string("/url").await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let encoded = self.get_string("/screenshot").await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| WebcheckError::Browser(format!("Invalid screenshot data: {e}")))
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.send(Method::DELETE, "", None).await {
            warn!(%e, session = %self.base, "WebDriver session delete failed");
        }
        Ok(())
    }
}
