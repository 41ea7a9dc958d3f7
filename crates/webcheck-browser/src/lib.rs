//! Browser automation backends.
//!
//! A [`BrowserDriver`] launches an isolated browser context for one test
//! attempt and hands back a [`PageSession`]. Chromium is driven over CDP
//! (feature `cdp`, on by default); Firefox and WebKit, or any project with an
//! explicit `webdriver_url`, go through the W3C WebDriver protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use webcheck_core::config::{ProjectConfig, UseOptions};
use webcheck_core::error::{Result, WebcheckError};
use webcheck_core::types::BrowserEngine;

#[cfg(feature = "cdp")]
pub mod cdp;
pub mod webdriver;

#[cfg(feature = "cdp")]
pub use cdp::CdpDriver;
pub use webdriver::WebDriverDriver;

/// Default chromedriver endpoint, used when CDP support is compiled out.
pub const DEFAULT_CHROMEDRIVER_URL: &str = "http://localhost:9515";
/// Default geckodriver endpoint.
pub const DEFAULT_GECKODRIVER_URL: &str = "http://localhost:4444";
/// Default WebKitWebDriver endpoint.
pub const DEFAULT_WEBKIT_DRIVER_URL: &str = "http://localhost:4445";

/// A single page in an isolated browser context.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Current document title.
    async fn title(&self) -> Result<String>;

    /// Current document URL.
    async fn url(&self) -> Result<String>;

    /// PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Tear down the page and its browser context.
    async fn close(&self) -> Result<()>;
}

/// Launches fresh page sessions for a project.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Backend identifier ("cdp", "webdriver").
    fn backend(&self) -> &str;

    fn engine(&self) -> BrowserEngine;

    async fn launch(&self) -> Result<Box<dyn PageSession>>;
}

/// Pick the backend for a project.
pub fn driver_for(
    project: &ProjectConfig,
    options: &UseOptions,
    timeout: Duration,
) -> Result<Arc<dyn BrowserDriver>> {
    let device = project.device_preset().ok_or_else(|| {
        WebcheckError::Config(format!(
            "Project '{}' uses unknown device '{}'",
            project.name, project.device
        ))
    })?;

    if let Some(url) = &project.webdriver_url {
        return Ok(Arc::new(WebDriverDriver::new(
            url.clone(),
            project,
            device,
            options.headless,
            timeout,
        )?));
    }

    let endpoint = match project.engine {
        #[cfg(feature = "cdp")]
        BrowserEngine::Chromium => {
            return Ok(Arc::new(CdpDriver::new(
                project,
                device,
                options.headless,
                timeout,
            )));
        }
        #[cfg(not(feature = "cdp"))]
        BrowserEngine::Chromium => DEFAULT_CHROMEDRIVER_URL,
        BrowserEngine::Firefox => DEFAULT_GECKODRIVER_URL,
        BrowserEngine::Webkit => DEFAULT_WEBKIT_DRIVER_URL,
    };

    Ok(Arc::new(WebDriverDriver::new(
        endpoint.to_string(),
        project,
        device,
        options.headless,
        timeout,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(engine: BrowserEngine, device: &str) -> ProjectConfig {
        ProjectConfig {
            name: engine.to_string(),
            engine,
            device: device.into(),
            webdriver_url: None,
            executable_path: None,
        }
    }

    #[test]
    fn test_firefox_uses_webdriver() {
        let driver = driver_for(
            &project(BrowserEngine::Firefox, "Desktop Firefox"),
            &UseOptions::default(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(driver.backend(), "webdriver");
        assert_eq!(driver.engine(), BrowserEngine::Firefox);
    }

    #[cfg(feature = "cdp")]
    #[test]
    fn test_chromium_uses_cdp() {
        let driver = driver_for(
            &project(BrowserEngine::Chromium, "Desktop Chrome"),
            &UseOptions::default(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(driver.backend(), "cdp");
    }

    #[test]
    fn test_explicit_webdriver_url_wins() {
        let mut p = project(BrowserEngine::Chromium, "Desktop Chrome");
        p.webdriver_url = Some("http://grid:4444".into());
        let driver = driver_for(&p, &UseOptions::default(), Duration::from_secs(30)).unwrap();
        assert_eq!(driver.backend(), "webdriver");
    }

    #[test]
    fn test_unknown_device_is_config_error() {
        let result = driver_for(
            &project(BrowserEngine::Webkit, "Unknown Phone"),
            &UseOptions::default(),
            Duration::from_secs(30),
        );
        assert!(matches!(result, Err(WebcheckError::Config(_))));
    }
}
