//! Chromium over the DevTools protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use webcheck_core::config::ProjectConfig;
use webcheck_core::devices::DevicePreset;
use webcheck_core::error::{Result, WebcheckError};
use webcheck_core::types::BrowserEngine;

use crate::{BrowserDriver, PageSession};

/// Launches a dedicated headless Chromium per session.
pub struct CdpDriver {
    project: String,
    executable_path: Option<PathBuf>,
    device: &'static DevicePreset,
    headless: bool,
    timeout: Duration,
}

impl CdpDriver {
    pub fn new(
        project: &ProjectConfig,
        device: &'static DevicePreset,
        headless: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            project: project.name.clone(),
            executable_path: project.executable_path.as_ref().map(PathBuf::from),
            device,
            headless,
            timeout,
        }
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig> {
        let vp = self.device.viewport;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .window_size(vp.width, vp.height)
            .viewport(Viewport {
                width: vp.width,
                height: vp.height,
                device_scale_factor: Some(self.device.device_scale_factor),
                emulating_mobile: self.device.is_mobile,
                is_landscape: false,
                has_touch: self.device.has_touch,
            })
            .request_timeout(self.timeout);
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(WebcheckError::Browser)
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    fn backend(&self) -> &str {
        "cdp"
    }

    fn engine(&self) -> BrowserEngine {
        BrowserEngine::Chromium
    }

    async fn launch(&self) -> Result<Box<dyn PageSession>> {
        let profile_dir =
            std::env::temp_dir().join(format!("webcheck-cdp-{}", uuid::Uuid::new_v4()));
        // Dropped on any early return, or when the caller cancels the launch.
        let mut guard = LaunchGuard::new(profile_dir.clone());
        let config = self.browser_config(&profile_dir)?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| WebcheckError::Browser(format!("Failed to launch chromium: {e}")))?;

        guard.handler_task = Some(tokio::spawn(drive_handler(handler)));

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| WebcheckError::Browser(e.to_string()))?;
        page.execute(SetUserAgentOverrideParams::new(self.device.user_agent))
            .await
            .map_err(|e| WebcheckError::Browser(e.to_string()))?;

        info!(project = %self.project, device = self.device.name, "Chromium session launched");

        let (profile_dir, handler_task) = guard.disarm();
        Ok(Box::new(CdpSession {
            page,
            browser: Mutex::new(Some(browser)),
            handler_task,
            profile_dir,
        }))
    }
}

/// Pump CDP messages until the connection ends. Per-message errors (e.g.
/// events this version can't decode) are not fatal.
async fn drive_handler<S, E>(mut handler: S)
where
    S: Stream<Item = std::result::Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(event) = handler.next().await {
        if let Err(e) = event {
            debug!(%e, "CDP handler error");
        }
    }
}

/// Owns the profile dir and handler task until a session takes them over.
struct LaunchGuard {
    profile_dir: Option<PathBuf>,
    handler_task: Option<JoinHandle<()>>,
}

impl LaunchGuard {
    fn new(profile_dir: PathBuf) -> Self {
        Self {
            profile_dir: Some(profile_dir),
            handler_task: None,
        }
    }

    fn disarm(mut self) -> (PathBuf, Option<JoinHandle<()>>) {
        let dir = self.profile_dir.take().unwrap_or_default();
        (dir, self.handler_task.take())
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        if let Some(dir) = self.profile_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                debug!(%e, dir = %dir.display(), "Profile cleanup after failed launch");
            }
        }
    }
}

struct CdpSession {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: Option<JoinHandle<()>>,
    profile_dir: PathBuf,
}

#[async_trait]
impl PageSession for CdpSession {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!(url, "CDP navigate");
        self.page
            .goto(url)
            .await
            .map_err(|e| WebcheckError::Navigation(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| WebcheckError::Browser(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| WebcheckError::Browser(e.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| WebcheckError::Browser(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = self.page.clone().close().await {
                debug!(%e, "Page close failed");
            }
            if let Err(e) = browser.close().await {
                warn!(%e, "Chromium close failed, killing process");
                if let Some(Err(e)) = browser.kill().await {
                    warn!(%e, "Chromium kill failed");
                }
            }
            let _ = browser.wait().await;
            if let Some(task) = &self.handler_task {
                task.abort();
            }
            if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
                debug!(%e, dir = %self.profile_dir.display(), "Profile cleanup failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_profile() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("webcheck-cdp-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("Default")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_handler_survives_message_errors() {
        let seen = std::sync::atomic::AtomicUsize::new(0);
        let events = futures::stream::iter(vec![Ok(()), Err("unknown event"), Ok(())])
            .inspect(|_| {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });

        drive_handler(events).await;

        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_launch_cleans_up() {
        let dir = temp_profile();
        let (alive, stopped) = tokio::sync::oneshot::channel::<()>();
        let mut guard = LaunchGuard::new(dir.clone());
        guard.handler_task = Some(tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        }));

        drop(guard);

        assert!(!dir.exists());
        assert!(stopped.await.is_err());
    }

    #[test]
    fn test_disarmed_guard_hands_off_profile() {
        let dir = temp_profile();
        let guard = LaunchGuard::new(dir.clone());
        let (handed_off, task) = guard.disarm();

        assert_eq!(handed_off, dir);
        assert!(task.is_none());
        assert!(dir.exists());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
