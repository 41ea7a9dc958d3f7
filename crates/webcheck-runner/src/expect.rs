//! Web-first assertions that retry until a deadline.

use std::future::Future;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::trace;

use webcheck_browser::PageSession;
use webcheck_core::error::{Result, WebcheckError};

/// Back-off between probes, in ms. The last value repeats.
const POLL_INTERVALS_MS: [u64; 4] = [100, 250, 500, 1000];

/// Wait until the page title matches `pattern`.
pub async fn expect_title(page: &dyn PageSession, pattern: &Regex, timeout: Duration) -> Result<()> {
    poll_until_match("title", pattern, timeout, || page.title()).await
}

/// Wait until the page URL matches `pattern`.
pub async fn expect_url(page: &dyn PageSession, pattern: &Regex, timeout: Duration) -> Result<()> {
    poll_until_match("URL", pattern, timeout, || page.url()).await
}

async fn poll_until_match<F, Fut>(
    what: &str,
    pattern: &Regex,
    timeout: Duration,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0usize;
    let mut received: Option<String> = None;
    let mut last_error: Option<String> = None;

    loop {
        match probe().await {
            Ok(value) if pattern.is_match(&value) => return Ok(()),
            Ok(value) => {
                trace!(what, %value, attempt, "No match yet");
                received = Some(value);
            }
            Err(e) => last_error = Some(e.to_string()),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let interval = POLL_INTERVALS_MS[attempt.min(POLL_INTERVALS_MS.len() - 1)];
        let wait = Duration::from_millis(interval).min(deadline - now);
        tokio::time::sleep(wait).await;
        attempt += 1;
    }

    let mut msg = format!(
        "Timed out {}ms waiting for page {what} to match /{}/",
        timeout.as_millis(),
        pattern.as_str()
    );
    match (received, last_error) {
        (Some(value), _) => msg.push_str(&format!("\nReceived: {value:?}")),
        (None, Some(err)) => msg.push_str(&format!("\nLast error: {err}")),
        (None, None) => {}
    }
    Err(WebcheckError::Assertion(msg))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Serves titles from a script, repeating the last one.
    struct ScriptedTitles {
        titles: Mutex<Vec<&'static str>>,
        probes: Mutex<usize>,
    }

    impl ScriptedTitles {
        fn new(titles: Vec<&'static str>) -> Self {
            Self {
                titles: Mutex::new(titles),
                probes: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSession for ScriptedTitles {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn title(&self) -> Result<String> {
            *self.probes.lock().unwrap() += 1;
            let mut titles = self.titles.lock().unwrap();
            if titles.len() > 1 {
                Ok(titles.remove(0).to_string())
            } else {
                Ok(titles[0].to_string())
            }
        }

        async fn url(&self) -> Result<String> {
            Err(WebcheckError::Browser("target closed".into()))
        }

        async fn screenshot(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn example_domain() -> Regex {
        Regex::new("Example Domain").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_title_matches_immediately() {
        let page = ScriptedTitles::new(vec!["Example Domain"]);
        expect_title(&page, &example_domain(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(*page.probes.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_title_matches_after_polling() {
        let page = ScriptedTitles::new(vec!["", "Loading", "Example Domain"]);
        expect_title(&page, &example_domain(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(*page.probes.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_title_mismatch_times_out() {
        let page = ScriptedTitles::new(vec!["Wrong Page"]);
        let started = Instant::now();
        let err = expect_title(&page, &example_domain(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(started.elapsed() >= Duration::from_secs(5));
        let msg = err.to_string();
        assert!(msg.contains("/Example Domain/"), "{msg}");
        assert!(msg.contains("\"Wrong Page\""), "{msg}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_substring_pattern_matches() {
        let page = ScriptedTitles::new(vec!["Welcome to Example Domain!"]);
        assert!(
            expect_title(&page, &example_domain(), Duration::from_millis(100))
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_url_probe_errors_reported() {
        let page = ScriptedTitles::new(vec![""]);
        let err = expect_url(&page, &Regex::new("example").unwrap(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("target closed"));
    }
}
