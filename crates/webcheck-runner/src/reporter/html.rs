use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use webcheck_core::config::HtmlOpenPolicy;
use webcheck_core::types::{RunSummary, TestStatus};

use super::{Reporter, format_duration};

/// Writes a self-contained `index.html` into the output folder.
pub struct HtmlReporter {
    output_folder: PathBuf,
    open: HtmlOpenPolicy,
}

impl HtmlReporter {
    pub fn new(output_folder: PathBuf, open: HtmlOpenPolicy) -> Self {
        Self {
            output_folder,
            open,
        }
    }
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn status_class(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "passed",
        TestStatus::Failed => "failed",
        TestStatus::Flaky => "flaky",
        TestStatus::Skipped => "skipped",
    }
}

pub(crate) fn render(summary: &RunSummary) -> String {
    let mut html = String::new();
    html.push_str(concat!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n",
        "<title>webcheck report</title>\n<style>\n",
        "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\n",
        "table{border-collapse:collapse;width:100%}\n",
        "td,th{border-bottom:1px solid #ddd;padding:.4rem .6rem;text-align:left;vertical-align:top}\n",
        ".passed{color:#1a7f37}.failed{color:#cf222e}.flaky{color:#9a6700}.skipped{color:#6e7781}\n",
        "pre{white-space:pre-wrap;margin:.3rem 0}\nimg{max-width:480px;border:1px solid #ccc}\n",
        "</style>\n</head>\n<body>\n"
    ));

    let _ = writeln!(
        html,
        "<h1>webcheck report</h1>\n<p>Started {} &middot; {} &middot; \
         <span class=\"passed\">{} passed</span> &middot; \
         <span class=\"failed\">{} failed</span> &middot; \
         <span class=\"flaky\">{} flaky</span> &middot; \
         <span class=\"skipped\">{} skipped</span></p>",
        summary.started_at.to_rfc3339(),
        format_duration(summary.duration_ms),
        summary.passed(),
        summary.failed(),
        summary.flaky(),
        summary.skipped(),
    );

    html.push_str(
        "<table>\n<tr><th>Status</th><th>Project</th><th>File</th><th>Test</th><th>Duration</th><th>Details</th></tr>\n",
    );
    for r in &summary.results {
        let class = status_class(r.status);
        let mut details = String::new();
        if r.retry > 0 {
            let _ = write!(details, "<div>retry #{}</div>", r.retry);
        }
        if let Some(error) = &r.error {
            let _ = write!(details, "<pre>{}</pre>", escape(error));
        }
        if let Some(trace) = &r.trace_path {
            let _ = write!(
                details,
                "<div>trace: <code>{}</code></div>",
                escape(&trace.display().to_string())
            );
        }
        if let Some(png) = &r.screenshot {
            let _ = write!(details, "<img alt=\"failure screenshot\" src=\"data:image/png;base64,{png}\">");
        }
        let _ = writeln!(
            html,
            "<tr class=\"{class}\"><td class=\"{class}\">{class}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{details}</td></tr>",
            escape(&r.project),
            escape(&r.file),
            escape(&r.title),
            format_duration(r.duration_ms),
        );
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn open_in_browser(path: &Path) {
    #[cfg(target_os = "macos")]
    let mut cmd = std::process::Command::new("open");
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut cmd = std::process::Command::new("xdg-open");

    if let Err(e) = cmd.arg(path).spawn() {
        warn!(%e, path = %path.display(), "Could not open HTML report");
    }
}

impl Reporter for HtmlReporter {
    fn on_end(&mut self, summary: &RunSummary) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.output_folder)?;
        let index = self.output_folder.join("index.html");
        std::fs::write(&index, render(summary))?;
        info!(path = %index.display(), "HTML report written");

        if self.open.should_open(!summary.success()) {
            open_in_browser(&index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use webcheck_core::types::TestResult;

    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            started_at: Utc::now(),
            duration_ms: 2400,
            results: vec![
                TestResult {
                    title: "example.com has the right title".into(),
                    file: "example.spec.json5".into(),
                    project: "chromium".into(),
                    status: TestStatus::Passed,
                    duration_ms: 900,
                    retry: 0,
                    error: None,
                    trace_path: None,
                    screenshot: None,
                },
                TestResult {
                    title: "<script>alert(1)</script>".into(),
                    file: "xss.spec.json5".into(),
                    project: "webkit".into(),
                    status: TestStatus::Failed,
                    duration_ms: 5100,
                    retry: 1,
                    error: Some("Received: \"A & B\"".into()),
                    trace_path: Some(PathBuf::from("test-results/x/trace.json")),
                    screenshot: Some("iVBORw0KGgo=".into()),
                },
            ],
        }
    }

    #[test]
    fn test_render_escapes_and_inlines() {
        let html = render(&summary());
        assert!(html.contains("1 passed"));
        assert!(html.contains("1 failed"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Received: &quot;A &amp; B&quot;"));
        assert!(html.contains("data:image/png;base64,iVBORw0KGgo="));
        assert!(html.contains("retry #1"));
        assert!(html.contains("test-results/x/trace.json"));
    }

    #[test]
    fn test_report_written_without_opening() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("webcheck-report");
        let mut reporter = HtmlReporter::new(folder.clone(), HtmlOpenPolicy::Never);
        reporter.on_end(&summary()).unwrap();
        let html = std::fs::read_to_string(folder.join("index.html")).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
    }
}
