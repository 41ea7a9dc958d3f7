//! Shared types: browser engines and test results.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rendering engine a project targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a test in one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    /// Failed at least once, then passed on retry.
    Flaky,
    Skipped,
}

impl TestStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Result of running one test in one project, after retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub title: String,
    pub file: String,
    pub project: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    /// Number of retries used (0 when the first attempt settled it).
    pub retry: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<PathBuf>,
    /// Base64 PNG captured when the final attempt failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl TestResult {
    /// Display title in the form `[project] › file › name`.
    pub fn full_title(&self) -> String {
        format!("[{}] › {} › {}", self.project, self.file, self.title)
    }
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl RunSummary {
    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn flaky(&self) -> usize {
        self.count(TestStatus::Flaky)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// True when no test failed.
    pub fn success(&self) -> bool {
        !self.results.iter().any(|r| r.status.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: TestStatus) -> TestResult {
        TestResult {
            title: "t".into(),
            file: "a.spec.json5".into(),
            project: "chromium".into(),
            status,
            duration_ms: 1,
            retry: 0,
            error: None,
            trace_path: None,
            screenshot: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            started_at: Utc::now(),
            duration_ms: 10,
            results: vec![
                result(TestStatus::Passed),
                result(TestStatus::Flaky),
                result(TestStatus::Skipped),
            ],
        };
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.flaky(), 1);
        assert_eq!(summary.skipped(), 1);
        assert!(summary.success());
    }

    #[test]
    fn test_summary_failure() {
        let summary = RunSummary {
            started_at: Utc::now(),
            duration_ms: 10,
            results: vec![result(TestStatus::Passed), result(TestStatus::Failed)],
        };
        assert_eq!(summary.failed(), 1);
        assert!(!summary.success());
    }

    #[test]
    fn test_full_title() {
        let r = result(TestStatus::Passed);
        assert_eq!(r.full_title(), "[chromium] › a.spec.json5 › t");
    }

    #[test]
    fn test_engine_serde() {
        let engine: BrowserEngine = serde_json::from_str("\"webkit\"").unwrap();
        assert_eq!(engine, BrowserEngine::Webkit);
        assert_eq!(engine.to_string(), "webkit");
    }
}
