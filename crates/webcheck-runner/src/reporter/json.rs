use std::path::PathBuf;

use tracing::info;

use webcheck_core::types::RunSummary;

use super::Reporter;

/// Writes the whole run summary as JSON.
pub struct JsonReporter {
    output_file: PathBuf,
}

impl JsonReporter {
    pub fn new(output_file: PathBuf) -> Self {
        Self { output_file }
    }
}

impl Reporter for JsonReporter {
    fn on_end(&mut self, summary: &RunSummary) -> anyhow::Result<()> {
        if let Some(parent) = self.output_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.output_file, serde_json::to_string_pretty(summary)?)?;
        info!(path = %self.output_file.display(), "JSON report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use webcheck_core::types::{TestResult, TestStatus};

    use super::*;

    #[test]
    fn test_json_report_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        let mut reporter = JsonReporter::new(path.clone());
        let summary = RunSummary {
            started_at: Utc::now(),
            duration_ms: 42,
            results: vec![TestResult {
                title: "t".into(),
                file: "a.spec.json5".into(),
                project: "firefox".into(),
                status: TestStatus::Flaky,
                duration_ms: 40,
                retry: 1,
                error: None,
                trace_path: None,
                screenshot: None,
            }],
        };
        reporter.on_end(&summary).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["duration_ms"], 42);
        assert_eq!(saved["results"][0]["status"], "flaky");
        assert!(saved["results"][0].get("error").is_none());
    }
}
