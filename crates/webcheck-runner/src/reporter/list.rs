use std::io::Write;

use webcheck_core::types::{RunSummary, TestResult, TestStatus};

use super::{Reporter, format_duration};

/// One line per finished test, then a summary.
pub struct ListReporter {
    out: Box<dyn Write + Send>,
    finished: usize,
}

impl ListReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, finished: 0 }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn line(&mut self, text: &str) {
        // A closed stdout is not worth failing the run over.
        let _ = writeln!(self.out, "{text}");
    }
}

fn mark(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "✓",
        TestStatus::Failed => "✘",
        TestStatus::Flaky => "±",
        TestStatus::Skipped => "-",
    }
}

impl Reporter for ListReporter {
    fn on_begin(&mut self, total: usize, workers: usize) {
        let tests = if total == 1 { "test" } else { "tests" };
        let workers_label = if workers == 1 { "worker" } else { "workers" };
        self.line(&format!("\nRunning {total} {tests} using {workers} {workers_label}\n"));
    }

    fn on_test_end(&mut self, result: &TestResult) {
        self.finished += 1;
        let mut line = format!(
            "  {}  {} {} ({})",
            mark(result.status),
            self.finished,
            result.full_title(),
            format_duration(result.duration_ms)
        );
        if result.retry > 0 {
            line.push_str(&format!(" [retry #{}]", result.retry));
        }
        self.line(&line);
        if result.status == TestStatus::Failed {
            if let Some(error) = &result.error {
                for l in error.lines() {
                    self.line(&format!("      {l}"));
                }
            }
        }
    }

    fn on_end(&mut self, summary: &RunSummary) -> anyhow::Result<()> {
        self.line("");
        let failed: Vec<_> = summary
            .results
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
            .collect();
        if !failed.is_empty() {
            self.line(&format!("  {} failed", failed.len()));
            for r in failed {
                self.line(&format!("    {}", r.full_title()));
            }
        }
        let flaky = summary.flaky();
        if flaky > 0 {
            self.line(&format!("  {flaky} flaky"));
        }
        let skipped = summary.skipped();
        if skipped > 0 {
            self.line(&format!("  {skipped} skipped"));
        }
        self.line(&format!(
            "  {} passed ({})",
            summary.passed(),
            format_duration(summary.duration_ms)
        ));
        self.out.flush()?;
        Ok(())
    }
}
