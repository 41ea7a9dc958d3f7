//! Run reporters.

use std::path::Path;

use webcheck_core::config::{ReporterConfig, RunConfig};
use webcheck_core::types::{RunSummary, TestResult};

mod html;
mod json;
mod list;

pub use html::HtmlReporter;
pub use json::JsonReporter;
pub use list::ListReporter;

/// Receives run events in order: begin, one end per test, end of run.
pub trait Reporter: Send {
    fn on_begin(&mut self, _total: usize, _workers: usize) {}

    fn on_test_end(&mut self, _result: &TestResult) {}

    fn on_end(&mut self, _summary: &RunSummary) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Instantiate the configured reporters. Output paths resolve against `base`.
pub fn build_reporters(config: &RunConfig, base: &Path) -> Vec<Box<dyn Reporter>> {
    config
        .reporter
        .iter()
        .map(|r| -> Box<dyn Reporter> {
            match r {
                ReporterConfig::List => Box::new(ListReporter::stdout()),
                ReporterConfig::Json { output_file } => {
                    Box::new(JsonReporter::new(base.join(output_file)))
                }
                ReporterConfig::Html {
                    output_folder,
                    open,
                } => Box::new(HtmlReporter::new(base.join(output_folder), *open)),
            }
        })
        .collect()
}

/// `812ms` below a second, `1.2s` above.
pub(crate) fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(812), "812ms");
        assert_eq!(format_duration(1250), "1.2s");
        assert_eq!(format_duration(30_000), "30.0s");
    }

    #[test]
    fn test_build_reporters_from_config() {
        let config = RunConfig::parse(
            r#"{ reporter: [{ type: "list" }, { type: "html", open: "never" }, { type: "json" }] }"#,
        )
        .unwrap();
        assert_eq!(build_reporters(&config, Path::new(".")).len(), 3);
    }
}
