//! End-to-end run of the shipped config and scenarios against real browsers.
//!
//! Needs network access, Chromium, geckodriver on `localhost:4444`, and a
//! WebKit driver on `localhost:4445` (`safaridriver -p 4445` on macOS,
//! `WebKitWebDriver --port=4445` elsewhere), so it is skipped unless
//! `WEBCHECK_E2E` is set.
//! Run with: `WEBCHECK_E2E=1 cargo test -p webcheck-runner --test e2e`
//! Restrict engines with `WEBCHECK_E2E_PROJECTS=chromium,firefox`.

use std::path::PathBuf;

use webcheck_core::config::RunConfig;
use webcheck_core::types::TestStatus;
use webcheck_runner::{Runner, RunnerOptions, discover};

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn e2e_enabled() -> bool {
    std::env::var("WEBCHECK_E2E")
        .ok()
        .filter(|v| !v.is_empty())
        .is_some()
}

fn selected_projects() -> Vec<String> {
    std::env::var("WEBCHECK_E2E_PROJECTS")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default()
}

#[test]
fn test_shipped_config_is_valid() {
    let root = workspace_root();
    let config = RunConfig::load(&root.join("webcheck.json5")).unwrap();
    let (warnings, errors) = config.validate(&root);
    assert!(errors.is_empty(), "{errors:?}");
    assert!(warnings.is_empty(), "{warnings:?}");

    let names: Vec<_> = config.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["chromium", "firefox", "webkit"]);

    let tests = discover(&config.test_dir_in(&root)).unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].name, "example.com has the right title");
}

#[tokio::test]
async fn test_example_title_on_real_browsers() {
    if !e2e_enabled() {
        eprintln!("Skipping: WEBCHECK_E2E not set");
        return;
    }

    let root = workspace_root();
    let mut config = RunConfig::load(&root.join("webcheck.json5")).unwrap();
    config.output_dir = std::env::temp_dir()
        .join("webcheck-e2e-results")
        .to_string_lossy()
        .into_owned();
    let tests = discover(&config.test_dir_in(&root)).unwrap();

    let options = RunnerOptions::from_config(&config, &root);
    let runner = Runner::from_config(&config, options, &selected_projects()).unwrap();
    let summary = runner.run(tests, &mut []).await;

    for result in &summary.results {
        assert_eq!(
            result.status,
            TestStatus::Passed,
            "{} failed: {:?}",
            result.full_title(),
            result.error
        );
    }
    assert!(summary.success());
}
