//! Scenario files: discovery and parsing.
//!
//! A scenario file lives under the test directory and is named
//! `*.spec.json5`, `*.spec.json`, `*.spec.yaml` or `*.spec.yml`:
//!
//! ```json5
//! {
//!   tests: [
//!     {
//!       name: "example.com has the right title",
//!       steps: [
//!         { goto: "https://example.com/" },
//!         { expect_title: "Example Domain" },
//!       ],
//!     },
//!   ],
//! }
//! ```

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use webcheck_core::error::{Result, WebcheckError};

const SPEC_EXTENSIONS: &[&str] = &["json5", "json", "yaml", "yml"];

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    tests: Vec<RawTest>,
}

#[derive(Debug, Deserialize)]
struct RawTest {
    name: String,
    #[serde(default)]
    skip: bool,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawStep {
    Goto(String),
    ExpectTitle(String),
    ExpectUrl(String),
}

/// One compiled step of a test.
#[derive(Debug, Clone)]
pub enum Step {
    Goto(String),
    ExpectTitle(Regex),
    ExpectUrl(Regex),
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::ExpectTitle(_) => "expect_title",
            Self::ExpectUrl(_) => "expect_url",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Goto(url) => url.clone(),
            Self::ExpectTitle(re) | Self::ExpectUrl(re) => format!("/{}/", re.as_str()),
        }
    }
}

/// A test declared in a scenario file.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Path relative to the test directory, e.g. `example.spec.json5`.
    pub file: String,
    pub name: String,
    pub skip: bool,
    pub steps: Vec<Step>,
}

impl TestCase {
    /// `file › name`, the string `--grep` matches against.
    pub fn title_path(&self) -> String {
        format!("{} › {}", self.file, self.name)
    }
}

fn is_spec_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    SPEC_EXTENSIONS
        .iter()
        .any(|ext| name.ends_with(&format!(".spec.{ext}")))
}

/// Find and parse every scenario file under `test_dir`, sorted by path.
pub fn discover(test_dir: &Path) -> Result<Vec<TestCase>> {
    if !test_dir.is_dir() {
        return Err(WebcheckError::Scenario(format!(
            "Test directory not found: {}",
            test_dir.display()
        )));
    }

    let pattern = format!("{}/**/*.spec.*", test_dir.display());
    let mut files: Vec<_> = glob::glob(&pattern)
        .map_err(|e| WebcheckError::Scenario(format!("Invalid glob pattern: {e}")))?
        .flatten()
        .filter(|p| p.is_file() && is_spec_file(p))
        .collect();
    files.sort();

    let mut tests = Vec::new();
    for path in files {
        let relative = path
            .strip_prefix(test_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let raw = std::fs::read_to_string(&path)?;
        let parsed = parse(&relative, &raw)?;
        debug!(file = %relative, tests = parsed.len(), "Loaded scenario file");
        tests.extend(parsed);
    }
    Ok(tests)
}

/// Parse one scenario file. The format follows the file extension.
pub fn parse(file: &str, raw: &str) -> Result<Vec<TestCase>> {
    let scenario: ScenarioFile = if file.ends_with(".yaml") || file.ends_with(".yml") {
        // Steps are written as `- goto: url` maps rather than `!goto` tags.
        serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(raw))
            .map_err(|e| WebcheckError::Scenario(format!("{file}: {e}")))?
    } else {
        json5::from_str(raw).map_err(|e| WebcheckError::Scenario(format!("{file}: {e}")))?
    };

    scenario
        .tests
        .into_iter()
        .map(|test| {
            let steps = test
                .steps
                .into_iter()
                .map(|step| compile_step(file, &test.name, step))
                .collect::<Result<Vec<_>>>()?;
            Ok(TestCase {
                file: file.to_string(),
                name: test.name,
                skip: test.skip,
                steps,
            })
        })
        .collect()
}

fn compile_step(file: &str, test: &str, step: RawStep) -> Result<Step> {
    let compile = |pattern: &str| {
        Regex::new(pattern).map_err(|e| {
            WebcheckError::Scenario(format!("{file} › {test}: invalid pattern /{pattern}/: {e}"))
        })
    };
    Ok(match step {
        RawStep::Goto(url) => Step::Goto(url),
        RawStep::ExpectTitle(p) => Step::ExpectTitle(compile(&p)?),
        RawStep::ExpectUrl(p) => Step::ExpectUrl(compile(&p)?),
    })
}

/// Keep tests whose `file › name` matches `grep`.
pub fn filter(tests: Vec<TestCase>, grep: Option<&Regex>) -> Vec<TestCase> {
    match grep {
        Some(re) => tests
            .into_iter()
            .filter(|t| re.is_match(&t.title_path()))
            .collect(),
        None => tests,
    }
}

/// Resolve a navigation target against an optional base URL.
pub fn resolve_url(base: Option<&str>, target: &str) -> Result<String> {
    match Url::parse(target) {
        Ok(url) => Ok(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base.ok_or_else(|| {
                WebcheckError::Navigation(format!(
                    "Cannot navigate to relative URL '{target}' without a base_url"
                ))
            })?;
            let base = Url::parse(base)
                .map_err(|e| WebcheckError::Config(format!("Invalid base_url '{base}': {e}")))?;
            base.join(target)
                .map(|u| u.to_string())
                .map_err(|e| WebcheckError::Navigation(format!("{target}: {e}")))
        }
        Err(e) => Err(WebcheckError::Navigation(format!("{target}: {e}"))),
    }
}
