//! Run configuration loading and validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::devices::DevicePreset;
use crate::error::{Result, WebcheckError};
use crate::types::BrowserEngine;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "webcheck.json5";

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory scanned for scenario files.
    #[serde(default = "default_test_dir")]
    pub test_dir: String,

    /// Per-test timeout in ms (default: 30000).
    #[serde(default = "default_test_timeout")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub expect: ExpectConfig,

    /// Schedule every test independently instead of file by file.
    #[serde(default)]
    pub fully_parallel: bool,

    /// Maximum concurrent workers (default: half the CPUs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Retries for a failing test (default: 0).
    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_reporters")]
    pub reporter: Vec<ReporterConfig>,

    #[serde(rename = "use", default)]
    pub use_options: UseOptions,

    #[serde(default = "default_projects")]
    pub projects: Vec<ProjectConfig>,

    /// Directory for traces and other per-test artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

fn default_test_dir() -> String {
    "./tests".into()
}

fn default_test_timeout() -> u64 {
    30_000
}

fn default_reporters() -> Vec<ReporterConfig> {
    vec![ReporterConfig::List]
}

fn default_projects() -> Vec<ProjectConfig> {
    vec![ProjectConfig {
        name: "chromium".into(),
        engine: BrowserEngine::Chromium,
        device: "Desktop Chrome".into(),
        webdriver_url: None,
        executable_path: None,
    }]
}

fn default_output_dir() -> String {
    "test-results".into()
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_dir: default_test_dir(),
            timeout_ms: default_test_timeout(),
            expect: ExpectConfig::default(),
            fully_parallel: false,
            workers: None,
            retries: 0,
            reporter: default_reporters(),
            use_options: UseOptions::default(),
            projects: default_projects(),
            output_dir: default_output_dir(),
            logging: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectConfig {
    /// Per-assertion timeout in ms (default: 5000).
    #[serde(default = "default_expect_timeout")]
    pub timeout_ms: u64,
}

fn default_expect_timeout() -> u64 {
    5_000
}

impl Default for ExpectConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_expect_timeout(),
        }
    }
}

/// A reporter entry. Several may be active at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReporterConfig {
    List,
    Json {
        #[serde(default = "default_json_output")]
        output_file: String,
    },
    Html {
        #[serde(default = "default_html_folder")]
        output_folder: String,
        #[serde(default)]
        open: HtmlOpenPolicy,
    },
}

fn default_json_output() -> String {
    "webcheck-report.json".into()
}

fn default_html_folder() -> String {
    "webcheck-report".into()
}

/// When the HTML report is opened in the system browser after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HtmlOpenPolicy {
    Always,
    Never,
    #[default]
    OnFailure,
}

impl HtmlOpenPolicy {
    pub fn should_open(&self, run_failed: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::OnFailure => run_failed,
        }
    }
}

/// When execution traces are recorded and kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TracePolicy {
    #[default]
    Off,
    On,
    RetainOnFailure,
    OnFirstRetry,
    OnAllRetries,
}

impl TracePolicy {
    /// Whether an attempt with the given retry index records a trace.
    pub fn should_record(&self, retry: u32) -> bool {
        match self {
            Self::Off => false,
            Self::On | Self::RetainOnFailure => true,
            Self::OnFirstRetry => retry == 1,
            Self::OnAllRetries => retry > 0,
        }
    }

    /// Whether a recorded trace is written out once the attempt settles.
    pub fn should_retain(&self, retry: u32, passed: bool) -> bool {
        match self {
            Self::RetainOnFailure => !passed,
            other => other.should_record(retry),
        }
    }
}

/// Options applied to every browser context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseOptions {
    #[serde(default)]
    pub trace: TracePolicy,

    /// Base URL that relative navigation targets resolve against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for UseOptions {
    fn default() -> Self {
        Self {
            trace: TracePolicy::default(),
            base_url: None,
            headless: true,
        }
    }
}

/// A browser project: an engine paired with a device preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub engine: BrowserEngine,
    /// Device preset name, e.g. "Desktop Firefox".
    pub device: String,

    /// WebDriver endpoint. Forces the WebDriver backend when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webdriver_url: Option<String>,

    /// Browser binary (auto-detected if omitted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,
}

impl ProjectConfig {
    pub fn device_preset(&self) -> Option<&'static DevicePreset> {
        DevicePreset::lookup(&self.device)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "webcheck_runner=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

static ENV_VAR_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_RE
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

impl RunConfig {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse config text (JSON5).
    pub fn parse(raw: &str) -> Result<Self> {
        let substituted = substitute_env_vars(raw);
        json5::from_str(&substituted).map_err(|e| WebcheckError::Config(e.to_string()))
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn expect_timeout(&self) -> Duration {
        Duration::from_millis(self.expect.timeout_ms)
    }

    /// Effective worker count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() / 2)
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Scenario directory, relative paths resolved against `base`.
    pub fn test_dir_in(&self, base: &Path) -> PathBuf {
        resolve_path(base, &self.test_dir)
    }

    /// Artifact directory, relative paths resolved against `base`.
    pub fn output_dir_in(&self, base: &Path) -> PathBuf {
        resolve_path(base, &self.output_dir)
    }

    /// Find a project by name.
    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Projects named in `only`, in config order; all of them when `only` is empty.
    pub fn select_projects(&self, only: &[String]) -> Result<Vec<&ProjectConfig>> {
        if let Some(unknown) = only.iter().find(|name| self.project(name).is_none()) {
            return Err(WebcheckError::Config(format!("Project '{unknown}' not found")));
        }
        Ok(self
            .projects
            .iter()
            .filter(|p| only.is_empty() || only.contains(&p.name))
            .collect())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self, base: &Path) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.timeout_ms == 0 {
            errors.push("Test timeout cannot be 0".to_string());
        }
        if self.expect.timeout_ms == 0 {
            errors.push("Expect timeout cannot be 0".to_string());
        }
        if self.workers == Some(0) {
            errors.push("Workers cannot be 0".to_string());
        }
        if self.projects.is_empty() {
            errors.push("At least one project must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for project in &self.projects {
            if !seen.insert(project.name.as_str()) {
                errors.push(format!("Duplicate project name: {}", project.name));
            }
            match project.device_preset() {
                None => errors.push(format!(
                    "Project '{}' uses unknown device '{}'",
                    project.name, project.device
                )),
                Some(preset) if preset.default_engine != project.engine => warnings.push(format!(
                    "Project '{}' runs {} with device '{}' made for {}",
                    project.name, project.engine, project.device, preset.default_engine
                )),
                Some(_) => {}
            }
        }

        let test_dir = self.test_dir_in(base);
        if !test_dir.is_dir() {
            warnings.push(format!("Test directory not found: {}", test_dir.display()));
        }

        (warnings, errors)
    }
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
