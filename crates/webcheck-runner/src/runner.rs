//! Parallel test scheduler.
//!
//! Every test runs once per selected project. Jobs are grouped into units of
//! work: with `fully_parallel` each job is its own unit, otherwise all tests
//! of one file in one project share a unit and run in declaration order.
//! Units are spread over a worker pool bounded by a semaphore; no state is
//! shared between attempts beyond the driver that launches fresh sessions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use webcheck_browser::{BrowserDriver, PageSession, driver_for};
use webcheck_core::config::{RunConfig, TracePolicy};
use webcheck_core::error::Result;
use webcheck_core::types::{RunSummary, TestResult, TestStatus};

use crate::expect;
use crate::reporter::Reporter;
use crate::scenario::{Step, TestCase, resolve_url};
use crate::trace::{TraceRecorder, artifact_dir};

/// Upper bound on tearing down a session after an attempt.
const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved execution settings.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub test_timeout: Duration,
    pub expect_timeout: Duration,
    pub retries: u32,
    pub workers: usize,
    pub fully_parallel: bool,
    pub trace: TracePolicy,
    pub base_url: Option<String>,
    pub output_dir: PathBuf,
}

impl RunnerOptions {
    pub fn from_config(config: &RunConfig, base: &Path) -> Self {
        Self {
            test_timeout: config.test_timeout(),
            expect_timeout: config.expect_timeout(),
            retries: config.retries,
            workers: config.worker_count(),
            fully_parallel: config.fully_parallel,
            trace: config.use_options.trace,
            base_url: config.use_options.base_url.clone(),
            output_dir: config.output_dir_in(base),
        }
    }
}

/// A project name with the driver that launches its sessions.
#[derive(Clone)]
pub struct ProjectDriver {
    pub name: String,
    pub driver: Arc<dyn BrowserDriver>,
}

struct Job {
    index: usize,
    test: Arc<TestCase>,
    project: String,
    driver: Arc<dyn BrowserDriver>,
}

pub struct Runner {
    options: Arc<RunnerOptions>,
    projects: Vec<ProjectDriver>,
}

impl Runner {
    pub fn new(options: RunnerOptions, projects: Vec<ProjectDriver>) -> Self {
        Self {
            options: Arc::new(options),
            projects,
        }
    }

    /// Build drivers for the configured projects, optionally restricted to `only`.
    pub fn from_config(config: &RunConfig, options: RunnerOptions, only: &[String]) -> Result<Self> {
        let projects = config
            .select_projects(only)?
            .into_iter()
            .map(|p| {
                let driver = driver_for(p, &config.use_options, options.test_timeout)?;
                debug!(project = %p.name, backend = driver.backend(), "Project driver ready");
                Ok(ProjectDriver {
                    name: p.name.clone(),
                    driver,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(options, projects))
    }

    pub fn project_names(&self) -> Vec<&str> {
        self.projects.iter().map(|p| p.name.as_str()).collect()
    }

    fn units(&self, tests: &[Arc<TestCase>]) -> Vec<Vec<Job>> {
        let mut units = Vec::new();
        let mut index = 0;
        for project in &self.projects {
            let mut by_file: BTreeMap<&str, Vec<Job>> = BTreeMap::new();
            for test in tests {
                let job = Job {
                    index,
                    test: test.clone(),
                    project: project.name.clone(),
                    driver: project.driver.clone(),
                };
                index += 1;
                if self.options.fully_parallel {
                    units.push(vec![job]);
                } else {
                    by_file.entry(test.file.as_str()).or_default().push(job);
                }
            }
            units.extend(by_file.into_values());
        }
        units
    }

    /// Run every test in every project and report as results arrive.
    pub async fn run(&self, tests: Vec<TestCase>, reporters: &mut [Box<dyn Reporter>]) -> RunSummary {
        let started_at = Utc::now();
        let started = Instant::now();
        let tests: Vec<Arc<TestCase>> = tests.into_iter().map(Arc::new).collect();
        let units = self.units(&tests);
        let total: usize = units.iter().map(Vec::len).sum();
        let workers = self.options.workers.max(1).min(units.len().max(1));

        info!(tests = total, workers, projects = self.projects.len(), "Starting run");
        for reporter in reporters.iter_mut() {
            reporter.on_begin(total, workers);
        }

        // Placeholders for jobs whose worker dies before reporting.
        let mut unreported: BTreeMap<usize, TestResult> = units
            .iter()
            .flatten()
            .map(|job| (job.index, pending_result(job)))
            .collect();

        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, TestResult)>();
        let mut set = JoinSet::new();

        for unit in units {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let options = self.options.clone();
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                for job in unit {
                    let result = run_job(&job, &options).await;
                    if tx.send((job.index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some((index, result)) = rx.recv().await {
            for reporter in reporters.iter_mut() {
                reporter.on_test_end(&result);
            }
            unreported.remove(&index);
            results.push((index, result));
        }
        let mut worker_error = None;
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(%e, "Worker task failed");
                worker_error = Some(e.to_string());
            }
        }
        for (index, mut result) in unreported {
            result.status = TestStatus::Failed;
            result.error = Some(format!(
                "worker panicked: {}",
                worker_error.as_deref().unwrap_or("exited before reporting")
            ));
            for reporter in reporters.iter_mut() {
                reporter.on_test_end(&result);
            }
            results.push((index, result));
        }

        results.sort_by_key(|(index, _)| *index);
        let summary = RunSummary {
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            results: results.into_iter().map(|(_, r)| r).collect(),
        };

        info!(
            passed = summary.passed(),
            failed = summary.failed(),
            flaky = summary.flaky(),
            skipped = summary.skipped(),
            duration_ms = summary.duration_ms,
            "Run finished"
        );
        for reporter in reporters.iter_mut() {
            if let Err(e) = reporter.on_end(&summary) {
                warn!(%e, "Reporter failed");
            }
        }
        summary
    }
}

struct Attempt {
    error: Option<String>,
    trace_path: Option<PathBuf>,
    screenshot: Option<String>,
}

/// A not-yet-run result for `job`, initially `Skipped`.
fn pending_result(job: &Job) -> TestResult {
    TestResult {
        title: job.test.name.clone(),
        file: job.test.file.clone(),
        project: job.project.clone(),
        status: TestStatus::Skipped,
        duration_ms: 0,
        retry: 0,
        error: None,
        trace_path: None,
        screenshot: None,
    }
}

async fn run_job(job: &Job, options: &RunnerOptions) -> TestResult {
    let started = Instant::now();
    let mut result = pending_result(job);
    if job.test.skip {
        return result;
    }

    result.status = TestStatus::Failed;
    for retry in 0..=options.retries {
        result.retry = retry;
        let attempt = run_attempt(job, options, retry).await;
        if attempt.trace_path.is_some() {
            result.trace_path = attempt.trace_path;
        }
        match attempt.error {
            None => {
                result.status = if retry > 0 {
                    TestStatus::Flaky
                } else {
                    TestStatus::Passed
                };
                result.screenshot = None;
                break;
            }
            Some(e) => {
                warn!(test = %job.test.name, project = %job.project, retry, error = %e, "Attempt failed");
                result.error = Some(e);
                result.screenshot = attempt.screenshot;
            }
        }
    }
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

async fn run_attempt(job: &Job, options: &RunnerOptions, retry: u32) -> Attempt {
    let title_path = job.test.title_path();
    let mut trace = TraceRecorder::new(
        options.trace.should_record(retry),
        &title_path,
        &job.project,
        retry,
    );
    let deadline = Instant::now() + options.test_timeout;

    let launch_started = Instant::now();
    let session = match tokio::time::timeout(options.test_timeout, job.driver.launch()).await {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            let msg = e.to_string();
            trace.record("launch", job.driver.backend(), launch_started.elapsed(), Some(msg.clone()));
            return finish(job, options, retry, trace, Some(msg), None).await;
        }
        Err(_) => {
            let msg = timeout_message(options.test_timeout);
            trace.record("launch", job.driver.backend(), launch_started.elapsed(), Some(msg.clone()));
            return finish(job, options, retry, trace, Some(msg), None).await;
        }
    };
    trace.record("launch", job.driver.backend(), launch_started.elapsed(), None);

    let remaining = deadline.saturating_duration_since(Instant::now());
    let outcome = tokio::time::timeout(
        remaining,
        run_steps(session.as_ref(), &job.test.steps, options, &mut trace),
    )
    .await;
    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(timeout_message(options.test_timeout)),
    };

    let mut screenshot = None;
    if error.is_some() && trace.is_enabled() {
        match tokio::time::timeout(options.expect_timeout, session.screenshot()).await {
            Ok(Ok(png)) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(png);
                trace.attach_screenshot(encoded.clone());
                screenshot = Some(encoded);
            }
            Ok(Err(e)) => debug!(%e, "Failure screenshot unavailable"),
            Err(_) => debug!("Failure screenshot timed out"),
        }
    }

    match tokio::time::timeout(SESSION_CLOSE_TIMEOUT, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%e, project = %job.project, "Session close failed"),
        Err(_) => warn!(project = %job.project, "Session close timed out"),
    }

    finish(job, options, retry, trace, error, screenshot).await
}

async fn finish(
    job: &Job,
    options: &RunnerOptions,
    retry: u32,
    trace: TraceRecorder,
    error: Option<String>,
    screenshot: Option<String>,
) -> Attempt {
    let mut trace_path = None;
    if trace.is_enabled() && options.trace.should_retain(retry, error.is_none()) {
        let dir = artifact_dir(&options.output_dir, &job.test.title_path(), &job.project, retry);
        match trace.save(&dir).await {
            Ok(path) => {
                debug!(path = %path.display(), "Trace saved");
                trace_path = Some(path);
            }
            Err(e) => warn!(%e, dir = %dir.display(), "Failed to save trace"),
        }
    }
    Attempt {
        error,
        trace_path,
        screenshot,
    }
}

async fn run_steps(
    page: &dyn PageSession,
    steps: &[Step],
    options: &RunnerOptions,
    trace: &mut TraceRecorder,
) -> Result<()> {
    for step in steps {
        let started = Instant::now();
        let result = match step {
            Step::Goto(target) => match resolve_url(options.base_url.as_deref(), target) {
                Ok(url) => page.goto(&url).await,
                Err(e) => Err(e),
            },
            Step::ExpectTitle(pattern) => {
                expect::expect_title(page, pattern, options.expect_timeout).await
            }
            Step::ExpectUrl(pattern) => expect::expect_url(page, pattern, options.expect_timeout).await,
        };
        trace.record(
            step.action(),
            &step.detail(),
            started.elapsed(),
            result.as_ref().err().map(ToString::to_string),
        );
        result?;
    }
    Ok(())
}

fn timeout_message(timeout: Duration) -> String {
    format!("Test timeout of {}ms exceeded.", timeout.as_millis())
}
