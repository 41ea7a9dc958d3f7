use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use regex::Regex;

use webcheck_core::config::{DEFAULT_CONFIG_FILE, LoggingConfig, RunConfig};
use webcheck_runner::scenario::{self, TestCase};
use webcheck_runner::{Runner, RunnerOptions, build_reporters};

#[derive(Parser)]
#[command(
    name = "webcheck",
    about = "End-to-end browser checks across chromium, firefox and webkit",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tests
    Test {
        /// Only run these projects (repeatable)
        #[arg(long)]
        project: Vec<String>,

        /// Only run tests whose "file › name" matches this regex
        #[arg(short, long)]
        grep: Option<String>,

        /// Override the worker count
        #[arg(short, long)]
        workers: Option<usize>,

        /// Override the retry count
        #[arg(long)]
        retries: Option<u32>,

        /// Show the browser windows
        #[arg(long)]
        headed: bool,
    },

    /// List tests without running them
    List {
        #[arg(long)]
        project: Vec<String>,

        #[arg(short, long)]
        grep: Option<String>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn init_logging(verbose: bool, logging: Option<&LoggingConfig>) {
    let level = if verbose {
        "debug"
    } else {
        logging.and_then(|l| l.level.as_deref()).unwrap_or("warn")
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = tracing_subscriber::EnvFilter::new(level);
        for directive in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring log filter '{directive}': {e}"),
            }
        }
        filter
    });

    let json = logging.is_some_and(|l| l.format == "json");
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Directory that relative paths in the config resolve against.
fn base_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn load_tests(config: &RunConfig, base: &Path, grep: Option<&str>) -> anyhow::Result<Vec<TestCase>> {
    let grep = grep
        .map(Regex::new)
        .transpose()
        .context("Invalid --grep pattern")?;
    let tests = scenario::discover(&config.test_dir_in(base))?;
    Ok(scenario::filter(tests, grep.as_ref()))
}

fn check_config(config: &RunConfig, base: &Path) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate(base);
    for w in &warnings {
        tracing::warn!("{w}");
    }
    if !errors.is_empty() {
        anyhow::bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(())
}

/// Output of `webcheck list`: one line per test and project, then a total.
fn list_lines(config: &RunConfig, tests: &[TestCase], only: &[String]) -> anyhow::Result<Vec<String>> {
    let projects = config.select_projects(only)?;
    let mut lines = vec!["Listing tests:".to_string()];
    for project in &projects {
        for test in tests {
            lines.push(format!("  [{}] › {}", project.name, test.title_path()));
        }
    }
    let mut files: Vec<&str> = tests.iter().map(|t| t.file.as_str()).collect();
    files.dedup();
    lines.push(format!(
        "Total: {} tests in {} files",
        tests.len() * projects.len(),
        files.len()
    ));
    Ok(lines)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RunConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    init_logging(cli.verbose, config.logging.as_ref());
    let base = base_dir(&cli.config);

    match cli.command {
        Commands::Test {
            project,
            grep,
            workers,
            retries,
            headed,
        } => {
            if workers.is_some() {
                config.workers = workers;
            }
            if let Some(retries) = retries {
                config.retries = retries;
            }
            if headed {
                config.use_options.headless = false;
            }
            check_config(&config, &base)?;

            let tests = load_tests(&config, &base, grep.as_deref())?;
            if tests.is_empty() {
                anyhow::bail!("No tests found in {}", config.test_dir_in(&base).display());
            }

            let options = RunnerOptions::from_config(&config, &base);
            let runner = Runner::from_config(&config, options, &project)?;
            let mut reporters = build_reporters(&config, &base);
            let summary = runner.run(tests, &mut reporters).await;

            if !summary.success() {
                std::process::exit(1);
            }
        }
        Commands::List { project, grep } => {
            check_config(&config, &base)?;
            let tests = load_tests(&config, &base, grep.as_deref())?;
            for line in list_lines(&config, &tests, &project)? {
                println!("{line}");
            }
        }
        Commands::ShowConfig => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dir() {
        assert_eq!(base_dir(Path::new("webcheck.json5")), PathBuf::from("."));
        assert_eq!(
            base_dir(Path::new("/repo/qa/webcheck.json5")),
            PathBuf::from("/repo/qa")
        );
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::parse_from([
            "webcheck", "test", "--project", "firefox", "--project", "webkit", "-g", "title",
            "--retries", "2", "--headed",
        ]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        match cli.command {
            Commands::Test {
                project,
                grep,
                retries,
                headed,
                workers,
            } => {
                assert_eq!(project, vec!["firefox", "webkit"]);
                assert_eq!(grep.as_deref(), Some("title"));
                assert_eq!(retries, Some(2));
                assert!(headed);
                assert!(workers.is_none());
            }
            _ => panic!("expected test command"),
        }
    }

    #[test]
    fn test_list_lines() {
        let config = RunConfig::parse(
            r#"{ projects: [
                { name: "firefox", engine: "firefox", device: "Desktop Firefox" },
                { name: "webkit", engine: "webkit", device: "Desktop Safari" },
            ] }"#,
        )
        .unwrap();
        let tests = scenario::parse(
            "example.spec.json5",
            r#"{ tests: [{ name: "title", steps: [{ goto: "https://example.com/" }] }] }"#,
        )
        .unwrap();

        let lines = list_lines(&config, &tests, &["webkit".to_string()]).unwrap();
        assert_eq!(
            lines,
            vec![
                "Listing tests:",
                "  [webkit] › example.spec.json5 › title",
                "Total: 1 tests in 1 files",
            ]
        );
        assert_eq!(list_lines(&config, &tests, &[]).unwrap().len(), 4);
    }

    #[test]
    fn test_list_unknown_project_errors() {
        let config = RunConfig::default();
        let err = list_lines(&config, &[], &["typo".to_string()]).unwrap_err();
        assert!(err.to_string().contains("typo"), "{err}");
    }

    #[test]
    fn test_load_tests_rejects_bad_grep() {
        let config = RunConfig::default();
        assert!(load_tests(&config, Path::new("."), Some("(")).is_err());
    }
}
