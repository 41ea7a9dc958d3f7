//! Execution traces for a single test attempt.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use webcheck_core::error::Result;

/// One recorded action.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub at: DateTime<Utc>,
    pub action: String,
    pub detail: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Collects actions for one attempt. A disabled recorder drops everything.
#[derive(Debug, Serialize)]
pub struct TraceRecorder {
    #[serde(skip)]
    enabled: bool,
    pub title: String,
    pub project: String,
    pub retry: u32,
    pub started_at: DateTime<Utc>,
    pub events: Vec<TraceEvent>,
    /// Base64 PNG taken when the attempt failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl TraceRecorder {
    pub fn new(enabled: bool, title: &str, project: &str, retry: u32) -> Self {
        Self {
            enabled,
            title: title.to_string(),
            project: project.to_string(),
            retry,
            started_at: Utc::now(),
            events: Vec::new(),
            screenshot: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, action: &str, detail: &str, elapsed: Duration, error: Option<String>) {
        if !self.enabled {
            return;
        }
        self.events.push(TraceEvent {
            at: Utc::now(),
            action: action.to_string(),
            detail: detail.to_string(),
            duration_ms: elapsed.as_millis() as u64,
            error,
        });
    }

    pub fn attach_screenshot(&mut self, png_base64: String) {
        if self.enabled {
            self.screenshot = Some(png_base64);
        }
    }

    /// Write `trace.json` into `dir`, returning its path.
    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join("trace.json");
        tokio::fs::write(&path, serde_json::to_vec_pretty(self)?).await?;
        Ok(path)
    }
}

/// `<output_dir>/<slug>-<hash>-<project>[-retryN]`. The hash keeps titles
/// that slug alike apart.
pub fn artifact_dir(output_dir: &Path, title_path: &str, project: &str, retry: u32) -> PathBuf {
    let mut name = format!(
        "{}-{}-{}",
        slug(title_path),
        short_hash(title_path),
        slug(project)
    );
    if retry > 0 {
        name.push_str(&format!("-retry{retry}"));
    }
    output_dir.join(name)
}

fn short_hash(input: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..5].to_string()
}

fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
