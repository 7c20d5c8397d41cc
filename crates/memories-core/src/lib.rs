pub mod archive;
pub mod classify;
pub mod engine;
pub mod fetch;
pub mod ledger;
pub mod manifest;
pub mod pipeline;
pub mod stamp;
pub mod store;
pub mod tags;
pub mod timestamp;
pub mod verify;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use pipeline::{BatchSummary, Pipeline, RecordError, RecordOutcome};

use engine::ExifTool;
use fetch::{HttpFetcher, RetryPolicy};
use manifest::Manifest;
use timestamp::FixedZone;

fn default_manifest() -> PathBuf {
    PathBuf::from("memories_history.json")
}

fn default_output() -> PathBuf {
    PathBuf::from("downloaded_media")
}

fn default_timezone() -> String {
    timestamp::DEFAULT_TIMEZONE.to_string()
}

fn default_timeout_secs() -> u64 {
    fetch::DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    fetch::DEFAULT_USER_AGENT.to_string()
}

fn default_exiftool() -> PathBuf {
    PathBuf::from("exiftool")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// IANA zone used for local capture times and offsets.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// exiftool program, looked up on PATH unless absolute.
    #[serde(default = "default_exiftool")]
    pub exiftool: PathBuf,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            output: default_output(),
            timezone: default_timezone(),
            retry: RetryPolicy::default(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            exiftool: default_exiftool(),
        }
    }
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Download every record in the manifest into `options.output`, stamping
/// capture time and location into each saved file.
///
/// Fails only when the run cannot start: unreadable manifest, unknown zone,
/// or no working exiftool. Per-record problems are counted in the summary.
pub fn process(
    options: &ProcessOptions,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<BatchSummary> {
    let manifest = Manifest::load(&options.manifest)?;
    if manifest.saved_media.is_empty() {
        warn!("No 'Saved Media' found in {}", options.manifest.display());
        return Ok(BatchSummary::default());
    }
    info!("Found {} items to process", manifest.saved_media.len());

    let zone = FixedZone::new(&options.timezone)?;
    info!("Localizing capture times to {}", zone.name());
    let fetcher = HttpFetcher::new(
        &options.user_agent,
        Duration::from_secs(options.timeout_secs),
        options.retry,
    )?;

    let mut exiftool = ExifTool::spawn(&options.exiftool).with_context(|| {
        format!(
            "ExifTool is required but could not be started ({})",
            options.exiftool.display()
        )
    })?;
    info!("ExifTool initialized");

    let summary = {
        let mut pipeline = Pipeline::new(&fetcher, &mut exiftool, &zone, &options.output)?;
        pipeline.run(&manifest.saved_media, progress_callback)
    };

    if let Err(e) = exiftool.close() {
        warn!("ExifTool did not shut down cleanly: {}", e);
    }
    info!("ExifTool closed");

    Ok(summary)
}
