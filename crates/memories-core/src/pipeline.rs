use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::archive;
use crate::classify::{self, MediaKind};
use crate::engine::MetadataEngine;
use crate::fetch::{FetchError, Fetcher};
use crate::ledger::ArchiveLedger;
use crate::manifest::{Coordinates, ManifestRecord};
use crate::stamp::{self, StampOutcome};
use crate::store;
use crate::timestamp::{self, Localizer};
use crate::ProgressCallback;

/// Why a single record could not be processed. The batch always continues.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Missing {0}")]
    MissingField(&'static str),
    #[error("Unparsable date: {0}")]
    InvalidDate(String),
    #[error("Download error: {0}")]
    Download(#[from] FetchError),
    #[error("Unsupported content-type: {0:?}")]
    UnsupportedContentType(String),
    #[error("Archive yielded no media")]
    EmptyArchive,
    #[error("Could not save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub enum RecordOutcome {
    /// `saved` files landed in the output directory, `tagged` of them got
    /// metadata and `verified` of those passed the read-back check.
    Processed {
        saved: usize,
        tagged: usize,
        verified: usize,
    },
    /// Output already present from an earlier run.
    Skipped,
    Failed(RecordError),
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Files saved (archive members count individually).
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Manifest records seen.
    pub total: u64,
    /// Files that received tags.
    pub tagged: u64,
    /// Tagged files whose GPS read back successfully.
    pub verified: u64,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.total += 1;
        match outcome {
            RecordOutcome::Processed {
                saved,
                tagged,
                verified,
            } => {
                self.processed += *saved as u64;
                self.tagged += *tagged as u64;
                self.verified += *verified as u64;
            }
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Failed(_) => self.errors += 1,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Fetch-and-dispatch over manifest records, holding the run's collaborators.
pub struct Pipeline<'a> {
    fetcher: &'a dyn Fetcher,
    engine: &'a mut dyn MetadataEngine,
    localizer: &'a dyn Localizer,
    output_dir: PathBuf,
    ledger: ArchiveLedger,
}

impl<'a> Pipeline<'a> {
    /// Creates the output directory if needed and loads the archive ledger.
    pub fn new(
        fetcher: &'a dyn Fetcher,
        engine: &'a mut dyn MetadataEngine,
        localizer: &'a dyn Localizer,
        output_dir: &Path,
    ) -> anyhow::Result<Self> {
        fs::create_dir_all(output_dir)?;
        let ledger = ArchiveLedger::load(output_dir);
        Ok(Self {
            fetcher,
            engine,
            localizer,
            output_dir: output_dir.to_path_buf(),
            ledger,
        })
    }

    /// Process every record in order. Never stops early.
    pub fn run(&mut self, records: &[ManifestRecord], progress: &ProgressCallback) -> BatchSummary {
        let total = records.len() as u64;
        let mut summary = BatchSummary::default();

        for (idx, record) in records.iter().enumerate() {
            info!("[{}/{}] Processing item...", idx + 1, total);
            let outcome = self.process_record(record);
            let message = match &outcome {
                RecordOutcome::Processed { saved, .. } => format!("saved {} file(s)", saved),
                RecordOutcome::Skipped => "already present".to_string(),
                RecordOutcome::Failed(e) => {
                    error!("{}", e);
                    e.to_string()
                }
            };
            summary.record(&outcome);
            progress("record", idx as u64, total, &message);
        }

        summary
    }

    pub fn process_record(&mut self, record: &ManifestRecord) -> RecordOutcome {
        match self.try_record(record) {
            Ok(outcome) => outcome,
            Err(e) => RecordOutcome::Failed(e),
        }
    }

    fn try_record(&mut self, record: &ManifestRecord) -> Result<RecordOutcome, RecordError> {
        let raw_date =
            non_empty(record.date.as_deref()).ok_or(RecordError::MissingField("date"))?;
        let url = non_empty(record.media_download_url.as_deref())
            .ok_or(RecordError::MissingField("download URL"))?;
        let capture = timestamp::parse_manifest_date(raw_date)
            .ok_or_else(|| RecordError::InvalidDate(raw_date.to_string()))?;

        let coords = match non_empty(record.location.as_deref()) {
            None => {
                warn!("Missing location");
                None
            }
            Some(raw) => {
                let parsed = Coordinates::parse_location(raw);
                match parsed {
                    Some(c) => info!("Location: {}", c),
                    None => warn!("Location parse error: {:?}", raw),
                }
                parsed
            }
        };

        let declared = MediaKind::from_declared(record.media_type.as_deref().unwrap_or(""));
        let extension = classify::infer_extension(url, declared);
        let batch_key = timestamp::sanitized_date(&capture);
        let filename = format!("{}_{}.{}", declared, batch_key, extension);
        let dest = self.output_dir.join(&filename);

        if dest.exists() || self.ledger.contains(&filename) {
            info!("{} exists, skipping", filename);
            return Ok(RecordOutcome::Skipped);
        }

        info!("Downloading {}", filename);
        let fetched = self.fetcher.fetch(url)?;
        let content_type = fetched.content_type.to_lowercase();
        info!("Content-Type: {}", content_type);
        let stamp = self.localizer.localize(capture);

        if content_type.contains("zip") {
            info!("ZIP file detected");
            let report = archive::process_archive(
                &fetched.body,
                &stamp,
                coords,
                &self.output_dir,
                &batch_key,
                &mut *self.engine,
            );
            if report.processed() == 0 {
                return Err(RecordError::EmptyArchive);
            }
            if let Err(e) = self.ledger.record(&filename, &report.saved) {
                warn!("Could not update archive ledger: {}", e);
            }
            Ok(RecordOutcome::Processed {
                saved: report.processed(),
                tagged: report.tagged,
                verified: report.verified,
            })
        } else if content_type.contains("video") || content_type.contains("image") {
            info!("Direct media file");
            store::save_bytes(&dest, &fetched.body).map_err(|source| RecordError::Save {
                path: dest.clone(),
                source,
            })?;
            let outcome = stamp::stamp_file(&mut *self.engine, &dest, &filename, &stamp, coords);
            store::set_capture_mtime(&dest, &capture);
            Ok(RecordOutcome::Processed {
                saved: 1,
                tagged: usize::from(outcome.is_tagged()),
                verified: usize::from(matches!(&outcome, StampOutcome::Tagged(v) if v.passed())),
            })
        } else {
            Err(RecordError::UnsupportedContentType(content_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LEDGER_FILENAME;
    use crate::testing::{zip_bytes, MemoryEngine, ScriptedFetcher};
    use crate::timestamp::FixedZone;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    const VIDEO_URL: &str = "https://cdn.example/memories/clip.mp4";
    const ZIP_URL: &str = "https://cdn.example/memories/bundle?id=7";

    fn record(date: &str, kind: &str, location: Option<&str>, url: Option<&str>) -> ManifestRecord {
        ManifestRecord {
            date: Some(date.to_string()),
            media_type: Some(kind.to_string()),
            location: location.map(str::to_string),
            media_download_url: url.map(str::to_string),
        }
    }

    fn video_record() -> ManifestRecord {
        record(
            "2024-06-01 12:00:00 UTC",
            "video",
            Some("geo: 43.6532, -79.3832"),
            Some(VIDEO_URL),
        )
    }

    fn zip_record() -> ManifestRecord {
        record(
            "2024-06-02 09:30:00 UTC",
            "Image",
            Some("Latitude, Longitude: 43.6532, -79.3832"),
            Some(ZIP_URL),
        )
    }

    fn fetcher() -> ScriptedFetcher {
        ScriptedFetcher::default()
            .respond(VIDEO_URL, "video/mp4", b"mp4 body".to_vec())
            .respond(
                ZIP_URL,
                "Application/ZIP",
                zip_bytes(&[("a.jpg", "jpeg"), ("b.png", "png")]),
            )
    }

    fn run(
        fetcher: &ScriptedFetcher,
        engine: &mut MemoryEngine,
        output: &Path,
        records: &[ManifestRecord],
    ) -> BatchSummary {
        let zone = FixedZone::default();
        let mut pipeline = Pipeline::new(fetcher, engine, &zone, output).unwrap();
        pipeline.run(records, &|_, _, _, _| {})
    }

    #[test]
    fn test_single_video_end_to_end() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher();
        let mut engine = MemoryEngine::default();

        let summary = run(&fetcher, &mut engine, dir.path(), &[video_record()]);

        let dest = dir.path().join("video_20240601_120000.mp4");
        assert_eq!(std::fs::read(&dest).unwrap(), b"mp4 body");
        assert_eq!(
            engine.tag(&dest, "QuickTime:GPSCoordinates").unwrap().to_string(),
            "43.653200, 79.383200"
        );
        assert_eq!(engine.reads, vec![dest.clone()]);
        assert_eq!(
            summary,
            BatchSummary {
                processed: 1,
                skipped: 0,
                errors: 0,
                total: 1,
                tagged: 1,
                verified: 1,
            }
        );
    }

    #[test]
    fn test_archive_record() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher();
        let mut engine = MemoryEngine::default();

        let summary = run(&fetcher, &mut engine, dir.path(), &[zip_record()]);

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.tagged, 1);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.errors, 0);
        assert!(dir.path().join("a.jpg").exists());
        assert!(dir.path().join("b.png").exists());
        assert!(!dir.path().join("image_20240602_093000.jpg").exists());
        assert!(!dir.path().join("temp_20240602_093000").exists());
        assert!(dir.path().join(LEDGER_FILENAME).exists());
        assert_eq!(engine.written_names(), vec!["a.jpg".to_string()]);
    }

    #[test]
    fn test_second_run_skips_everything() {
        let dir = tempdir().unwrap();
        let records = [video_record(), zip_record()];

        let first_fetcher = fetcher();
        let first = run(&first_fetcher, &mut MemoryEngine::default(), dir.path(), &records);
        assert_eq!(first.skipped, 0);
        assert_eq!(first.processed, 3);

        let second_fetcher = fetcher();
        let second = run(&second_fetcher, &mut MemoryEngine::default(), dir.path(), &records);
        assert_eq!(second.skipped, second.total);
        assert_eq!(second.processed, 0);
        assert!(second_fetcher.requests.borrow().is_empty());
    }

    #[test]
    fn test_missing_fields_are_record_errors() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher();
        let mut engine = MemoryEngine::default();
        let records = [
            ManifestRecord {
                date: None,
                ..video_record()
            },
            record("2024-06-01 12:00:00 UTC", "video", None, None),
            record("2024-06-01 12:00:00 UTC", "video", None, Some("  ")),
            record("yesterday", "video", None, Some(VIDEO_URL)),
            video_record(),
        ];

        let summary = run(&fetcher, &mut engine, dir.path(), &records);

        assert_eq!(summary.errors, 4);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.total, 5);
        assert_eq!(fetcher.requests.borrow().len(), 1);
    }

    #[test]
    fn test_download_failure_and_unsupported_type() {
        let dir = tempdir().unwrap();
        let fetcher = fetcher().respond(
            "https://cdn.example/page",
            "text/html; charset=utf-8",
            b"<html>".to_vec(),
        );
        let mut engine = MemoryEngine::default();
        let records = [
            record("2024-06-03 10:00:00 UTC", "image", None, Some("https://cdn.example/gone.jpg")),
            record("2024-06-04 10:00:00 UTC", "image", None, Some("https://cdn.example/page")),
        ];

        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let zone = FixedZone::default();
        let mut pipeline = Pipeline::new(&fetcher, &mut engine, &zone, dir.path()).unwrap();
        let summary = pipeline.run(&records, &move |_, _, _, msg| {
            sink.lock().unwrap().push(msg.to_string());
        });
        let messages = collected.lock().unwrap().clone();

        assert_eq!(summary.errors, 2);
        assert_eq!(summary.processed, 0);
        assert!(messages[0].starts_with("Download error"));
        assert!(messages[1].contains("text/html"));
        assert!(!dir.path().join("image_20240604_100000.jpg").exists());
    }

    #[test]
    fn test_invalid_archive_is_record_error() {
        let dir = tempdir().unwrap();
        let fetcher = ScriptedFetcher::default().respond(ZIP_URL, "application/zip", b"PK?".to_vec());
        let mut engine = MemoryEngine::default();

        let summary = run(&fetcher, &mut engine, dir.path(), &[zip_record()]);

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.processed, 0);
        assert!(!dir.path().join(LEDGER_FILENAME).exists());
    }

    #[test]
    fn test_direct_file_without_gps_or_with_failed_write_is_kept() {
        let dir = tempdir().unwrap();
        let fetcher = ScriptedFetcher::default()
            .respond("https://cdn.example/a", "image/jpeg", b"jpeg".to_vec())
            .respond("https://cdn.example/b", "image/jpeg", b"jpeg".to_vec());
        let records = [
            record("2024-06-05 10:00:00 UTC", "image", Some("somewhere"), Some("https://cdn.example/a")),
            record("2024-06-06 10:00:00 UTC", "image", Some("geo: 1.5, 2.5"), Some("https://cdn.example/b")),
        ];
        let mut engine = MemoryEngine::failing_writes();

        let summary = run(&fetcher, &mut engine, dir.path(), &records);

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.tagged, 0);
        assert_eq!(summary.errors, 0);
        assert!(dir.path().join("image_20240605_100000.jpg").exists());
        assert!(dir.path().join("image_20240606_100000.jpg").exists());
    }

    #[test]
    fn test_corrupt_ledger_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(LEDGER_FILENAME), b"{").unwrap();
        let fetcher = fetcher();
        let mut engine = MemoryEngine::default();

        let summary = run(&fetcher, &mut engine, dir.path(), &[zip_record()]);

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.errors, 0);
        let ledger = ArchiveLedger::load(dir.path());
        assert!(ledger.contains("image_20240602_093000.jpg"));
    }

    #[test]
    fn test_summary_fold() {
        let mut summary = BatchSummary::default();
        summary.record(&RecordOutcome::Processed {
            saved: 3,
            tagged: 2,
            verified: 1,
        });
        summary.record(&RecordOutcome::Skipped);
        summary.record(&RecordOutcome::Failed(RecordError::EmptyArchive));
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.tagged, 2);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.total, 3);
    }
}
