use std::fs;
use std::io::Cursor;
use std::path::Path;

use encoding_rs::SHIFT_JIS;
use thiserror::Error;
use tracing::{error, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::classify;
use crate::engine::MetadataEngine;
use crate::manifest::Coordinates;
use crate::stamp::{self, StampOutcome};
use crate::store;
use crate::timestamp::LocalTimestamp;

#[derive(Debug, Error)]
enum ArchiveError {
    #[error("invalid archive: {0}")]
    Open(#[source] ZipError),
    #[error("archive entry error: {0}")]
    Entry(#[from] ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Files an archive produced in the destination directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveReport {
    /// Base names of the relocated members, in archive order.
    pub saved: Vec<String>,
    /// How many of them received tags.
    pub tagged: usize,
    /// How many tagged members passed verification.
    pub verified: usize,
}

impl ArchiveReport {
    /// Members that were extracted and saved, tagged or not.
    pub fn processed(&self) -> usize {
        self.saved.len()
    }
}

/// Decode ZIP entry name, trying UTF-8 first, then Shift_JIS
fn decode_entry_name(raw: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(raw) {
        return s.to_string();
    }
    let (decoded, _, had_errors) = SHIFT_JIS.decode(raw);
    if !had_errors {
        return decoded.into_owned();
    }
    String::from_utf8_lossy(raw).into_owned()
}

/// Last path component of an entry name; archive folders are flattened.
fn base_name(entry_name: &str) -> Option<&str> {
    entry_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
}

/// Extract every supported member of a ZIP body into `dest_dir`, tagging each
/// one on the way through a scratch directory named after `batch_key`.
///
/// A broken archive, or any error part-way through, yields an empty report;
/// members already moved into `dest_dir` stay there.
pub fn process_archive(
    bytes: &[u8],
    stamp: &LocalTimestamp,
    coords: Option<Coordinates>,
    dest_dir: &Path,
    batch_key: &str,
    engine: &mut dyn MetadataEngine,
) -> ArchiveReport {
    let scratch = dest_dir.join(format!("temp_{}", batch_key));
    let result = extract_all(bytes, stamp, coords, dest_dir, &scratch, engine);
    match result {
        Ok(report) => report,
        Err(e) => {
            match &e {
                ArchiveError::Open(_) => error!("Invalid ZIP file: {}", e),
                _ => error!("ZIP processing error: {}", e),
            }
            let _ = store::remove_dir_if_empty(&scratch);
            ArchiveReport::default()
        }
    }
}

fn extract_all(
    bytes: &[u8],
    stamp: &LocalTimestamp,
    coords: Option<Coordinates>,
    dest_dir: &Path,
    scratch: &Path,
    engine: &mut dyn MetadataEngine,
) -> Result<ArchiveReport, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(ArchiveError::Open)?;
    info!("ZIP contains {} entries", archive.len());

    let mut report = ArchiveReport::default();
    for i in 0..archive.len() {
        let extracted = {
            let mut entry = archive.by_index(i)?;
            let entry_name = decode_entry_name(entry.name_raw());
            if entry.is_dir() || entry_name.ends_with('/') {
                continue;
            }
            let Some(file_name) = base_name(&entry_name).map(str::to_string) else {
                warn!("Skipping entry without a file name: {}", entry_name);
                continue;
            };
            if !classify::is_supported_file(&file_name) {
                info!("Skipping unsupported: {}", entry_name);
                continue;
            }

            fs::create_dir_all(scratch)?;
            let path = scratch.join(&file_name);
            store::save_stream(&path, &mut entry)?;
            info!("Processing: {}", entry_name);
            (path, file_name)
        };
        let (path, file_name) = extracted;

        let outcome = stamp::stamp_file(engine, &path, &file_name, stamp, coords);
        if let StampOutcome::WriteFailed(_) = &outcome {
            warn!("Metadata set failed for {}, keeping file untagged", file_name);
        }

        let final_path = dest_dir.join(&file_name);
        store::relocate(&path, &final_path)?;
        store::set_capture_mtime(&final_path, &stamp.utc);
        info!("Saved to: {}", final_path.display());

        if let StampOutcome::Tagged(verification) = &outcome {
            report.tagged += 1;
            if verification.passed() {
                report.verified += 1;
            }
        }
        report.saved.push(file_name);
    }

    if store::remove_dir_if_empty(scratch)? {
        tracing::debug!("Removed scratch directory {}", scratch.display());
    }
    Ok(report)
}
