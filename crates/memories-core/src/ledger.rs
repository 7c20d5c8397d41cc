use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current ledger file format version
const LEDGER_VERSION: u32 = 1;

/// Ledger filename inside the output directory
pub const LEDGER_FILENAME: &str = ".memories-archives.json";

/// Archive records never produce their `{kind}_{date}.{ext}` file, so the
/// ledger is what makes a re-run skip them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub members: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveLedger {
    pub version: u32,
    pub updated: DateTime<Utc>,
    /// Record filename -> members saved for it.
    pub archives: BTreeMap<String, ArchiveEntry>,
    #[serde(skip)]
    output_dir: PathBuf,
}

impl ArchiveLedger {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            version: LEDGER_VERSION,
            updated: Utc::now(),
            archives: BTreeMap::new(),
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Load the ledger from `output_dir`. A missing, unreadable or corrupt
    /// file, or one written by an unknown version, starts an empty ledger.
    pub fn load(output_dir: &Path) -> Self {
        let path = output_dir.join(LEDGER_FILENAME);
        if !path.exists() {
            return Self::new(output_dir);
        }

        match Self::read(&path) {
            Ok(mut ledger) if ledger.version == LEDGER_VERSION => {
                ledger.output_dir = output_dir.to_path_buf();
                ledger
            }
            Ok(ledger) => {
                tracing::warn!("Ignoring archive ledger version {}", ledger.version);
                Self::new(output_dir)
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable archive ledger {}: {}", path.display(), e);
                Self::new(output_dir)
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn contains(&self, record_filename: &str) -> bool {
        self.archives.contains_key(record_filename)
    }

    /// Remember a finished archive record and persist immediately.
    pub fn record(&mut self, record_filename: &str, members: &[String]) -> anyhow::Result<()> {
        let now = Utc::now();
        self.archives.insert(
            record_filename.to_string(),
            ArchiveEntry {
                members: members.to_vec(),
                completed_at: now,
            },
        );
        self.updated = now;
        self.save()
    }

    /// Save to the output directory.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.output_dir.join(LEDGER_FILENAME);
        let temp_path = self.output_dir.join(".memories-archives.tmp");

        // Write to temp file first, then rename for atomicity
        let file = File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;

        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}
