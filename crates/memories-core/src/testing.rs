//! In-memory collaborators for tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use crate::engine::{EngineError, MetadataEngine};
use crate::fetch::{FetchError, Fetched, Fetcher};
use crate::tags::{TagMap, TagValue};

/// Stores written tags per path and reads them back the way exiftool reports
/// them: unqualified names land in the `EXIF` group.
#[derive(Default)]
pub struct MemoryEngine {
    files: HashMap<PathBuf, TagMap>,
    pub writes: Vec<PathBuf>,
    pub reads: Vec<PathBuf>,
    fail_writes: bool,
}

impl MemoryEngine {
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn tag(&self, path: &Path, key: &str) -> Option<&TagValue> {
        self.files.get(path).and_then(|tags| tags.get(key))
    }

    pub fn written_names(&self) -> Vec<String> {
        self.writes
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }
}

fn not_found(path: &Path) -> EngineError {
    EngineError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    ))
}

impl MetadataEngine for MemoryEngine {
    fn set_tags(&mut self, path: &Path, tags: &TagMap) -> Result<(), EngineError> {
        if !path.exists() {
            return Err(not_found(path));
        }
        if self.fail_writes {
            return Err(EngineError::WriteRejected {
                path: path.to_path_buf(),
                output: "0 image files updated".to_string(),
            });
        }
        self.writes.push(path.to_path_buf());
        let stored = self.files.entry(path.to_path_buf()).or_default();
        for (name, value) in tags {
            let key = if name.contains(':') {
                name.clone()
            } else {
                format!("EXIF:{}", name)
            };
            stored.insert(key, value.clone());
        }
        Ok(())
    }

    fn read_tags(&mut self, path: &Path) -> Result<TagMap, EngineError> {
        if !path.exists() {
            return Err(not_found(path));
        }
        self.reads.push(path.to_path_buf());
        let mut tags = self.files.get(path).cloned().unwrap_or_default();
        if let Some(name) = path.file_name() {
            tags.insert(
                "File:FileName".to_string(),
                TagValue::Text(name.to_string_lossy().into_owned()),
            );
        }
        Ok(tags)
    }
}

/// Serves canned responses by URL and records every request.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: HashMap<String, Fetched>,
    pub requests: RefCell<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn respond(mut self, url: &str, content_type: &str, body: Vec<u8>) -> Self {
        self.responses.insert(
            url.to_string(),
            Fetched {
                content_type: content_type.to_string(),
                body,
            },
        );
        self
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Exhausted {
                url: url.to_string(),
                attempts: 3,
                last: Box::new(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            })
    }
}

/// Build an in-memory ZIP. Names ending in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, body) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
