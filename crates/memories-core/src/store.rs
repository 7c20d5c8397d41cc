use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Sibling path a body is written to before it is renamed onto `dest`.
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.part", name))
}

/// Write a downloaded body to `dest`, replacing anything already there.
///
/// `dest` only ever appears complete: the body goes to a `.part` sibling
/// first, which is removed again if writing or renaming fails.
pub fn save_bytes(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(dest);
    let result = write_file(&partial, bytes).and_then(|_| fs::rename(&partial, dest));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(bytes)?;
    out.flush()
}

/// Copy a reader (e.g. an archive entry) into `dest`.
pub fn save_stream<R: io::Read>(dest: &Path, reader: &mut R) -> io::Result<u64> {
    let mut out = BufWriter::new(File::create(dest)?);
    let written = io::copy(reader, &mut out)?;
    out.flush()?;
    Ok(written)
}

/// Move `from` to `to`, overwriting `to`. Falls back to copy + delete when a
/// rename is not possible (different filesystems).
pub fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// Set the file's modification time to the capture instant. Best effort.
pub fn set_capture_mtime(path: &Path, capture: &DateTime<Utc>) {
    let ft = filetime::FileTime::from_unix_time(capture.timestamp(), 0);
    if let Err(e) = filetime::set_file_mtime(path, ft) {
        tracing::debug!("Could not set mtime on {}: {}", path.display(), e);
    }
}

/// Remove `dir` only if it exists and has no entries left. Returns whether it
/// was removed.
pub fn remove_dir_if_empty(dir: &Path) -> io::Result<bool> {
    let Ok(mut entries) = fs::read_dir(dir) else {
        return Ok(false);
    };
    if entries.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir)?;
    Ok(true)
}
