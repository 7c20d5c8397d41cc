//! Metadata engine boundary.
//!
//! The pipeline only needs two operations: write a tag map into a file in
//! place, and read back the group-qualified tags of a file. `ExifTool` keeps a
//! single `exiftool -stay_open` process alive for the whole run and shuts it
//! down when dropped.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;

use crate::tags::{TagMap, TagValue};

const READY_MARKER: &str = "{ready}";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Metadata engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Metadata engine exited unexpectedly")]
    Closed,
    #[error("Tags were not written to {path}: {output}")]
    WriteRejected { path: PathBuf, output: String },
    #[error("Unreadable engine output for {path}: {reason}")]
    BadOutput { path: PathBuf, reason: String },
}

pub trait MetadataEngine {
    /// Write `tags` into the file at `path`, overwriting the original in place.
    fn set_tags(&mut self, path: &Path, tags: &TagMap) -> Result<(), EngineError>;

    /// Read all tags of `path`, keyed `Group:Name` with numeric values where possible.
    fn read_tags(&mut self, path: &Path) -> Result<TagMap, EngineError>;
}

/// A running `exiftool -stay_open True -@ -` session.
pub struct ExifTool {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    closed: bool,
}

impl ExifTool {
    /// Start the session and make sure it answers.
    pub fn spawn(program: &Path) -> Result<Self, EngineError> {
        let mut child = Command::new(program)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.display().to_string(),
                source,
            })?;
        let stdin = child.stdin.take().ok_or(EngineError::Closed)?;
        let stdout = child.stdout.take().ok_or(EngineError::Closed)?;
        let mut session = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            closed: false,
        };
        let version = session.execute(&["-ver".to_string()])?;
        tracing::debug!("exiftool {} ready", version.trim());
        Ok(session)
    }

    /// Send one command (one argument per line) and collect its output up to
    /// the ready marker.
    fn execute(&mut self, args: &[String]) -> Result<String, EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        for arg in args {
            writeln!(self.stdin, "{}", arg)?;
        }
        writeln!(self.stdin, "-execute")?;
        self.stdin.flush()?;

        let mut output = String::new();
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(EngineError::Closed);
            }
            if line.trim_end() == READY_MARKER {
                break;
            }
            output.push_str(&line);
        }
        Ok(output)
    }

    /// Stop the session and wait for the process to exit.
    pub fn close(mut self) -> Result<(), EngineError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let stopped = self.request_stop().and_then(|_| self.child.wait().map(|_| ()));
        if stopped.is_err() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        Ok(stopped?)
    }

    fn request_stop(&mut self) -> std::io::Result<()> {
        writeln!(self.stdin, "-stay_open")?;
        writeln!(self.stdin, "False")?;
        self.stdin.flush()
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("exiftool did not shut down cleanly: {}", e);
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl MetadataEngine for ExifTool {
    fn set_tags(&mut self, path: &Path, tags: &TagMap) -> Result<(), EngineError> {
        let mut args = vec![
            "-charset".to_string(),
            "filename=utf8".to_string(),
            "-P".to_string(),
            "-overwrite_original".to_string(),
        ];
        args.extend(tags.iter().map(|(name, value)| format!("-{}={}", name, value)));
        args.push(path_arg(path));

        let output = self.execute(&args)?;
        if output.contains("1 image files updated") {
            Ok(())
        } else {
            Err(EngineError::WriteRejected {
                path: path.to_path_buf(),
                output: output.trim().to_string(),
            })
        }
    }

    fn read_tags(&mut self, path: &Path) -> Result<TagMap, EngineError> {
        let args = [
            "-charset".to_string(),
            "filename=utf8".to_string(),
            "-j".to_string(),
            "-G".to_string(),
            "-n".to_string(),
            path_arg(path),
        ];
        let output = self.execute(&args)?;
        parse_json_tags(&output).map_err(|reason| EngineError::BadOutput {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Convert `exiftool -j` output (an array with one object per file) into a tag map.
fn parse_json_tags(output: &str) -> Result<TagMap, String> {
    if output.trim().is_empty() {
        return Err("no output".to_string());
    }
    let parsed: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(output).map_err(|e| e.to_string())?;
    let first = parsed
        .into_iter()
        .next()
        .ok_or_else(|| "no metadata found".to_string())?;

    Ok(first
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(f) => TagValue::Number(f),
                    None => TagValue::Text(n.to_string()),
                },
                serde_json::Value::String(s) => TagValue::Text(s),
                other => TagValue::Text(other.to_string()),
            };
            (key, value)
        })
        .collect())
}
