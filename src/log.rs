//! The append-only durable journal (C1).
//!
//! One journal file per [`crate::Store`], opened in append mode. Every
//! [`LogWriter::append`] flushes the user-space buffer and syncs the file
//! descriptor before returning `Ok(())` — a caller must not acknowledge the
//! corresponding mutation until `append` returns successfully.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One entry in the journal. Serializes to exactly the JSON shapes in the
/// wire/log format:
///
/// ```json
/// {"op":"set","key":"K","value":"V"}
/// {"op":"delete","key":"K"}
/// {"op":"bulk_set","items":[["K1","V1"],["K2","V2"]]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogRecord {
    Set { key: String, value: String },
    Delete { key: String },
    BulkSet { items: Vec<(String, String)> },
}

/// Append-only journal writer with fsync-on-append.
pub struct LogWriter {
    file: File,
    /// Debug-only fault injection: silently drops ~1% of appends without
    /// error. Never set outside of tests — see spec §4.1.
    unreliable: bool,
}

impl LogWriter {
    /// Open (creating if absent) the journal at `path` in append mode,
    /// creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, false)
    }

    /// Like [`LogWriter::open`], with the unreliable-write fault injector
    /// toggled. Test-only; production callers must always pass `false`
    /// (use [`LogWriter::open`]).
    pub fn open_with_options(path: impl AsRef<Path>, unreliable: bool) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogWriter { file, unreliable })
    }

    /// Serialize `record` to one UTF-8 line, write it, flush, and fsync.
    /// Returns `Err` on any write or sync failure — the caller must not
    /// acknowledge the mutation in that case.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        if self.unreliable && fault_injected() {
            return Ok(());
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Flush and sync without appending; used by `close()`.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Replay every parseable record in `path`, in file order, calling
    /// `callback` for each. Lines that fail to parse as JSON — including a
    /// torn trailing record left by a prior crash — are skipped silently.
    /// A missing file replays as zero records.
    pub fn replay(path: impl AsRef<Path>, mut callback: impl FnMut(LogRecord)) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => continue,
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<LogRecord>(&line) {
                callback(record);
            }
        }
        Ok(())
    }
}

/// 1% fault-injection roll for the unreliable debug knob.
fn fault_injected() -> bool {
    rand::random::<f64>() < 0.01
}
