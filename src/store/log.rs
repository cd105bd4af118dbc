use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::record::RawRecord;

/// Append-only JSON-lines log of every persisted record. Authoritative.
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub fn new(path: &Path) -> Self {
        RecordLog {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one already-serialized record as a single line.
    pub fn append_line(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{}\n", line).as_bytes())?;
        file.sync_data()
    }

    /// Non-blank lines in the log.
    pub fn count(&self) -> io::Result<usize> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut n = 0;
        for line in BufReader::new(file).lines() {
            if !line?.trim().is_empty() {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Every decodable record, in log order. Corrupt lines are reported and skipped.
    pub fn read_all(&self) -> io::Result<Vec<RawRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(rec) => records.push(rec),
                Err(e) => warn!(line = i + 1, "Unreadable record log line skipped: {}", e),
            }
        }
        Ok(records)
    }

    /// The newest `n` records, newest first.
    pub fn latest(&self, n: usize) -> io::Result<Vec<RawRecord>> {
        let mut all = self.read_all()?;
        let keep = all.split_off(all.len().saturating_sub(n));
        Ok(keep.into_iter().rev().collect())
    }
}
