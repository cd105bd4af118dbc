use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Every identifier ever persisted: newline-delimited, append-only on disk,
/// mirrored in memory for O(1) lookups.
pub struct Ledger {
    path: PathBuf,
    seen: HashSet<String>,
}

impl Ledger {
    /// Load the full ledger. A missing file is an empty ledger.
    pub fn open(path: &Path) -> io::Result<Self> {
        let seen = match fs::read_to_string(path) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };
        Ok(Ledger {
            path: path.to_path_buf(),
            seen,
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `id` if unseen. The in-memory set changes only after the line
    /// reached disk, so a failed write leaves the id novel.
    pub fn record(&mut self, id: &str) -> io::Result<bool> {
        if self.seen.contains(id) {
            return Ok(false);
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{}\n", id).as_bytes())?;
        file.sync_data()?;
        self.seen.insert(id.to_string());
        Ok(true)
    }
}
