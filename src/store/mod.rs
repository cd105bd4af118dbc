//! Durable ingestion store: identifier ledger, append-only record log and a
//! derived tabular snapshot that is rewritten in batches off the hot path.

pub mod ledger;
pub mod log;
pub mod snapshot;

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{HarvestError, SnapshotError};
use crate::record::RawRecord;
use ledger::Ledger;
use log::RecordLog;
use snapshot::Compactor;

const LEDGER_FILE: &str = "visited_ids.txt";
const RECORD_LOG_FILE: &str = "records.jsonl";
const SNAPSHOT_FILE: &str = "snapshot.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub ledger: PathBuf,
    pub log: PathBuf,
    pub snapshot: PathBuf,
}

impl StorePaths {
    pub fn in_dir(dir: &Path) -> Self {
        StorePaths {
            ledger: dir.join(LEDGER_FILE),
            log: dir.join(RECORD_LOG_FILE),
            snapshot: dir.join(SNAPSHOT_FILE),
        }
    }
}

/// Counts reported by `stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub seen_ids: usize,
    pub logged_records: usize,
    pub snapshot_rows: usize,
}

pub struct Store {
    ledger: Ledger,
    log: RecordLog,
    snapshot_path: PathBuf,
    buffer: Vec<RawRecord>,
    batch_size: usize,
    compactor: Compactor,
}

impl Store {
    /// Load the ledger into memory and start the snapshot worker. Must be
    /// called inside a tokio runtime.
    pub fn open(paths: &StorePaths, batch_size: usize) -> Result<Self, HarvestError> {
        for path in [&paths.ledger, &paths.log, &paths.snapshot] {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| HarvestError::storage(dir, e))?;
            }
        }
        let ledger =
            Ledger::open(&paths.ledger).map_err(|e| HarvestError::storage(&paths.ledger, e))?;
        info!("Loaded {} known identifiers", ledger.len());
        Ok(Store {
            ledger,
            log: RecordLog::new(&paths.log),
            snapshot_path: paths.snapshot.clone(),
            buffer: Vec::new(),
            batch_size: batch_size.max(1),
            compactor: Compactor::spawn(paths.snapshot.clone()),
        })
    }

    pub fn is_new(&self, id: &str) -> bool {
        !self.ledger.contains(id)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Ledger, then record log, then the snapshot buffer. Any disk failure is
    /// fatal to the run. A record without an identifier is ignored.
    pub fn persist(&mut self, record: &RawRecord) -> Result<(), HarvestError> {
        if record.is_empty() {
            debug!("Ignoring record without an identifier");
            return Ok(());
        }
        let line = serde_json::to_string(record)?;

        let added = self
            .ledger
            .record(&record.id)
            .map_err(|e| HarvestError::storage(self.ledger.path(), e))?;
        if !added {
            debug!(id = %record.id, "Identifier already in ledger");
        }
        self.log
            .append_line(&line)
            .map_err(|e| HarvestError::storage(self.log.path(), e))?;
        self.buffer.push(record.clone());
        info!(id = %record.id, "Saved: {}", record.title);
        Ok(())
    }

    /// Hand the buffer to the snapshot worker once it holds a full batch.
    pub async fn flush_if_due(&mut self) {
        if self.buffer.len() < self.batch_size {
            return;
        }
        let batch = mem::take(&mut self.buffer);
        debug!("Handing {} records to snapshot worker", batch.len());
        if let Err(batch) = self.compactor.submit(batch).await {
            warn!("Snapshot worker unavailable, compacting inline");
            self.compact_now(&batch);
        }
    }

    /// Wait for in-flight snapshot writes, then synchronously compact whatever
    /// is still buffered. Safe to call more than once.
    pub async fn shutdown_flush(&mut self) {
        let mut pending = self.compactor.drain().await;
        pending.append(&mut self.buffer);
        if pending.is_empty() {
            return;
        }
        info!("Flushing {} remaining records to snapshot", pending.len());
        self.compact_now(&pending);
    }

    fn compact_now(&self, batch: &[RawRecord]) {
        match snapshot::compact(&self.snapshot_path, batch) {
            Ok(total) => info!("Snapshot updated: +{} rows ({} total)", batch.len(), total),
            Err(e) => warn!(
                "Snapshot write failed ({}), run rebuild-snapshot to restore it: {}",
                self.snapshot_path.display(),
                e
            ),
        }
    }
}

/// Read-only counts over the three data files.
pub fn stats(paths: &StorePaths) -> Result<StoreStats, HarvestError> {
    let ledger = Ledger::open(&paths.ledger).map_err(|e| HarvestError::storage(&paths.ledger, e))?;
    let logged = RecordLog::new(&paths.log)
        .count()
        .map_err(|e| HarvestError::storage(&paths.log, e))?;
    let snapshot_rows = match snapshot::row_count(&paths.snapshot) {
        Ok(n) => n,
        Err(e) => {
            warn!("Snapshot unreadable: {}", e);
            0
        }
    };
    Ok(StoreStats {
        seen_ids: ledger.len(),
        logged_records: logged,
        snapshot_rows,
    })
}

/// The newest `n` logged records, newest first.
pub fn latest(paths: &StorePaths, n: usize) -> Result<Vec<RawRecord>, HarvestError> {
    RecordLog::new(&paths.log)
        .latest(n)
        .map_err(|e| HarvestError::storage(&paths.log, e))
}

/// Regenerate the snapshot from the record log, keeping the last entry per id.
pub fn rebuild_snapshot(paths: &StorePaths) -> Result<usize, SnapshotError> {
    let records = RecordLog::new(&paths.log).read_all()?;
    let mut latest: indexmap::IndexMap<String, RawRecord> = indexmap::IndexMap::new();
    for record in records {
        latest.shift_remove(&record.id);
        latest.insert(record.id.clone(), record);
    }
    let records: Vec<RawRecord> = latest.into_values().collect();
    snapshot::rebuild(&paths.snapshot, &records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBody;
    use tempfile::tempdir;

    fn record(id: &str) -> RawRecord {
        RawRecord::new(
            id.into(),
            format!("공고 {}", id),
            "2024-03-05T10:00:00+09:00".into(),
            RecordBody::default(),
        )
    }

    #[tokio::test]
    async fn persisted_ids_are_known_now_and_after_reopen() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        {
            let mut store = Store::open(&paths, 10).unwrap();
            assert!(store.is_new("R1"));
            store.persist(&record("R1")).unwrap();
            assert!(!store.is_new("R1"));
            store.shutdown_flush().await;
        }
        let store = Store::open(&paths, 10).unwrap();
        assert!(!store.is_new("R1"));
        assert!(store.is_new("R2"));
    }

    #[tokio::test]
    async fn repeated_persist_keeps_single_ledger_line() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let mut store = Store::open(&paths, 10).unwrap();
        store.persist(&record("R1")).unwrap();
        store.persist(&record("R1")).unwrap();
        assert_eq!(fs::read_to_string(&paths.ledger).unwrap(), "R1\n");
        assert_eq!(RecordLog::new(&paths.log).count().unwrap(), 2);
        store.shutdown_flush().await;
    }

    #[tokio::test]
    async fn record_without_id_is_ignored() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let mut store = Store::open(&paths, 10).unwrap();
        store.persist(&record("")).unwrap();
        assert_eq!(store.buffered(), 0);
        assert!(!paths.ledger.exists());
        assert!(!paths.log.exists());
    }

    #[tokio::test]
    async fn shutdown_flushes_partial_batch_exactly_once() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let mut store = Store::open(&paths, 10).unwrap();
        for i in 0..7 {
            store.persist(&record(&format!("R{}", i))).unwrap();
            store.flush_if_due().await;
        }
        assert!(!paths.snapshot.exists());
        assert_eq!(store.buffered(), 7);

        store.shutdown_flush().await;
        assert_eq!(snapshot::row_count(&paths.snapshot).unwrap(), 7);

        store.shutdown_flush().await;
        assert_eq!(snapshot::row_count(&paths.snapshot).unwrap(), 7);
    }

    #[tokio::test]
    async fn full_batch_is_handed_off_and_buffer_cleared() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let mut store = Store::open(&paths, 10).unwrap();
        for i in 0..12 {
            store.persist(&record(&format!("R{:02}", i))).unwrap();
            store.flush_if_due().await;
        }
        assert_eq!(store.buffered(), 2);
        store.shutdown_flush().await;
        assert_eq!(snapshot::row_count(&paths.snapshot).unwrap(), 12);
    }

    #[tokio::test]
    async fn ledger_failure_is_fatal_and_log_untouched() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let mut store = Store::open(&paths, 10).unwrap();
        // A directory at the ledger path makes the append fail.
        fs::create_dir(&paths.ledger).unwrap();

        let err = store.persist(&record("R1")).unwrap_err();
        assert!(err.is_fatal());
        assert!(store.is_new("R1"));
        assert!(!paths.log.exists());
        assert_eq!(store.buffered(), 0);
    }

    #[tokio::test]
    async fn unwritable_snapshot_does_not_affect_ledger_or_log() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let mut store = Store::open(&paths, 1).unwrap();
        // A directory in place of the snapshot makes every rename fail.
        fs::create_dir(&paths.snapshot).unwrap();

        store.persist(&record("R1")).unwrap();
        store.flush_if_due().await;
        store.shutdown_flush().await;

        assert!(!store.is_new("R1"));
        assert_eq!(RecordLog::new(&paths.log).count().unwrap(), 1);
    }

    #[tokio::test]
    async fn stats_latest_and_rebuild() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let mut store = Store::open(&paths, 10).unwrap();
        for id in ["A", "B", "A", "C"] {
            store.persist(&record(id)).unwrap();
        }
        store.shutdown_flush().await;

        let s = stats(&paths).unwrap();
        assert_eq!(s.seen_ids, 3);
        assert_eq!(s.logged_records, 4);
        assert_eq!(s.snapshot_rows, 4);

        let ids: Vec<_> = latest(&paths, 2).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["C", "A"]);

        assert_eq!(rebuild_snapshot(&paths).unwrap(), 3);
        assert_eq!(stats(&paths).unwrap().snapshot_rows, 3);
    }
}
