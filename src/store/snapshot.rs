use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::record::{Fields, RawRecord, SectionBody};

/// Flattened, one-line-per-record projection. Derived and rebuildable.
pub type SnapshotRow = IndexMap<String, String>;

const ATTACHMENT_COUNT: &str = "attachment_count";
const ATTACHMENT_NAMES: &str = "attachment_names";

/// Columns filled after the sections; section fields never take these names.
const RESERVED: &[&str] = &[ATTACHMENT_COUNT, ATTACHMENT_NAMES];

/// Consecutive failed writes after which carried records are given up on.
/// They stay in the record log, so a rebuild restores them.
const MAX_FAILED_WRITES: u32 = 5;

/// Keys that carry an attachment's display name.
const NAME_KEYS: &[&str] = &["파일명", "name", "file"];

// ── Flattening ──

pub fn flatten(record: &RawRecord) -> SnapshotRow {
    let mut row = SnapshotRow::new();
    row.insert("id".into(), record.id.clone());
    row.insert("title".into(), record.title.clone());
    row.insert("collected_at".into(), record.collected_at.clone());

    for (label, body) in &record.sections {
        match body {
            SectionBody::KeyValue(fields) => {
                for (key, value) in fields {
                    insert_unique(&mut row, label, key, value.clone());
                }
            }
            SectionBody::Grid(rows) => insert_unique(&mut row, label, label, summarize_grid(rows)),
        }
    }

    let names: Vec<String> = record.files.iter().filter_map(attachment_name).collect();
    row.insert(ATTACHMENT_COUNT.into(), record.files.len().to_string());
    row.insert(ATTACHMENT_NAMES.into(), names.join("\n"));
    row
}

/// Colliding columns take the section label as prefix, then a counter.
fn insert_unique(row: &mut SnapshotRow, section: &str, column: &str, value: String) {
    let mut key = column.to_string();
    if is_taken(row, &key) {
        key = format!("{}_{}", section, column);
    }
    let mut n = 2;
    while is_taken(row, &key) {
        key = format!("{}_{}_{}", section, column, n);
        n += 1;
    }
    row.insert(key, value);
}

fn is_taken(row: &SnapshotRow, key: &str) -> bool {
    row.contains_key(key) || RESERVED.contains(&key)
}

/// One line per grid row: `label: value, label: value`.
fn summarize_grid(rows: &[Fields]) -> String {
    rows.iter()
        .map(|r| {
            r.iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn attachment_name(file: &Fields) -> Option<String> {
    file.iter()
        .find(|(k, v)| {
            let k = k.to_lowercase();
            !v.is_empty() && NAME_KEYS.iter().any(|n| k.contains(n))
        })
        .or_else(|| file.iter().find(|(_, v)| !v.is_empty()))
        .map(|(_, v)| v.clone())
}

// ── Compaction ──

/// Read the current snapshot, append `batch`, rewrite the file in full.
/// Returns the total row count.
pub fn compact(path: &Path, batch: &[RawRecord]) -> Result<usize, SnapshotError> {
    let (mut columns, mut rows) = read_snapshot(path)?;
    for record in batch {
        let row = flatten(record);
        for key in row.keys() {
            if !columns.contains(key) {
                columns.insert(key.clone());
            }
        }
        rows.push(row);
    }
    write_snapshot(path, &columns, &rows)?;
    Ok(rows.len())
}

/// Replace the snapshot with one built from `records` alone.
pub fn rebuild(path: &Path, records: &[RawRecord]) -> Result<usize, SnapshotError> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    compact(path, records)
}

pub fn row_count(path: &Path) -> Result<usize, SnapshotError> {
    Ok(read_snapshot(path)?.1.len())
}

fn read_snapshot(path: &Path) -> Result<(IndexSet<String>, Vec<SnapshotRow>), SnapshotError> {
    if !path.exists() {
        return Ok((IndexSet::new(), Vec::new()));
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns: IndexSet<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: SnapshotRow = columns
            .iter()
            .zip(record.iter())
            .map(|(c, v)| (c.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok((columns, rows))
}

/// Write to a sibling temp file, then rename over the snapshot.
fn write_snapshot(
    path: &Path,
    columns: &IndexSet<String>,
    rows: &[SnapshotRow],
) -> Result<(), SnapshotError> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(columns)?;
        for row in rows {
            writer.write_record(
                columns
                    .iter()
                    .map(|c| row.get(c).map(String::as_str).unwrap_or("")),
            )?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

// ── Background worker ──

/// Single background worker that owns every asynchronous snapshot write.
/// Batches are handed over by value through a one-slot queue, so writes never
/// overlap and the sender never touches a batch after handing it off.
pub struct Compactor {
    tx: Option<mpsc::Sender<Vec<RawRecord>>>,
    worker: Option<JoinHandle<Vec<RawRecord>>>,
}

impl Compactor {
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::channel::<Vec<RawRecord>>(1);
        let worker = tokio::spawn(async move {
            // Records whose snapshot write failed ride along with the next batch.
            let mut carry: Vec<RawRecord> = Vec::new();
            let mut failures = 0u32;
            while let Some(batch) = rx.recv().await {
                carry.extend(batch);
                let pending = mem::take(&mut carry);
                let path = path.clone();
                let joined =
                    tokio::task::spawn_blocking(move || (compact(&path, &pending), pending)).await;
                match joined {
                    Ok((Ok(total), pending)) => {
                        failures = 0;
                        info!("Snapshot updated: +{} rows ({} total)", pending.len(), total)
                    }
                    Ok((Err(e), pending)) => {
                        failures += 1;
                        if failures >= MAX_FAILED_WRITES {
                            warn!(
                                "Snapshot write failed {} times in a row, {} records left out; \
                                 run rebuild-snapshot once the file is writable: {}",
                                failures,
                                pending.len(),
                                e
                            );
                            failures = 0;
                        } else {
                            warn!("Snapshot write failed, retrying with next batch: {}", e);
                            carry = pending;
                        }
                    }
                    Err(e) => warn!("Snapshot worker task failed: {}", e),
                }
            }
            carry
        });
        Compactor {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Queue a batch. Hands the batch back if the worker is gone.
    pub async fn submit(&mut self, batch: Vec<RawRecord>) -> Result<(), Vec<RawRecord>> {
        match &self.tx {
            Some(tx) => tx.send(batch).await.map_err(|e| e.0),
            None => Err(batch),
        }
    }

    /// Close the queue and wait for every queued write to finish. Returns the
    /// records whose write never succeeded. Later calls return nothing.
    pub async fn drain(&mut self) -> Vec<RawRecord> {
        self.tx.take();
        match self.worker.take() {
            Some(worker) => worker.await.unwrap_or_else(|e| {
                warn!("Snapshot worker ended abnormally: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}
