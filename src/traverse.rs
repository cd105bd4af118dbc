use std::collections::HashSet;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::error::{HarvestError, NavError};
use crate::portal::Portal;
use crate::record::{ListingRow, RawRecord};
use crate::scheduler::Cancel;
use crate::store::Store;

/// What a known identifier means for the rest of the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Listing is newest-first: a known id means everything after it is known.
    DuplicateStop,
    /// Backfill: skip known ids and keep going.
    DuplicateSkip,
}

#[derive(Debug, Clone)]
pub struct TraversalPlan {
    pub policy: TerminationPolicy,
    /// Rows posted before this date count as stale.
    pub cutoff: Option<NaiveDate>,
    /// Consecutive stale rows that end the crawl.
    pub stale_threshold: u32,
    /// Pause after each page transition.
    pub settle: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    LastPage,
    NoRows,
    Duplicate(String),
    CutoffReached,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalReport {
    pub pages: u32,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stop: StopReason,
}

// ── Cutoff ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateVerdict {
    Current,
    Stale,
    Exhausted,
}

/// Counts consecutive rows older than the cutoff. A newer row resets the
/// count; a row without a readable date leaves it alone.
struct CutoffTracker {
    cutoff: Option<NaiveDate>,
    threshold: u32,
    consecutive: u32,
}

impl CutoffTracker {
    fn new(cutoff: Option<NaiveDate>, threshold: u32) -> Self {
        CutoffTracker {
            cutoff,
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    fn observe(&mut self, posted_on: Option<NaiveDate>) -> DateVerdict {
        let (Some(cutoff), Some(date)) = (self.cutoff, posted_on) else {
            return DateVerdict::Current;
        };
        if date >= cutoff {
            self.consecutive = 0;
            return DateVerdict::Current;
        }
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            DateVerdict::Exhausted
        } else {
            DateVerdict::Stale
        }
    }
}

// ── Traversal ──

/// Walk the listing page by page, persisting every novel row until the
/// listing ends or a stop condition fires.
///
/// A failed row is logged and the listing recovered; only a failed recovery
/// or a storage failure ends the traversal with an error.
///
/// `collected` holds the ids saved by earlier attempts of the same run. They
/// are skipped rather than treated as the duplicate boundary, and every id
/// saved here is added to it.
pub async fn traverse<P: Portal + ?Sized>(
    portal: &mut P,
    store: &mut Store,
    plan: &TraversalPlan,
    cancel: &Cancel,
    collected: &mut HashSet<String>,
) -> Result<TraversalReport, HarvestError> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut tracker = CutoffTracker::new(plan.cutoff, plan.stale_threshold);
    let mut report = TraversalReport {
        pages: 0,
        processed: 0,
        skipped: 0,
        failed: 0,
        stop: StopReason::LastPage,
    };
    let mut page = 1u32;

    let stop = 'pages: loop {
        report.pages = page;
        info!("Processing listing page {}", page);
        let rows = portal.listing_rows().await?;
        if rows.is_empty() {
            info!("No data rows on page {}", page);
            break StopReason::NoRows;
        }

        for row in &rows {
            if cancel.is_cancelled() {
                break 'pages StopReason::Cancelled;
            }
            pb.set_message(format!(
                "page {} | {} saved, {} skipped, {} failed | {}",
                page, report.processed, report.skipped, report.failed, row.id
            ));

            match tracker.observe(row.posted_on) {
                DateVerdict::Current => {}
                DateVerdict::Stale => {
                    debug!(id = %row.id, "Row older than cutoff");
                    report.skipped += 1;
                    continue;
                }
                DateVerdict::Exhausted => {
                    info!("Date range exhausted at {}", row.id);
                    break 'pages StopReason::CutoffReached;
                }
            }

            if !store.is_new(&row.id) {
                if collected.contains(&row.id) {
                    debug!(id = %row.id, "Saved earlier in this run");
                    report.skipped += 1;
                    continue;
                }
                match plan.policy {
                    TerminationPolicy::DuplicateStop => {
                        info!("Found existing record {}, stopping", row.id);
                        break 'pages StopReason::Duplicate(row.id.clone());
                    }
                    TerminationPolicy::DuplicateSkip => {
                        debug!(id = %row.id, "Skipping duplicate");
                        report.skipped += 1;
                        continue;
                    }
                }
            }

            match capture(portal, row).await {
                Ok(record) => {
                    store.persist(&record)?;
                    collected.insert(row.id.clone());
                    report.processed += 1;
                    store.flush_if_due().await;
                    if let Err(e) = portal.return_to_listing().await {
                        warn!(id = %row.id, "Return to listing failed: {}", e);
                        portal.recover_listing().await?;
                    }
                }
                Err(e) => {
                    warn!(id = %row.id, row = row.index, "Row failed: {}", e);
                    report.failed += 1;
                    portal.recover_listing().await?;
                }
            }
        }

        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if !portal.advance(page + 1).await? {
            info!("Reached last page");
            break StopReason::LastPage;
        }
        tokio::time::sleep(plan.settle).await;
        page += 1;
    };
    report.stop = stop;

    pb.finish_and_clear();
    info!(
        "Traversal finished after {} page(s): {} saved, {} skipped, {} failed ({:?})",
        report.pages, report.processed, report.skipped, report.failed, report.stop
    );
    Ok(report)
}

/// Open, extract and stamp one row. Stamping happens here so `collected_at`
/// is the extraction time, not the detection time.
async fn capture<P: Portal + ?Sized>(
    portal: &mut P,
    row: &ListingRow,
) -> Result<RawRecord, NavError> {
    portal.open_detail(row).await?;
    let body = portal.extract_detail().await?;
    Ok(RawRecord::new(
        row.id.clone(),
        row.title.clone(),
        Local::now().to_rfc3339(),
        body,
    ))
}
