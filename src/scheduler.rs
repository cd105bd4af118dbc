//! Run modes: a bounded historical backfill, periodic polling, and a fixed
//! daily trigger. Every trigger is one search plus one traversal in a fresh
//! browser session.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::HarvestError;
use crate::nav::WebDriver;
use crate::portal::{NuriPortal, Portal};
use crate::retry::{retry, RetryPolicy};
use crate::store::Store;
use crate::text::DateWindow;
use crate::traverse::{traverse, TerminationPolicy, TraversalPlan, TraversalReport};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// ── Cancellation ──

/// Cooperative cancellation flag, set once by a termination signal.
#[derive(Debug, Clone)]
pub struct Cancel {
    rx: watch::Receiver<bool>,
}

impl Cancel {
    pub fn new() -> (watch::Sender<bool>, Cancel) {
        let (tx, rx) = watch::channel(false);
        (tx, Cancel { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the sender
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Flip the flag on SIGINT or SIGTERM. Returns the receiving side.
pub fn listen_for_signals() -> Cancel {
    let (tx, cancel) = Cancel::new();
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Termination signal received, stopping after the current record");
        let _ = tx.send(true);
    });
    cancel
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// ── Modes ──

#[derive(Debug, Clone)]
pub enum Mode {
    /// One backfill over a fixed window.
    History {
        window: DateWindow,
        cutoff: Option<NaiveDate>,
    },
    /// Incremental run now, then every `every`.
    Interval { every: Duration },
    /// Incremental run daily at `hour:00` local time.
    Cron { hour: u32 },
}

pub async fn run(
    mode: Mode,
    settings: &Settings,
    store: &mut Store,
    mut cancel: Cancel,
) -> Result<()> {
    match mode {
        Mode::History { window, cutoff } => {
            let plan = TraversalPlan {
                policy: TerminationPolicy::DuplicateSkip,
                cutoff,
                stale_threshold: settings.stale_row_threshold,
                settle: settings.settle(),
            };
            info!("History mode: {}", window);
            run_trigger(settings, store, window, plan, &cancel).await?;
            Ok(())
        }
        Mode::Interval { every } => {
            info!("Interval mode: every {}s", every.as_secs());
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = cancel.cancelled() => break,
                }
                incremental_trigger(settings, store, &cancel).await;
                if cancel.is_cancelled() {
                    break;
                }
            }
            Ok(())
        }
        Mode::Cron { hour } => {
            info!("Cron mode: daily at {:02}:00", hour);
            loop {
                let now = Local::now().naive_local();
                let wait = until_next(now, hour);
                info!("Next run in {}s", wait.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => break,
                }
                incremental_trigger(settings, store, &cancel).await;
                if cancel.is_cancelled() {
                    break;
                }
            }
            Ok(())
        }
    }
}

/// Yesterday..today, stopping at the first already-collected record. A failed
/// trigger is logged and the schedule carries on.
async fn incremental_trigger(settings: &Settings, store: &mut Store, cancel: &Cancel) {
    let window = DateWindow::incremental(Local::now().date_naive());
    let plan = TraversalPlan {
        policy: TerminationPolicy::DuplicateStop,
        cutoff: Some(window.start),
        stale_threshold: settings.stale_row_threshold,
        settle: settings.settle(),
    };
    if let Err(e) = run_trigger(settings, store, window, plan, cancel).await {
        error!("Trigger failed, waiting for the next one: {:#}", e);
    }
}

/// Time from `now` until the next `hour:00`, today or tomorrow.
fn until_next(now: NaiveDateTime, hour: u32) -> Duration {
    let Some(today) = now.date().and_hms_opt(hour, 0, 0) else {
        return DAY;
    };
    let target = if today > now {
        today
    } else {
        match today.checked_add_days(Days::new(1)) {
            Some(t) => t,
            None => return DAY,
        }
    };
    (target - now).to_std().unwrap_or(DAY)
}

// ── One trigger ──

struct Session<'s, P> {
    portal: P,
    store: &'s mut Store,
    window: DateWindow,
    plan: TraversalPlan,
    cancel: Cancel,
    searched: bool,
    /// Ids saved by any attempt of this trigger.
    collected: HashSet<String>,
}

/// Open a browser session, search, traverse, and close the session on every path.
pub async fn run_trigger(
    settings: &Settings,
    store: &mut Store,
    window: DateWindow,
    plan: TraversalPlan,
    cancel: &Cancel,
) -> Result<TraversalReport, HarvestError> {
    let driver = WebDriver::connect(&settings.webdriver_url, settings.headless).await?;
    let portal = NuriPortal::new(driver, settings.base_url.clone(), settings.element_timeout());
    let mut session = Session {
        portal,
        store,
        window,
        plan,
        cancel: cancel.clone(),
        searched: false,
        collected: HashSet::new(),
    };
    let result = search_and_traverse(&settings.retry_policy(), &mut session).await;
    session.portal.close().await;
    result
}

async fn search_and_traverse<P: Portal + 'static>(
    policy: &RetryPolicy,
    session: &mut Session<'_, P>,
) -> Result<TraversalReport, HarvestError> {
    retry(policy, "search", session, |s| {
        async move {
            s.portal.search(&s.window).await?;
            s.searched = true;
            Ok(())
        }
        .boxed()
    })
    .await?;

    retry(policy, "traverse", session, |s| {
        async move {
            // A retried traversal starts over from a fresh result listing and
            // walks past what the failed attempt already saved.
            if !s.searched {
                s.portal.search(&s.window).await?;
            }
            s.searched = false;
            traverse(
                &mut s.portal,
                &mut *s.store,
                &s.plan,
                &s.cancel,
                &mut s.collected,
            )
            .await
        }
        .boxed()
    })
    .await
}
