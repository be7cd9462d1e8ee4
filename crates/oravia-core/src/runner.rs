//! Scheduler poll loop with stop control.
//!
//! [`run_scheduler`] wakes every poll interval, renews or contends for the
//! scheduler lease, and ticks only while it holds it. A stop request wakes
//! the loop at once; the lease is released on the way out so a standby
//! instance can take over without waiting for expiry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use oravia_store::Store;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::lease::Lease;
use crate::scheduler::{Scheduler, TickSummary};

/// Shared stop flag for a running scheduler loop.
#[derive(Debug, Default)]
pub struct RunnerControl {
    stop_requested: AtomicBool,
    wake: Notify,
}

impl RunnerControl {
    /// Create a control in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to finish its current tick and return.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// Totals over one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks completed while holding the lease.
    pub ticks: u64,
    /// Attacks resolved across all ticks.
    pub attacks: u64,
    /// Returns applied across all ticks.
    pub returns: u64,
    /// Commands that failed and were left for a later tick.
    pub failures: u64,
    /// The last completed tick.
    pub last_tick: Option<TickSummary>,
}

impl RunSummary {
    fn add(&mut self, tick: TickSummary) {
        let widen = |n: usize| u64::try_from(n).unwrap_or(u64::MAX);
        self.ticks = self.ticks.saturating_add(1);
        self.attacks = self.attacks.saturating_add(widen(tick.attacks));
        self.returns = self.returns.saturating_add(widen(tick.returns));
        self.failures = self.failures.saturating_add(widen(tick.failed));
        self.last_tick = Some(tick);
    }
}

/// Poll for due commands until a stop is requested.
///
/// Store errors while contending for the lease or scanning are logged and
/// retried on the next poll.
pub async fn run_scheduler<S: Store>(
    scheduler: &Scheduler<S>,
    lease: &Lease<S>,
    control: &Arc<RunnerControl>,
    poll_interval_ms: u64,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut leading = false;

    info!(holder = lease.holder(), poll_interval_ms, "Scheduler loop starting");

    loop {
        if control.is_stop_requested() {
            info!("Scheduler stop requested");
            break;
        }

        let now = Utc::now();
        match lease.try_acquire(now).await {
            Ok(true) => {
                if !leading {
                    info!(holder = lease.holder(), "Scheduler lease acquired");
                    leading = true;
                }
                match scheduler.tick(now).await {
                    Ok(tick) => summary.add(tick),
                    Err(e) => warn!(error = %e, "Scan for due commands failed"),
                }
            }
            Ok(false) => {
                if leading {
                    info!(holder = lease.holder(), "Scheduler lease lost, standing by");
                    leading = false;
                } else {
                    debug!("Another instance holds the scheduler lease");
                }
            }
            Err(e) => warn!(error = %e, "Scheduler lease check failed"),
        }

        if poll_interval_ms > 0 {
            tokio::select! {
                () = tokio::time::sleep(tokio::time::Duration::from_millis(poll_interval_ms)) => {}
                () = control.wake.notified() => {}
            }
        }
    }

    if leading {
        match lease.release(Utc::now()).await {
            Ok(_) => info!("Scheduler lease released"),
            Err(e) => warn!(error = %e, "Failed to release scheduler lease"),
        }
    }

    info!(
        ticks = summary.ticks,
        attacks = summary.attacks,
        returns = summary.returns,
        failures = summary.failures,
        "Scheduler loop stopped"
    );
    summary
}
