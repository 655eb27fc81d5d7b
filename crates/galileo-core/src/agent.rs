// ── Auto-accept agent ──
//
// Polls for landing requests waiting on this user's machines and accepts
// them. A failed cycle or a failed accept is logged and picked up again on
// the next cycle.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::repository::{Repository, RequestFilter, RequestsRepository};

/// Default pause between cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome of one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Pending requests found.
    pub pending: usize,
    pub accepted: usize,
    pub failed: usize,
}

/// Totals over the agent's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub cycles: usize,
    pub failed_cycles: usize,
    pub accepted: usize,
    pub failed_accepts: usize,
}

#[derive(Debug, Clone)]
pub struct AutoAcceptAgent {
    requests: RequestsRepository,
    interval: Duration,
    filter: RequestFilter,
}

impl AutoAcceptAgent {
    pub fn new(requests: RequestsRepository, interval: Duration) -> Self {
        Self {
            requests,
            interval,
            filter: RequestFilter::pending(),
        }
    }

    /// Only accept requests for these machines.
    #[must_use]
    pub fn for_machines(mut self, mids: Vec<String>) -> Self {
        self.filter.mids = mids;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// List pending requests once and accept each of them.
    pub async fn run_once(&self) -> Result<CycleReport, CoreError> {
        let requests = self.requests.list(&self.filter, None, None).await?;
        let mut report = CycleReport::default();

        // The backend may ignore the status filter.
        for request in requests.iter().filter(|r| r.is_pending()) {
            report.pending += 1;
            info!(id = %request.id, mid = %request.mid, userid = %request.userid, "accepting landing request");
            match self.requests.accept(&request.id).await {
                Ok(_) => report.accepted += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(id = %request.id, error = %e, "accept failed, will retry next cycle");
                }
            }
        }

        debug!(?report, "auto-accept cycle done");
        Ok(report)
    }

    /// Run cycles every `interval` until `cancel` fires. The first cycle
    /// runs immediately.
    pub async fn run(&self, cancel: CancellationToken) -> AgentStats {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = AgentStats::default();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    stats.cycles += 1;
                    match self.run_once().await {
                        Ok(report) => {
                            stats.accepted += report.accepted;
                            stats.failed_accepts += report.failed;
                        }
                        Err(e) => {
                            stats.failed_cycles += 1;
                            warn!(error = %e, "auto-accept cycle failed");
                        }
                    }
                }
            }
        }

        info!(?stats, "auto-accept agent stopped");
        stats
    }
}
