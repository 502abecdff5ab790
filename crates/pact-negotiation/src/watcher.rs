// watcher.rs — Scheduled auto-approval of goals past their deadline.
//
// Uses the same conditional write as observer-driven checks, so a sweep
// racing a giver or another observer approves at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::NegotiationError;
use crate::negotiator::Negotiator;

pub struct DeadlineWatcher {
    negotiator: Arc<Negotiator>,
    interval: Duration,
}

impl DeadlineWatcher {
    pub fn new(negotiator: Arc<Negotiator>, interval: Duration) -> Self {
        Self {
            negotiator,
            interval,
        }
    }

    /// Auto-approve every pending goal due at `now`. Returns how many
    /// this sweep approved. Per-goal failures are logged and skipped.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize, NegotiationError> {
        let pending = self.negotiator.goals().pending_goals().await?;
        let mut approved = 0;
        for goal in pending.iter().filter(|g| g.is_auto_approval_due(now)) {
            match self.negotiator.check_deadline_at(&goal.id, now).await {
                Ok(Some(outcome)) => {
                    approved += 1;
                    if outcome.needs_retry() {
                        tracing::warn!(
                            goal_id = %goal.id,
                            "auto-approved, some notifications were not delivered"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(goal_id = %goal.id, "deadline check failed: {}", e);
                }
            }
        }
        if approved > 0 {
            tracing::info!(approved, pending = pending.len(), "deadline sweep finished");
        }
        Ok(approved)
    }

    /// Sweep on every tick until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "deadline watcher started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        tracing::warn!("deadline sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("deadline watcher stopped");
    }
}
