use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::activity::ActivityObserver;
use crate::config::SchedulerSettings;
use crate::stack::{ApplyOutcome, RevisionStack};

/// How many masters the publisher claims per collection on each tick. Kept
/// small and fixed rather than configurable: a publisher that falls behind
/// should run more often, not claim in bigger batches.
const CLAIM_BATCH: u32 = 50;

/// Periodic worker that scans a fixed set of collections for due,
/// unclaimed revisions, claims them, and drives each claimed master
/// through its stack's `pop` until nothing pending remains.
pub struct Publisher {
    stacks: Vec<Arc<RevisionStack>>,
    settings: SchedulerSettings,
    observer: Option<Arc<dyn ActivityObserver>>,
}

impl Publisher {
    pub fn new(
        stacks: Vec<Arc<RevisionStack>>,
        settings: SchedulerSettings,
        observer: Option<Arc<dyn ActivityObserver>>,
    ) -> Self {
        Self {
            stacks,
            settings,
            observer,
        }
    }

    /// Run one publish pass over every configured collection.
    #[instrument(skip(self))]
    pub async fn publish(&self, now: i64) -> Vec<PublishOutcome> {
        let mut outcomes = Vec::with_capacity(self.stacks.len());
        for stack in &self.stacks {
            outcomes.push(self.publish_one(stack, now).await);
        }
        outcomes
    }

    async fn publish_one(&self, stack: &Arc<RevisionStack>, now: i64) -> PublishOutcome {
        let mut summary = PublishSummary::default();
        let claimed = match stack.claim_due(now, CLAIM_BATCH).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(collection = stack.collection_name(), error = %e, "claim failed");
                return PublishOutcome {
                    collection: stack.collection_name().to_string(),
                    summary,
                    claim_error: Some(e.to_string()),
                };
            }
        };

        for master_id in claimed {
            loop {
                match stack.pop_outcome(&master_id).await {
                    Ok(None) => break,
                    Ok(Some(ApplyOutcome::Applied(r))) => {
                        summary.applied += 1;
                        info!(revision = %r.id, master = %r.master_id, "applied");
                    }
                    Ok(Some(ApplyOutcome::AppliedWithWarning(r, reason))) => {
                        summary.applied += 1;
                        summary.warnings += 1;
                        warn!(revision = %r.id, master = %r.master_id, %reason, "applied with warning");
                    }
                    Ok(Some(ApplyOutcome::StructuralError(r, err))) => {
                        summary.errors += 1;
                        error!(revision = %r.id, master = %r.master_id, %err, "failed to record revision outcome");
                        break;
                    }
                    Err(e) => {
                        summary.errors += 1;
                        error!(master = %master_id, error = %e, "pop failed");
                        break;
                    }
                }
            }
        }

        if let Some(obs) = &self.observer {
            if summary.applied > 0 || summary.errors > 0 {
                obs.on_pass_completed(stack.collection_name(), summary);
            }
        }

        PublishOutcome {
            collection: stack.collection_name().to_string(),
            summary,
            claim_error: None,
        }
    }

    /// Run [`Publisher::publish`] forever, sleeping
    /// `settings.interval_seconds` between passes. Intended to be spawned as
    /// a background tokio task for the lifetime of the server.
    pub async fn run(self, mut now_fn: impl FnMut() -> i64 + Send) {
        let interval = Duration::from_secs(self.settings.interval_seconds.max(1));
        loop {
            let now = now_fn();
            for outcome in self.publish(now).await {
                if outcome.summary.errors > 0 || outcome.claim_error.is_some() {
                    warn!(?outcome, "publish pass completed with errors");
                } else if outcome.summary.applied > 0 {
                    info!(?outcome, "publish pass completed");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishSummary {
    pub applied: u64,
    pub warnings: u64,
    pub errors: u64,
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub collection: String,
    pub summary: PublishSummary,
    pub claim_error: Option<String>,
}
