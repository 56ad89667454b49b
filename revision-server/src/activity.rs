use chrono::Local;
use colored::*;
use revision_core::{ActivityObserver, ApplyOutcome, DocId, PublishSummary};
use tokio::sync::mpsc;
use tracing::info;

/// One notable thing that happened during a publish pass, fed to the
/// colorized activity feed rather than logged inline so the publisher loop
/// itself stays free of display concerns.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    Pushed {
        collection: String,
        master_id: String,
    },
    Applied {
        collection: String,
        master_id: String,
        revision_id: String,
    },
    AppliedWithWarning {
        collection: String,
        master_id: String,
        revision_id: String,
        reason: String,
    },
    Failed {
        collection: String,
        master_id: String,
        revision_id: String,
        error: String,
    },
    PassCompleted {
        collection: String,
        summary: PublishSummary,
    },
    RevisionClaimed {
        collection: String,
        count: usize,
    },
    LazyMigration {
        collection: String,
        master_id: String,
    },
}

#[derive(Clone)]
pub struct ActivitySink {
    tx: mpsc::Sender<ActivityEvent>,
}

impl ActivitySink {
    pub fn new(tx: mpsc::Sender<ActivityEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: ActivityEvent) {
        let _ = self.tx.send(event).await;
    }

    pub fn record_outcome(&self, collection: &str, outcome: &ApplyOutcome) {
        let tx = self.tx.clone();
        let event = match outcome {
            ApplyOutcome::Applied(r) => ActivityEvent::Applied {
                collection: collection.to_string(),
                master_id: r.master_id.to_hex(),
                revision_id: r.id.to_hex(),
            },
            ApplyOutcome::AppliedWithWarning(r, reason) => ActivityEvent::AppliedWithWarning {
                collection: collection.to_string(),
                master_id: r.master_id.to_hex(),
                revision_id: r.id.to_hex(),
                reason: reason.clone(),
            },
            ApplyOutcome::StructuralError(r, err) => ActivityEvent::Failed {
                collection: collection.to_string(),
                master_id: r.master_id.to_hex(),
                revision_id: r.id.to_hex(),
                error: err.to_string(),
            },
        };
        tokio::spawn(async move {
            let _ = tx.send(event).await;
        });
    }
}

impl ActivityObserver for ActivitySink {
    fn on_claimed(&self, collection: &str, count: usize) {
        if count == 0 {
            return;
        }
        let tx = self.tx.clone();
        let collection = collection.to_string();
        tokio::spawn(async move {
            let _ = tx.send(ActivityEvent::RevisionClaimed { collection, count }).await;
        });
    }

    fn on_apply(&self, collection: &str, outcome: &ApplyOutcome) {
        self.record_outcome(collection, outcome);
    }

    fn on_pass_completed(&self, collection: &str, summary: PublishSummary) {
        let tx = self.tx.clone();
        let collection = collection.to_string();
        tokio::spawn(async move {
            let _ = tx.send(ActivityEvent::PassCompleted { collection, summary }).await;
        });
    }

    fn on_lazy_migration(&self, collection: &str, master_id: &DocId) {
        let tx = self.tx.clone();
        let collection = collection.to_string();
        let master_id = master_id.to_hex();
        tokio::spawn(async move {
            let _ = tx.send(ActivityEvent::LazyMigration { collection, master_id }).await;
        });
    }
}

pub fn spawn_activity_sink(mut rx: mpsc::Receiver<ActivityEvent>) {
    tokio::spawn(async move {
        info!("");
        info!("{}", "Activity Log:".bold());
        info!("{}", "-".repeat(80).dimmed());

        while let Some(event) = rx.recv().await {
            let timestamp = Local::now().format("%H:%M:%S%.3f");

            match event {
                ActivityEvent::Pushed {
                    collection,
                    master_id,
                } => {
                    info!(
                        "{} {} scheduled revision for {}/{}",
                        timestamp.to_string().dimmed(),
                        "+".green().bold(),
                        collection.cyan(),
                        master_id.yellow()
                    );
                }
                ActivityEvent::Applied {
                    collection,
                    master_id,
                    revision_id,
                } => {
                    info!(
                        "{} {} applied {} for {}/{}",
                        timestamp.to_string().dimmed(),
                        "=>".green().bold(),
                        revision_id.white(),
                        collection.cyan(),
                        master_id.yellow()
                    );
                }
                ActivityEvent::AppliedWithWarning {
                    collection,
                    master_id,
                    revision_id,
                    reason,
                } => {
                    info!(
                        "{} {} applied {} for {}/{} with a warning: {}",
                        timestamp.to_string().dimmed(),
                        "!".yellow().bold(),
                        revision_id.white(),
                        collection.cyan(),
                        master_id.yellow(),
                        reason.yellow()
                    );
                }
                ActivityEvent::Failed {
                    collection,
                    master_id,
                    revision_id,
                    error,
                } => {
                    info!(
                        "{} {} failed {} for {}/{}: {}",
                        timestamp.to_string().dimmed(),
                        "x".red().bold(),
                        revision_id.white(),
                        collection.cyan(),
                        master_id.yellow(),
                        error.red()
                    );
                }
                ActivityEvent::PassCompleted { collection, summary } => {
                    info!(
                        "{} {} {} pass: {} applied, {} warnings, {} errors",
                        timestamp.to_string().dimmed(),
                        "*".blue().bold(),
                        collection.cyan(),
                        summary.applied,
                        summary.warnings,
                        summary.errors
                    );
                }
                ActivityEvent::RevisionClaimed { collection, count } => {
                    info!(
                        "{} {} claimed {} due revision(s) in {}",
                        timestamp.to_string().dimmed(),
                        "~".blue().bold(),
                        count,
                        collection.cyan()
                    );
                }
                ActivityEvent::LazyMigration {
                    collection,
                    master_id,
                } => {
                    info!(
                        "{} {} lazily migrated {}/{} into the revision log",
                        timestamp.to_string().dimmed(),
                        "^".magenta().bold(),
                        collection.cyan(),
                        master_id.yellow()
                    );
                }
            }
        }
    });
}
