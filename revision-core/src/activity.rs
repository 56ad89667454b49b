use crate::id::DocId;
use crate::publisher::PublishSummary;
use crate::stack::ApplyOutcome;

/// Narrates stack- and publisher-level lifecycle events to whatever is
/// listening, without coupling either to a concrete transport or display.
/// Every method defaults to a no-op so an implementor only has to override
/// what it actually cares about.
pub trait ActivityObserver: Send + Sync {
    /// `count` due, unclaimed revisions were just claimed in one bulk update.
    fn on_claimed(&self, _collection: &str, _count: usize) {}

    /// A claimed revision finished going through `pop`/`pop_outcome`.
    fn on_apply(&self, _collection: &str, _outcome: &ApplyOutcome) {}

    /// A publish pass over `collection` finished.
    fn on_pass_completed(&self, _collection: &str, _summary: PublishSummary) {}

    /// A legacy document with no revision history was just migrated in.
    fn on_lazy_migration(&self, _collection: &str, _master_id: &DocId) {}
}
