pub mod activity;
pub mod config;
pub mod errors;
pub mod id;
pub mod patch;
pub mod publisher;
pub mod revision;
pub mod stack;
pub mod store;

pub use activity::ActivityObserver;
pub use config::{Settings, SchedulerSettings};
pub use errors::{CoreError, CoreResult};
pub use id::DocId;
pub use publisher::{Publisher, PublishOutcome, PublishSummary};
pub use revision::{RevisionAction, RevisionRecord, REVISION_SCHEMA};
pub use stack::{ApplyOutcome, RevisionStack};
pub use store::{DeleteOutcome, Filter, SortDirection, Store, UpdateOutcome};
