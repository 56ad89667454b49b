pub mod activity;
pub mod api;
pub mod database;
pub mod errors;

use std::sync::Arc;

use activity::ActivitySink;
use database::ServerDatabase;
use revision_core::Settings;

pub use errors::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<ServerDatabase>,
    pub activity: Option<ActivitySink>,
    pub settings: Arc<Settings>,
}
