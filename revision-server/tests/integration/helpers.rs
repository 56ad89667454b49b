use anyhow::{Context, Result};
use revision_server::database::ServerDatabase;
use uuid::Uuid;

/// Shared scaffolding for the scenario tests in this directory: a live
/// `ServerDatabase` plus a collection name unique to this run, so parallel
/// `cargo test` invocations never collide on the same Postgres tables.
pub struct TestContext {
    pub db: ServerDatabase,
    pub collection: String,
}

impl TestContext {
    pub async fn new(prefix: &str) -> Result<Self> {
        let database_url =
            std::env::var("TEST_DATABASE_URL").context("TEST_DATABASE_URL not set")?;
        let db = ServerDatabase::new(&database_url, 3)
            .await
            .context("failed to connect to the test database")?;
        let collection = format!("{}_{}", prefix, Uuid::new_v4().simple());
        Ok(Self { db, collection })
    }
}
