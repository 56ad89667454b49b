use std::sync::Arc;
use std::time::Duration;

use revision_core::{ActivityObserver, CoreResult, RevisionStack};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::instrument;

/// Owns the connection pool and hands out [`RevisionStack`]s for whichever
/// collection a request names. There is no fixed migration set here: each
/// stack creates its own master/revisions tables on first use.
pub struct ServerDatabase {
    pool: PgPool,
    observer: Option<Arc<dyn ActivityObserver>>,
}

impl ServerDatabase {
    #[instrument(skip(database_url))]
    pub async fn new(database_url: &str, max_connections: u32) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .max_lifetime(Duration::from_secs(30 * 60))
            .idle_timeout(Duration::from_secs(10 * 60))
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            observer: None,
        })
    }

    /// Attach an [`ActivityObserver`] that every stack handed out from this
    /// point on will narrate its claims, applies, and lazy migrations to.
    pub fn with_observer(mut self, observer: Arc<dyn ActivityObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Build (and lazily table-create) a stack for `collection`. Cheap: a
    /// stack is a thin handle over two table names plus the shared pool.
    #[instrument(skip(self))]
    pub async fn stack(&self, collection: &str) -> CoreResult<Arc<RevisionStack>> {
        let mut stack = RevisionStack::new(self.pool.clone(), collection.to_string());
        if let Some(obs) = &self.observer {
            stack = stack.with_observer(obs.clone());
        }
        stack.ensure_tables().await?;
        Ok(Arc::new(stack))
    }
}
