//! Postgres-backed store and queue adapters.

mod conversion_jobs;
mod queue;
mod util;

pub use queue::PostgresJobQueue;
pub use util::map_sqlx_error;

use std::sync::Arc;

use apalis_sql::postgres::PostgresStorage;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

/// Conversion job store scoped to one namespace.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    namespace: String,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool: Arc::new(pool),
            namespace: namespace.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Apply the service schema and the job queue's own tables.
    ///
    /// Both migrators record into the same bookkeeping table, so each ignores
    /// versions it does not know.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator.run(pool).await?;
        PostgresStorage::setup(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
