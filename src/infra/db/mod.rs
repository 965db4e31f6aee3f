//! Postgres-backed repository implementations.

mod cursors;
mod emails;
mod generation;
mod invoices;
mod jobs;
mod leases;
mod source_rows;
mod steps;
mod templates;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use apalis_sql::postgres::PostgresStorage;
use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
};

use crate::infra::error::InfraError;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Apply the pipeline schema, then install the job queue schema.
    ///
    /// Both migrators share one history table, so each ignores the other's versions.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), InfraError> {
        let mut pipeline = sqlx::migrate!("./migrations");
        pipeline.set_ignore_missing(true);
        pipeline.run(pool).await?;

        let mut queue = PostgresStorage::migrations();
        queue.set_ignore_missing(true);
        queue
            .run(pool)
            .await
            .map_err(|err| InfraError::queue(format!("failed to install queue schema: {err}")))
    }
}
