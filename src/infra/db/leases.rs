use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{LeasesRepo, RepoError},
    domain::entities::LeaseRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct LeaseRow {
    worker_name: String,
    last_executed_at: OffsetDateTime,
    execution_count: i64,
}

#[async_trait]
impl LeasesRepo for PostgresRepositories {
    async fn load_lease(&self, worker_name: &str) -> Result<LeaseRecord, RepoError> {
        sqlx::query(
            "INSERT INTO background_leases (worker_name) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(worker_name)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, LeaseRow>(
            r#"
            SELECT worker_name, last_executed_at, execution_count
              FROM background_leases
             WHERE worker_name = $1
            "#,
        )
        .bind(worker_name)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(LeaseRecord {
            worker_name: row.worker_name,
            last_executed_at: row.last_executed_at,
            execution_count: row.execution_count,
        })
    }

    async fn try_advance_lease(
        &self,
        worker_name: &str,
        expected: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE background_leases
               SET last_executed_at = $3
             WHERE worker_name = $1
               AND last_executed_at = $2
               AND $3 >= $2
            "#,
        )
        .bind(worker_name)
        .bind(expected)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_execution(&self, worker_name: &str) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE background_leases SET execution_count = execution_count + 1 WHERE worker_name = $1",
        )
        .bind(worker_name)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
