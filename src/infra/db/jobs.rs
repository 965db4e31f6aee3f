use std::convert::TryFrom;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{FinishJobParams, GenerationJobsRepo, NewQueueJob, QueueRepo, RepoError},
    domain::{
        entities::{GenerationJobRecord, JobInput},
        types::ExecutionStrategy,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const JOB_COLUMNS: &str =
    "id, template_id, input, strategy, created_at, processed_at, successful, artifact_path";

#[derive(sqlx::FromRow)]
struct GenerationJobRow {
    id: String,
    template_id: String,
    input: serde_json::Value,
    strategy: String,
    created_at: OffsetDateTime,
    processed_at: Option<OffsetDateTime>,
    successful: Option<bool>,
    artifact_path: Option<String>,
}

impl TryFrom<GenerationJobRow> for GenerationJobRecord {
    type Error = RepoError;

    fn try_from(row: GenerationJobRow) -> Result<Self, Self::Error> {
        let input: JobInput = serde_json::from_value(row.input).map_err(|err| {
            RepoError::from_persistence(format!("job `{}` has unreadable input: {err}", row.id))
        })?;
        let strategy = ExecutionStrategy::try_from(row.strategy.as_str()).map_err(|_| {
            RepoError::from_persistence(format!(
                "job `{}` has unknown strategy `{}`",
                row.id, row.strategy
            ))
        })?;

        Ok(Self {
            id: row.id,
            template_id: row.template_id,
            input,
            strategy,
            created_at: row.created_at,
            processed_at: row.processed_at,
            successful: row.successful,
            artifact_path: row.artifact_path,
        })
    }
}

#[async_trait]
impl GenerationJobsRepo for PostgresRepositories {
    async fn find_job(&self, id: &str) -> Result<Option<GenerationJobRecord>, RepoError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1");
        sqlx::query_as::<_, GenerationJobRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(GenerationJobRecord::try_from)
            .transpose()
    }

    async fn oldest_unprocessed_job(
        &self,
        strategy: ExecutionStrategy,
    ) -> Result<Option<GenerationJobRecord>, RepoError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs \
             WHERE processed_at IS NULL AND strategy = $1 ORDER BY created_at, id LIMIT 1"
        );
        sqlx::query_as::<_, GenerationJobRow>(&sql)
            .bind(strategy.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(GenerationJobRecord::try_from)
            .transpose()
    }

    async fn finish_job(&self, params: FinishJobParams) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
               SET processed_at = $2,
                   successful = $3,
                   artifact_path = $4
             WHERE id = $1 AND processed_at IS NULL
            "#,
        )
        .bind(&params.id)
        .bind(params.processed_at)
        .bind(params.successful)
        .bind(&params.artifact_path)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl QueueRepo for PostgresRepositories {
    async fn enqueue_job(&self, job: NewQueueJob) -> Result<String, RepoError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id
            "#,
        )
        .bind(job.job_type.as_str())
        .bind(&job.payload)
        .bind("Pending")
        .bind(job.run_at)
        .bind(job.max_attempts)
        .bind(job.priority)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
