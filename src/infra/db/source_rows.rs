use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    application::repos::{ClaimResult, ClaimRowParams, RepoError, SourceRowsRepo},
    domain::entities::SourceRowRecord,
};

use super::{PostgresRepositories, generation::insert_job_with_email, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SourceRowRow {
    template_id: String,
    content_hash: String,
    job_id: String,
    row_offset: i64,
    row_created_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    processed_at: Option<OffsetDateTime>,
}

impl From<SourceRowRow> for SourceRowRecord {
    fn from(row: SourceRowRow) -> Self {
        Self {
            template_id: row.template_id,
            content_hash: row.content_hash,
            job_id: row.job_id,
            row_offset: row.row_offset,
            row_created_at: row.row_created_at,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

#[async_trait]
impl SourceRowsRepo for PostgresRepositories {
    async fn find_source_row(
        &self,
        template_id: &str,
        content_hash: &str,
    ) -> Result<Option<SourceRowRecord>, RepoError> {
        let row = sqlx::query_as::<_, SourceRowRow>(
            r#"
            SELECT template_id, content_hash, job_id, row_offset, row_created_at,
                   created_at, processed_at
              FROM source_rows
             WHERE template_id = $1 AND content_hash = $2
            "#,
        )
        .bind(template_id)
        .bind(content_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SourceRowRecord::from))
    }

    async fn claim_row(&self, params: ClaimRowParams) -> Result<ClaimResult, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        insert_job_with_email(&mut tx, &params.job).await?;

        // Concurrent claimers block on the key until the winner commits, then see a conflict.
        let inserted = sqlx::query(
            r#"
            INSERT INTO source_rows (template_id, content_hash, job_id, row_offset, row_created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (template_id, content_hash) DO NOTHING
            "#,
        )
        .bind(&params.job.template_id)
        .bind(&params.content_hash)
        .bind(&params.job.job_id)
        .bind(params.row_offset)
        .bind(params.row_created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            let existing = self
                .find_source_row(&params.job.template_id, &params.content_hash)
                .await?;
            debug!(
                target = "infra::db::source_rows",
                template_id = %params.job.template_id,
                row_hash = %params.content_hash,
                "Lost claim race on row content"
            );
            return Ok(ClaimResult::AlreadyClaimed {
                job_id: existing.map(|row| row.job_id),
            });
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ClaimResult::Claimed {
            job_id: params.job.job_id,
        })
    }

    async fn mark_row_processed(
        &self,
        job_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE source_rows SET processed_at = $2 WHERE job_id = $1 AND processed_at IS NULL",
        )
        .bind(job_id)
        .bind(processed_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
