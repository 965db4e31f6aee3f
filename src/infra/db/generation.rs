//! Rows created together when a unit of input is claimed.

use sqlx::{Postgres, Transaction, types::Json};

use crate::application::repos::{NewJobParams, RepoError};

use super::map_sqlx_error;

/// Insert the generation job and its outbound email inside the claiming transaction.
pub(super) async fn insert_job_with_email(
    tx: &mut Transaction<'_, Postgres>,
    job: &NewJobParams,
) -> Result<(), RepoError> {
    sqlx::query(
        "INSERT INTO generation_jobs (id, template_id, input, strategy) VALUES ($1, $2, $3, $4)",
    )
    .bind(&job.job_id)
    .bind(&job.template_id)
    .bind(Json(&job.input))
    .bind(job.strategy.as_str())
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    sqlx::query(
        r#"
        INSERT INTO outbound_emails (id, to_address, cc, subject, attachment_name, body_text)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&job.job_id)
    .bind(&job.to_address)
    .bind(&job.cc)
    .bind(&job.subject)
    .bind(&job.attachment_name)
    .bind(&job.body_text)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}
