use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{OutboundEmailsRepo, RepoError},
    domain::{entities::OutboundEmailRecord, types::ExecutionStrategy},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct OutboundEmailRow {
    id: String,
    to_address: String,
    cc: Option<String>,
    subject: String,
    attachment_name: String,
    body_text: Option<String>,
    created_at: OffsetDateTime,
    processed_at: Option<OffsetDateTime>,
}

impl From<OutboundEmailRow> for OutboundEmailRecord {
    fn from(row: OutboundEmailRow) -> Self {
        Self {
            id: row.id,
            to_address: row.to_address,
            cc: row.cc,
            subject: row.subject,
            attachment_name: row.attachment_name,
            body_text: row.body_text,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

#[async_trait]
impl OutboundEmailsRepo for PostgresRepositories {
    async fn find_email(&self, id: &str) -> Result<Option<OutboundEmailRecord>, RepoError> {
        let row = sqlx::query_as::<_, OutboundEmailRow>(
            r#"
            SELECT id, to_address, cc, subject, attachment_name, body_text,
                   created_at, processed_at
              FROM outbound_emails
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(OutboundEmailRecord::from))
    }

    async fn oldest_deliverable_email(
        &self,
        strategy: ExecutionStrategy,
    ) -> Result<Option<OutboundEmailRecord>, RepoError> {
        let row = sqlx::query_as::<_, OutboundEmailRow>(
            r#"
            SELECT e.id, e.to_address, e.cc, e.subject, e.attachment_name, e.body_text,
                   e.created_at, e.processed_at
              FROM outbound_emails e
              JOIN generation_jobs j ON j.id = e.id
             WHERE e.processed_at IS NULL
               AND j.processed_at IS NOT NULL
               AND j.strategy = $1
             ORDER BY e.created_at, e.id
             LIMIT 1
            "#,
        )
        .bind(strategy.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(OutboundEmailRecord::from))
    }

    async fn mark_email_processed(
        &self,
        id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE outbound_emails SET processed_at = $2 WHERE id = $1 AND processed_at IS NULL",
        )
        .bind(id)
        .bind(processed_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}
