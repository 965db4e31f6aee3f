use async_trait::async_trait;

use crate::application::repos::{IngestCursorsRepo, RepoError};

use super::{
    PostgresRepositories, map_sqlx_error,
    util::{offset_from_db, offset_to_db},
};

#[async_trait]
impl IngestCursorsRepo for PostgresRepositories {
    async fn next_offset(&self, template_id: &str) -> Result<u64, RepoError> {
        let offset = sqlx::query_scalar::<_, i64>(
            "SELECT next_offset FROM ingest_cursors WHERE template_id = $1",
        )
        .bind(template_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        offset.map(offset_from_db).transpose().map(Option::unwrap_or_default)
    }

    async fn advance_past(&self, template_id: &str, offset: u64) -> Result<(), RepoError> {
        let next = offset_to_db(offset.saturating_add(1))?;
        sqlx::query(
            r#"
            INSERT INTO ingest_cursors (template_id, next_offset, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (template_id) DO UPDATE
               SET next_offset = GREATEST(ingest_cursors.next_offset, EXCLUDED.next_offset),
                   updated_at = now()
            "#,
        )
        .bind(template_id)
        .bind(next)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
