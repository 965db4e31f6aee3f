use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, WorkflowStepsRepo},
    domain::entities::WorkflowStepRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct WorkflowStepRow {
    instance_id: String,
    step: String,
    output: serde_json::Value,
    completed_at: OffsetDateTime,
}

#[async_trait]
impl WorkflowStepsRepo for PostgresRepositories {
    async fn find_step(
        &self,
        instance_id: &str,
        step: &str,
    ) -> Result<Option<WorkflowStepRecord>, RepoError> {
        let row = sqlx::query_as::<_, WorkflowStepRow>(
            r#"
            SELECT instance_id, step, output, completed_at
              FROM workflow_steps
             WHERE instance_id = $1 AND step = $2
            "#,
        )
        .bind(instance_id)
        .bind(step)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| WorkflowStepRecord {
            instance_id: row.instance_id,
            step: row.step,
            output: row.output,
            completed_at: row.completed_at,
        }))
    }

    async fn record_step(
        &self,
        instance_id: &str,
        step: &str,
        output: serde_json::Value,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_steps (instance_id, step, output)
            VALUES ($1, $2, $3)
            ON CONFLICT (instance_id, step) DO NOTHING
            "#,
        )
        .bind(instance_id)
        .bind(step)
        .bind(output)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
