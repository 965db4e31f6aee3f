use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    application::repos::{ClaimResult, InvoicesRepo, NewJobParams, RepoError},
    domain::entities::{InvoiceLineRecord, InvoiceRecord},
};

use super::{PostgresRepositories, generation::insert_job_with_email, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    template_id: String,
    number: String,
    customer_name: String,
    customer_email: String,
    currency: String,
    issued_on: Date,
    ready_for_processing: bool,
    processed_at: Option<OffsetDateTime>,
    job_id: Option<String>,
    created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct InvoiceLineRow {
    position: i32,
    title: String,
    quantity: i32,
    unit_price_cents: i64,
}

impl InvoiceRow {
    fn into_record(self, lines: Vec<InvoiceLineRow>) -> InvoiceRecord {
        InvoiceRecord {
            id: self.id,
            template_id: self.template_id,
            number: self.number,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            currency: self.currency,
            issued_on: self.issued_on,
            ready_for_processing: self.ready_for_processing,
            processed_at: self.processed_at,
            job_id: self.job_id,
            created_at: self.created_at,
            lines: lines
                .into_iter()
                .map(|line| InvoiceLineRecord {
                    position: line.position,
                    title: line.title,
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price_cents,
                })
                .collect(),
        }
    }
}

impl PostgresRepositories {
    async fn load_invoice(&self, row: InvoiceRow) -> Result<InvoiceRecord, RepoError> {
        let lines = sqlx::query_as::<_, InvoiceLineRow>(
            r#"
            SELECT position, title, quantity, unit_price_cents
              FROM invoice_lines
             WHERE invoice_id = $1
             ORDER BY position
            "#,
        )
        .bind(row.id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_record(lines))
    }
}

const INVOICE_COLUMNS: &str = "id, template_id, number, customer_name, customer_email, currency, \
     issued_on, ready_for_processing, processed_at, job_id, created_at";

#[async_trait]
impl InvoicesRepo for PostgresRepositories {
    async fn find_invoice(&self, id: Uuid) -> Result<Option<InvoiceRecord>, RepoError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1");
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => self.load_invoice(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn oldest_ready_invoice(&self) -> Result<Option<InvoiceRecord>, RepoError> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE ready_for_processing AND processed_at IS NULL \
             ORDER BY created_at, id LIMIT 1"
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => self.load_invoice(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn claim_invoice(
        &self,
        invoice_id: Uuid,
        job: NewJobParams,
        claimed_at: OffsetDateTime,
    ) -> Result<ClaimResult, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let claimed = sqlx::query(
            r#"
            UPDATE invoices
               SET processed_at = $2,
                   job_id = $3
             WHERE id = $1
               AND ready_for_processing
               AND processed_at IS NULL
            "#,
        )
        .bind(invoice_id)
        .bind(claimed_at)
        .bind(&job.job_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            let owner = sqlx::query_scalar::<_, Option<String>>(
                "SELECT job_id FROM invoices WHERE id = $1",
            )
            .bind(invoice_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .flatten();
            return Ok(ClaimResult::AlreadyClaimed { job_id: owner });
        }

        insert_job_with_email(&mut tx, &job).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ClaimResult::Claimed { job_id: job.job_id })
    }
}
