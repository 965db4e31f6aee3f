//! One unit of work per polling worker: pick the oldest eligible item and advance it.

use tracing::{debug, info, warn};

use crate::{
    application::{
        compile::{CompileOutcome, compile_job},
        delivery::deliver_email,
        error::{PipelineError, UnitOutcome},
        ingest::{claim_invoice, claim_row},
        pipeline::context::PipelineContext,
        render::{RenderOutcome, render_job},
    },
    domain::{entities::TemplateRecord, error::DomainError, types::ExecutionStrategy},
};

/// Blank rows one unit may step over for a single template before yielding.
const MAX_BLANK_ROWS_PER_UNIT: usize = 32;

/// Claim the next new row of the first sheet-backed template that has one.
///
/// A failing template is logged and passed over; its error is returned only when no other
/// template produced an outcome.
pub async fn ingest_next_row(ctx: &PipelineContext) -> Result<UnitOutcome, PipelineError> {
    let mut first_error = None;
    for template in ctx.templates.list_sheet_templates().await? {
        match ingest_template_row(ctx, &template).await {
            Ok(Some(outcome)) => return Ok(outcome),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    target = "application::pipeline::units",
                    op = "ingest_next_row",
                    template_id = %template.id,
                    error_code = err.code(),
                    error = %err,
                    "Row ingestion failed for template"
                );
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(UnitOutcome::NoWork),
    }
}

/// Claim the row under the template's cursor, stepping over blank rows that have
/// populated rows after them. `None` once the sheet is exhausted.
async fn ingest_template_row(
    ctx: &PipelineContext,
    template: &TemplateRecord,
) -> Result<Option<UnitOutcome>, PipelineError> {
    let mut offset = ctx.cursors.next_offset(&template.id).await?;

    for _ in 0..=MAX_BLANK_ROWS_PER_UNIT {
        let job_id = ctx.new_job_id();
        match claim_row(ctx, template, offset, &job_id, ExecutionStrategy::Polling).await {
            Ok(outcome) => {
                ctx.cursors.advance_past(&template.id, offset).await?;
                return Ok(Some(outcome));
            }
            Err(PipelineError::NothingToProcess { .. }) => {
                let more = match &template.sheet {
                    Some(sheet) => ctx.tabular.has_rows_after(sheet, offset).await?,
                    None => false,
                };
                if !more {
                    debug!(
                        target = "application::pipeline::units",
                        op = "ingest_next_row",
                        template_id = %template.id,
                        row_offset = offset,
                        "No new row for template"
                    );
                    return Ok(None);
                }

                info!(
                    target = "application::pipeline::units",
                    op = "ingest_next_row",
                    result = "blank_row_skipped",
                    template_id = %template.id,
                    row_offset = offset,
                    "Skipping blank row"
                );
                ctx.cursors.advance_past(&template.id, offset).await?;
                offset = offset.checked_add(1).ok_or_else(|| {
                    DomainError::validation(format!("row offset {offset} out of range"))
                })?;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(None)
}

pub async fn intake_next_invoice(ctx: &PipelineContext) -> Result<UnitOutcome, PipelineError> {
    let Some(invoice) = ctx.invoices.oldest_ready_invoice().await? else {
        return Ok(UnitOutcome::NoWork);
    };
    claim_invoice(
        ctx,
        &invoice,
        &ctx.new_job_id(),
        ExecutionStrategy::Polling,
    )
    .await
}

pub async fn generate_next_document(ctx: &PipelineContext) -> Result<UnitOutcome, PipelineError> {
    let Some(job) = ctx
        .jobs
        .oldest_unprocessed_job(ExecutionStrategy::Polling)
        .await?
    else {
        return Ok(UnitOutcome::NoWork);
    };
    generate_document(ctx, &job.id).await
}

/// Render the job and, for markup templates, compile it.
pub async fn generate_document(
    ctx: &PipelineContext,
    job_id: &str,
) -> Result<UnitOutcome, PipelineError> {
    let processed = UnitOutcome::Processed {
        job_id: job_id.to_string(),
    };
    match render_job(ctx, job_id).await? {
        RenderOutcome::AlreadyProcessed => Ok(UnitOutcome::AlreadyProcessed {
            job_id: job_id.to_string(),
        }),
        RenderOutcome::Composed { .. } | RenderOutcome::Rejected { .. } => Ok(processed),
        RenderOutcome::SourceReady { .. } => match compile_job(ctx, job_id).await? {
            CompileOutcome::AlreadyProcessed => Ok(UnitOutcome::AlreadyProcessed {
                job_id: job_id.to_string(),
            }),
            CompileOutcome::Finished(_) => Ok(processed),
        },
    }
}

pub async fn deliver_next_email(ctx: &PipelineContext) -> Result<UnitOutcome, PipelineError> {
    let Some(email) = ctx
        .emails
        .oldest_deliverable_email(ExecutionStrategy::Polling)
        .await?
    else {
        return Ok(UnitOutcome::NoWork);
    };
    deliver_email(ctx, &email.id).await
}
