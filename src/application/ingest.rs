//! Row ingestion and deduplication: claim a unit of input exactly once before any work
//! happens on it.

use sha2::{Digest, Sha256};
use time::{OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339, macros::format_description};
use tracing::info;

use crate::{
    application::{
        error::{PipelineError, UnitOutcome},
        pipeline::context::PipelineContext,
        render::markup::{TokenSet, attachment_file_name, fill_plain},
        repos::{ClaimResult, ClaimRowParams, NewJobParams},
    },
    domain::{
        entities::{InvoiceRecord, JobInput, TemplateRecord},
        error::DomainError,
        types::ExecutionStrategy,
    },
};

/// Separator placed between canonical cell values before hashing.
pub const HASH_DELIMITER: &str = "|";

/// Column holding the form submission timestamp on sheet-backed templates.
const TIMESTAMP_COLUMN: usize = 0;

/// Render a loosely-typed cell the same way regardless of how the source typed it.
pub fn canonical_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Bool(true) => "TRUE".to_string(),
        serde_json::Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

/// SHA-256 (hex) over the cells joined by [`HASH_DELIMITER`].
pub fn row_content_hash(cells: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cells.join(HASH_DELIMITER).as_bytes());
    hex::encode(hasher.finalize())
}

/// Parse a form timestamp cell (`10/19/2026 14:03:22`, or RFC 3339). Form timestamps carry
/// no offset and are taken as UTC.
pub fn parse_row_timestamp(cell: &str) -> Option<OffsetDateTime> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(parsed) = OffsetDateTime::parse(cell, &Rfc3339) {
        return Some(parsed);
    }
    let format = format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"
    );
    PrimitiveDateTime::parse(cell, format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Fetch the row at `offset` for `template` and claim it under `job_id`, owned by
/// `strategy` from here on.
///
/// An already-known row content is a no-op; an empty or header-only fetch is an error.
pub async fn claim_row(
    ctx: &PipelineContext,
    template: &TemplateRecord,
    offset: u64,
    job_id: &str,
    strategy: ExecutionStrategy,
) -> Result<UnitOutcome, PipelineError> {
    let sheet = template
        .sheet
        .as_ref()
        .ok_or_else(|| DomainError::template(&template.id, "no source sheet"))?;

    let fetched = ctx.tabular.fetch_row(sheet, offset).await?;
    let row = match fetched.row {
        Some(row) if !fetched.header.is_empty() && row.iter().any(|cell| !cell.is_null()) => row,
        _ => {
            return Err(PipelineError::NothingToProcess {
                template_id: template.id.clone(),
                offset,
            });
        }
    };

    let cells: Vec<String> = row.iter().map(canonical_cell).collect();
    let content_hash = row_content_hash(&cells);

    if let Some(existing) = ctx
        .source_rows
        .find_source_row(&template.id, &content_hash)
        .await?
    {
        info!(
            target = "application::ingest",
            op = "claim_row",
            result = "already_claimed",
            template_id = %template.id,
            row_offset = offset,
            row_hash = %content_hash,
            job_id = %existing.job_id,
            "Row content already claimed"
        );
        return Ok(UnitOutcome::AlreadyClaimed {
            job_id: Some(existing.job_id),
        });
    }

    let tokens = TokenSet::from_row(&fetched.header, &cells);
    let row_created_at = cells
        .get(TIMESTAMP_COLUMN)
        .and_then(|cell| parse_row_timestamp(cell));
    let params = ClaimRowParams {
        content_hash: content_hash.clone(),
        row_offset: i64::try_from(offset)
            .map_err(|_| DomainError::validation(format!("row offset {offset} out of range")))?,
        row_created_at,
        job: new_job_params(
            template,
            job_id,
            strategy,
            &template.recipient,
            JobInput::SheetRow {
                row_offset: offset,
                headers: fetched.header.clone(),
                cells,
            },
            &tokens,
        ),
    };

    let outcome = match ctx.source_rows.claim_row(params).await? {
        ClaimResult::Claimed { job_id } => UnitOutcome::Processed { job_id },
        ClaimResult::AlreadyClaimed { job_id } => UnitOutcome::AlreadyClaimed { job_id },
    };

    info!(
        target = "application::ingest",
        op = "claim_row",
        result = outcome.as_str(),
        template_id = %template.id,
        row_offset = offset,
        row_hash = %content_hash,
        job_id,
        "Row claim finished"
    );

    Ok(outcome)
}

/// Claim a ready invoice under `job_id`. Losing the race to another instance is a no-op.
pub async fn claim_invoice(
    ctx: &PipelineContext,
    invoice: &InvoiceRecord,
    job_id: &str,
    strategy: ExecutionStrategy,
) -> Result<UnitOutcome, PipelineError> {
    if invoice.processed_at.is_some() {
        return Ok(UnitOutcome::AlreadyClaimed {
            job_id: invoice.job_id.clone(),
        });
    }

    let template = ctx
        .templates
        .find_template(&invoice.template_id)
        .await?
        .ok_or_else(|| PipelineError::upstream_not_found("template", &invoice.template_id))?;

    let tokens = TokenSet::from_invoice(invoice)?;
    let job = new_job_params(
        &template,
        job_id,
        strategy,
        &invoice.customer_email,
        JobInput::Invoice {
            invoice_id: invoice.id,
        },
        &tokens,
    );

    let outcome = match ctx
        .invoices
        .claim_invoice(invoice.id, job, OffsetDateTime::now_utc())
        .await?
    {
        ClaimResult::Claimed { job_id } => UnitOutcome::Processed { job_id },
        ClaimResult::AlreadyClaimed { job_id } => UnitOutcome::AlreadyClaimed { job_id },
    };

    info!(
        target = "application::ingest",
        op = "claim_invoice",
        result = outcome.as_str(),
        invoice_id = %invoice.id,
        invoice_number = %invoice.number,
        job_id,
        "Invoice claim finished"
    );

    Ok(outcome)
}

fn new_job_params(
    template: &TemplateRecord,
    job_id: &str,
    strategy: ExecutionStrategy,
    to_address: &str,
    input: JobInput,
    tokens: &TokenSet,
) -> NewJobParams {
    NewJobParams {
        job_id: job_id.to_string(),
        template_id: template.id.clone(),
        input,
        strategy,
        to_address: to_address.to_string(),
        cc: template.cc.clone(),
        subject: fill_plain(&template.subject_template, tokens),
        attachment_name: attachment_file_name(&fill_plain(
            &template.attachment_name_template,
            tokens,
        )),
        body_text: template.body_text.clone(),
    }
}
