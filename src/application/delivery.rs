//! Delivery of outbound emails once their generation job is finished.

use metrics::counter;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    application::{
        error::{PipelineError, UnitOutcome},
        pipeline::context::PipelineContext,
        ports::{MailAttachment, MailMessage},
    },
    domain::entities::{GenerationJobRecord, OutboundEmailRecord},
    infra::telemetry::METRIC_EMAILS_SENT_TOTAL,
};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Split a `;`/`,`-delimited address list, dropping blanks.
pub fn parse_cc(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split([';', ','])
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Subject-only notice to the primary recipient for an unsuccessful job.
pub fn failure_notice(email: &OutboundEmailRecord) -> MailMessage {
    MailMessage {
        to: email.to_address.clone(),
        cc: Vec::new(),
        subject: email.subject.clone(),
        body: None,
        attachment: None,
    }
}

/// Send the email named `email_id` and mark it processed once the transport accepted it.
pub async fn deliver_email(
    ctx: &PipelineContext,
    email_id: &str,
) -> Result<UnitOutcome, PipelineError> {
    let email = ctx
        .emails
        .find_email(email_id)
        .await?
        .ok_or_else(|| PipelineError::upstream_not_found("outbound email", email_id))?;
    if email.processed_at.is_some() {
        return Ok(UnitOutcome::AlreadyProcessed { job_id: email.id });
    }

    let job = ctx
        .jobs
        .find_job(&email.id)
        .await?
        .filter(GenerationJobRecord::is_processed)
        .ok_or_else(|| PipelineError::upstream_not_found("processed generation job", &email.id))?;

    let successful = job.successful == Some(true);
    let message = if successful {
        success_message(ctx, &email, &job).await?
    } else {
        failure_notice(&email)
    };
    let kind = if successful { "document" } else { "failure_notice" };

    ctx.mail.send(message).await?;
    counter!(METRIC_EMAILS_SENT_TOTAL, "kind" => kind).increment(1);

    let marked = ctx
        .emails
        .mark_email_processed(&email.id, OffsetDateTime::now_utc())
        .await?;

    info!(
        target = "application::delivery",
        op = "deliver_email",
        result = if marked { "sent" } else { "sent_already_marked" },
        job_id = %email.id,
        kind,
        "Outbound email delivered"
    );

    Ok(UnitOutcome::Processed { job_id: email.id })
}

async fn success_message(
    ctx: &PipelineContext,
    email: &OutboundEmailRecord,
    job: &GenerationJobRecord,
) -> Result<MailMessage, PipelineError> {
    let artifact_path = job
        .artifact_path
        .as_deref()
        .ok_or_else(|| PipelineError::upstream_not_found("artifact for job", &job.id))?;
    let data = ctx.blobs.get(artifact_path).await?;

    Ok(MailMessage {
        to: email.to_address.clone(),
        cc: parse_cc(email.cc.as_deref()),
        subject: email.subject.clone(),
        body: email.body_text.clone().filter(|body| !body.trim().is_empty()),
        attachment: Some(MailAttachment {
            filename: email.attachment_name.clone(),
            content_type: PDF_CONTENT_TYPE.to_string(),
            data,
        }),
    })
}
