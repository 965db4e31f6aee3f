//! Template rendering: turns a claimed generation job into either a filled markup
//! source awaiting compilation or a finished composed document.
//!
//! The strategy is picked from the template's document kind. State changes that close
//! a job go through [`finalize_job`], which stamps the terminal state exactly once.

pub mod compose;
pub mod markup;

use time::OffsetDateTime;
use tracing::info;

use crate::{
    application::{
        error::PipelineError, pipeline::context::PipelineContext, repos::FinishJobParams,
    },
    domain::entities::{GenerationJobRecord, JobInput},
};

pub use compose::{ComposeVariant, SubmitterCheck, check_submitter};
pub use markup::{TokenSet, attachment_file_name, escape_markup, fill_markup, fill_plain};

/// Main markup source inside a template prefix and a job's input prefix.
pub const MARKUP_SOURCE: &str = "main.tex";
/// Compiled markup artifact under a job's output prefix.
pub const MARKUP_ARTIFACT: &str = "main.pdf";
/// Composed document under a job's output prefix.
pub const COMPOSED_ARTIFACT: &str = "document.pdf";

pub fn job_input_prefix(job_id: &str) -> String {
    format!("jobs/{job_id}/input/")
}

pub fn job_output_prefix(job_id: &str) -> String {
    format!("jobs/{job_id}/output/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The job already reached its terminal state.
    AlreadyProcessed,
    /// Markup source filled at `source_path`; compilation comes next.
    SourceReady { source_path: String },
    /// Composed PDF uploaded and the job closed successfully.
    Composed { artifact_path: String },
    /// Submitter not permitted; job closed unsuccessful and its email retired.
    Rejected { submitter: String },
}

impl RenderOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderOutcome::AlreadyProcessed => "already_processed",
            RenderOutcome::SourceReady { .. } => "source_ready",
            RenderOutcome::Composed { .. } => "composed",
            RenderOutcome::Rejected { .. } => "rejected",
        }
    }
}

/// Render the job named `job_id` with its template's strategy.
pub async fn render_job(
    ctx: &PipelineContext,
    job_id: &str,
) -> Result<RenderOutcome, PipelineError> {
    let job = ctx
        .jobs
        .find_job(job_id)
        .await?
        .ok_or_else(|| PipelineError::upstream_not_found("generation job", job_id))?;
    if job.is_processed() {
        return Ok(RenderOutcome::AlreadyProcessed);
    }

    let template = ctx
        .templates
        .find_template(&job.template_id)
        .await?
        .ok_or_else(|| PipelineError::upstream_not_found("template", &job.template_id))?;

    match ComposeVariant::for_kind(template.kind) {
        Some(variant) => compose::render_composed(ctx, &job, &template, variant).await,
        None => {
            let source_path = markup::render_markup(ctx, &job, &template).await?;
            Ok(RenderOutcome::SourceReady { source_path })
        }
    }
}

/// Stamp the job's terminal state and retire its source row.
///
/// Returns `false` when another attempt closed the job first.
pub(crate) async fn finalize_job(
    ctx: &PipelineContext,
    job: &GenerationJobRecord,
    successful: bool,
    artifact_path: Option<String>,
) -> Result<bool, PipelineError> {
    let processed_at = OffsetDateTime::now_utc();
    let updated = ctx
        .jobs
        .finish_job(FinishJobParams {
            id: job.id.clone(),
            successful,
            artifact_path,
            processed_at,
        })
        .await?;

    if updated && matches!(job.input, JobInput::SheetRow { .. }) {
        ctx.source_rows
            .mark_row_processed(&job.id, processed_at)
            .await?;
    }

    info!(
        target = "application::render",
        op = "finalize_job",
        result = if updated { "finished" } else { "already_finished" },
        job_id = %job.id,
        successful,
        "Generation job finalised"
    );

    Ok(updated)
}
