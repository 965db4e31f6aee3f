//! Orchestrated execution: one queued workflow instance per unit of work, with every
//! completed activity written to a step log so a replay resumes where it stopped.

use std::{future::Future, sync::Arc, time::Instant};

use apalis::prelude::{Data, Error as ApalisError};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        compile::{CompileOutcome, compile_job},
        delivery::deliver_email,
        error::{PipelineError, UnitOutcome},
        ingest::{claim_invoice, claim_row},
        pipeline::{context::PipelineContext, with_deadline},
        render::{RenderOutcome, render_job},
        repos::{NewQueueJob, QueueRepo, RepoError},
    },
    domain::{
        error::DomainError,
        types::{ExecutionStrategy, JobType, WorkflowStep},
    },
    infra::telemetry::{METRIC_UNIT_MS, METRIC_UNITS_TOTAL},
};

/// Queue-level attempts before a workflow instance is given up.
pub const WORKFLOW_MAX_ATTEMPTS: i32 = 3;
const WORKFLOW_PRIORITY: i32 = 0;

/// The unit of work a workflow instance drives to delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum WorkflowUnit {
    SheetRow { template_id: String, offset: u64 },
    Invoice { invoice_id: Uuid },
}

impl WorkflowUnit {
    /// Deterministic instance id, so re-enqueueing the same unit names the same instance.
    pub fn instance_id(&self) -> String {
        match self {
            WorkflowUnit::SheetRow {
                template_id,
                offset,
            } => format!("row-{template_id}-{offset}"),
            WorkflowUnit::Invoice { invoice_id } => format!("invoice-{invoice_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentWorkflowPayload {
    pub instance_id: String,
    pub unit: WorkflowUnit,
}

impl DocumentWorkflowPayload {
    pub fn new(unit: WorkflowUnit) -> Self {
        Self {
            instance_id: unit.instance_id(),
            unit,
        }
    }
}

pub async fn enqueue_document_workflow(
    queue: &dyn QueueRepo,
    unit: WorkflowUnit,
    run_at: Option<OffsetDateTime>,
) -> Result<String, RepoError> {
    let payload = serde_json::to_value(DocumentWorkflowPayload::new(unit))
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    queue
        .enqueue_job(NewQueueJob {
            job_type: JobType::DocumentWorkflow,
            payload,
            run_at: run_at.unwrap_or_else(OffsetDateTime::now_utc),
            max_attempts: WORKFLOW_MAX_ATTEMPTS,
            priority: WORKFLOW_PRIORITY,
        })
        .await
}

/// What one run of an instance did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub instance_id: String,
    pub job_id: Option<String>,
    /// Activities run during this invocation.
    pub executed: Vec<WorkflowStep>,
    /// Activities whose recorded output was reused.
    pub replayed: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClaimStep {
    job_id: Option<String>,
    outcome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RenderStep {
    outcome: String,
    needs_compile: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompileStep {
    successful: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeliverStep {
    outcome: String,
}

/// Run (or resume) the instance: claim, render, compile for markup, deliver.
pub async fn run_workflow(
    ctx: &PipelineContext,
    payload: &DocumentWorkflowPayload,
) -> Result<WorkflowReport, PipelineError> {
    let instance_id = payload.instance_id.as_str();
    let mut report = WorkflowReport {
        instance_id: instance_id.to_string(),
        job_id: None,
        executed: Vec::new(),
        replayed: Vec::new(),
    };

    let unit = &payload.unit;
    let claim = run_step(ctx, instance_id, WorkflowStep::Claim, &mut report, move || {
        claim_activity(ctx, unit)
    })
    .await?;
    let Some(job_id) = claim.job_id else {
        info!(
            target = "application::pipeline::workflow",
            op = "run_workflow",
            result = "claimed_elsewhere",
            instance_id,
            "Unit owned by another instance; nothing left to do"
        );
        return Ok(report);
    };
    report.job_id = Some(job_id.clone());
    let job_id = job_id.as_str();

    let render = run_step(
        ctx,
        instance_id,
        WorkflowStep::Render,
        &mut report,
        move || async move {
            let outcome = render_job(ctx, job_id).await?;
            Ok(RenderStep {
                outcome: outcome.as_str().to_string(),
                needs_compile: matches!(outcome, RenderOutcome::SourceReady { .. }),
            })
        },
    )
    .await?;

    if render.needs_compile {
        run_step(
            ctx,
            instance_id,
            WorkflowStep::Compile,
            &mut report,
            move || async move {
                let successful = match compile_job(ctx, job_id).await? {
                    CompileOutcome::AlreadyProcessed => None,
                    CompileOutcome::Finished(compiled) => Some(compiled.successful),
                };
                Ok(CompileStep { successful })
            },
        )
        .await?;
    }

    run_step(
        ctx,
        instance_id,
        WorkflowStep::Deliver,
        &mut report,
        move || async move {
            let outcome = deliver_email(ctx, job_id).await?;
            Ok(DeliverStep {
                outcome: outcome.as_str().to_string(),
            })
        },
    )
    .await?;

    Ok(report)
}

async fn claim_activity(
    ctx: &PipelineContext,
    unit: &WorkflowUnit,
) -> Result<ClaimStep, PipelineError> {
    let outcome = match unit {
        WorkflowUnit::SheetRow {
            template_id,
            offset,
        } => {
            let template = ctx
                .templates
                .find_template(template_id)
                .await?
                .ok_or_else(|| PipelineError::upstream_not_found("template", template_id))?;
            claim_row(
                ctx,
                &template,
                *offset,
                &ctx.new_job_id(),
                ExecutionStrategy::Workflow,
            )
            .await?
        }
        WorkflowUnit::Invoice { invoice_id } => {
            let invoice = ctx
                .invoices
                .find_invoice(*invoice_id)
                .await?
                .ok_or_else(|| {
                    PipelineError::upstream_not_found("invoice", invoice_id.to_string())
                })?;
            claim_invoice(
                ctx,
                &invoice,
                &ctx.new_job_id(),
                ExecutionStrategy::Workflow,
            )
            .await?
        }
    };

    let job_id = match &outcome {
        UnitOutcome::Processed { job_id } | UnitOutcome::AlreadyProcessed { job_id } => {
            Some(job_id.clone())
        }
        UnitOutcome::AlreadyClaimed { job_id: Some(job_id) } => {
            workflow_owned(ctx, job_id).await?.then(|| job_id.clone())
        }
        UnitOutcome::AlreadyClaimed { job_id: None } | UnitOutcome::NoWork => None,
    };

    Ok(ClaimStep {
        job_id,
        outcome: outcome.as_str().to_string(),
    })
}

/// Jobs claimed by the polling workers stay with them; a workflow only resumes its own.
async fn workflow_owned(ctx: &PipelineContext, job_id: &str) -> Result<bool, PipelineError> {
    let owner = ctx
        .jobs
        .find_job(job_id)
        .await?
        .map(|job| job.strategy)
        .ok_or_else(|| PipelineError::upstream_not_found("generation job", job_id))?;
    if owner != ExecutionStrategy::Workflow {
        info!(
            target = "application::pipeline::workflow",
            op = "claim",
            result = "owned_by_polling",
            job_id,
            "Unit belongs to the polling workers"
        );
    }
    Ok(owner == ExecutionStrategy::Workflow)
}

/// Reuse the recorded output of `step`, or run `activity` under the retry policy and
/// record its output before returning it.
async fn run_step<T, F, Fut>(
    ctx: &PipelineContext,
    instance_id: &str,
    step: WorkflowStep,
    report: &mut WorkflowReport,
    activity: F,
) -> Result<T, PipelineError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    if let Some(record) = ctx.steps.find_step(instance_id, step.as_str()).await? {
        let output = serde_json::from_value(record.output).map_err(|err| {
            DomainError::invariant(format!(
                "recorded `{}` output for `{instance_id}` is unreadable: {err}",
                step.as_str()
            ))
        })?;
        report.replayed.push(step);
        return Ok(output);
    }

    let output = ctx
        .options
        .retry
        .run(step.as_str(), &ctx.rng, activity)
        .await?;
    let value = serde_json::to_value(&output).map_err(|err| {
        DomainError::invariant(format!("`{}` output is not serialisable: {err}", step.as_str()))
    })?;
    ctx.steps.record_step(instance_id, step.as_str(), value).await?;
    report.executed.push(step);
    Ok(output)
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}

/// Queue handler for [`JobType::DocumentWorkflow`].
pub async fn process_document_workflow(
    payload: DocumentWorkflowPayload,
    context: Data<PipelineContext>,
) -> Result<(), ApalisError> {
    let started_at = Instant::now();
    let ctx = &*context;
    let result = with_deadline(ctx.options.unit_deadline, run_workflow(ctx, &payload)).await;
    let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_UNIT_MS, "worker" => "workflow").record(elapsed_ms);

    match result {
        Ok(report) => {
            counter!(METRIC_UNITS_TOTAL, "worker" => "workflow", "result" => "ok").increment(1);
            info!(
                target = "application::pipeline::workflow",
                op = "process_document_workflow",
                result = "ok",
                instance_id = %report.instance_id,
                job_id = report.job_id.as_deref().unwrap_or_default(),
                executed = report.executed.len(),
                replayed = report.replayed.len(),
                elapsed_ms = elapsed_ms as u64,
                "Workflow instance completed"
            );
            Ok(())
        }
        Err(err) => {
            counter!(METRIC_UNITS_TOTAL, "worker" => "workflow", "result" => "error").increment(1);
            warn!(
                target = "application::pipeline::workflow",
                op = "process_document_workflow",
                result = "error",
                instance_id = %payload.instance_id,
                error_code = err.code(),
                error = %err,
                elapsed_ms = elapsed_ms as u64,
                "Workflow instance failed"
            );
            Err(job_failed(err))
        }
    }
}
