//! Compilation of a filled markup source and upload of everything it produced.

use std::{
    path::{Path, PathBuf},
    time::{Instant, SystemTime},
};

use bytes::Bytes;
use metrics::counter;
use tracing::{info, warn};

use crate::{
    application::{
        error::PipelineError,
        pipeline::context::PipelineContext,
        ports::CompilerPass,
        render::{
            MARKUP_ARTIFACT, MARKUP_SOURCE, finalize_job, job_input_prefix, job_output_prefix,
        },
    },
    domain::error::DomainError,
    infra::telemetry::METRIC_COMPILE_PASSES_TOTAL,
    util::paths::{safe_relative, to_blob_path},
};

/// Directory under the working directory receiving compiler stdout/stderr.
pub const LOG_DIR: &str = "logs";
/// Marker whose mtime fences inputs off from compiler outputs.
const CHECKPOINT_MARKER: &str = ".download-complete";
const PASSES: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub successful: bool,
    pub passes: Vec<CompilerPass>,
    /// Blob paths written under the job's output prefix.
    pub uploaded: Vec<String>,
    pub artifact_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    AlreadyProcessed,
    Finished(CompileReport),
}

/// Compile the job's rendered source and close the job with the result.
///
/// A failed pass closes the job unsuccessful; only infrastructure failures are errors.
pub async fn compile_job(
    ctx: &PipelineContext,
    job_id: &str,
) -> Result<CompileOutcome, PipelineError> {
    let started_at = Instant::now();
    let job = ctx
        .jobs
        .find_job(job_id)
        .await?
        .ok_or_else(|| PipelineError::upstream_not_found("generation job", job_id))?;
    if job.is_processed() {
        return Ok(CompileOutcome::AlreadyProcessed);
    }

    let workdir = job_workdir(&ctx.options.work_root, &job.id)?;
    prepare_workdir(&workdir).await?;
    let downloaded = download_inputs(ctx, &job.id, &workdir).await?;
    let checkpoint = write_checkpoint(&workdir).await?;

    let source = workdir.join(MARKUP_SOURCE);
    if !tokio::fs::try_exists(&source).await? {
        return Err(PipelineError::upstream_not_found(
            "rendered markup source",
            format!("{}{MARKUP_SOURCE}", job_input_prefix(&job.id)),
        ));
    }
    let log_dir = workdir.join(LOG_DIR);
    tokio::fs::create_dir_all(&log_dir).await?;

    let mut passes = Vec::with_capacity(usize::from(PASSES));
    for pass in 1..=PASSES {
        let outcome = ctx
            .compiler
            .run_pass(&workdir, &source, &log_dir, pass)
            .await?;
        let succeeded = outcome.succeeded();
        counter!(
            METRIC_COMPILE_PASSES_TOTAL,
            "result" => if succeeded { "success" } else { "failure" }
        )
        .increment(1);

        if !succeeded {
            warn!(
                target = "application::compile",
                op = "compile_job",
                job_id = %job.id,
                pass,
                exit_code = outcome.exit_code.map(i64::from).unwrap_or(-1),
                timed_out = outcome.timed_out,
                stderr_log = %outcome.stderr_log.display(),
                "Compiler pass failed"
            );
        }
        passes.push(outcome);
        if !succeeded {
            break;
        }
    }
    let compiled =
        passes.len() == usize::from(PASSES) && passes.iter().all(CompilerPass::succeeded);

    let uploaded = upload_outputs(ctx, &job.id, &workdir, checkpoint).await?;
    let artifact = format!("{}{MARKUP_ARTIFACT}", job_output_prefix(&job.id));
    let successful = compiled && uploaded.contains(&artifact);
    let artifact_path = successful.then_some(artifact);
    finalize_job(ctx, &job, successful, artifact_path.clone()).await?;

    if let Err(err) = tokio::fs::remove_dir_all(&workdir).await {
        warn!(
            target = "application::compile",
            op = "compile_job",
            job_id = %job.id,
            workdir = %workdir.display(),
            error = %err,
            "Failed to remove working directory"
        );
    }

    info!(
        target = "application::compile",
        op = "compile_job",
        result = if successful { "success" } else { "failure" },
        job_id = %job.id,
        downloaded,
        uploaded = uploaded.len(),
        passes = passes.len(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "Compilation finished"
    );

    Ok(CompileOutcome::Finished(CompileReport {
        successful,
        passes,
        uploaded,
        artifact_path,
    }))
}

fn job_workdir(work_root: &Path, job_id: &str) -> Result<PathBuf, PipelineError> {
    match safe_relative(job_id) {
        Some(relative) if relative.components().count() == 1 => Ok(work_root.join(relative)),
        _ => Err(DomainError::validation(format!(
            "job id `{job_id}` is not a valid directory name"
        ))
        .into()),
    }
}

/// A directory left over by a crashed attempt is discarded, never reused.
async fn prepare_workdir(workdir: &Path) -> Result<(), PipelineError> {
    if tokio::fs::try_exists(workdir).await? {
        warn!(
            target = "application::compile",
            op = "prepare_workdir",
            workdir = %workdir.display(),
            "Removing stale working directory"
        );
        tokio::fs::remove_dir_all(workdir).await?;
    }
    tokio::fs::create_dir_all(workdir).await?;
    Ok(())
}

async fn download_inputs(
    ctx: &PipelineContext,
    job_id: &str,
    workdir: &Path,
) -> Result<usize, PipelineError> {
    let prefix = job_input_prefix(job_id);
    let blobs = ctx.blobs.list(&prefix).await?;

    for blob in &blobs {
        let relative = blob
            .strip_prefix(&prefix)
            .and_then(safe_relative)
            .ok_or_else(|| DomainError::validation(format!("unsafe input blob path `{blob}`")))?;
        let target = workdir.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = ctx.blobs.get(blob).await?;
        tokio::fs::write(&target, &data).await?;
    }

    Ok(blobs.len())
}

/// Use the filesystem's own clock for the fence so it compares like with like.
async fn write_checkpoint(workdir: &Path) -> Result<SystemTime, PipelineError> {
    let marker = workdir.join(CHECKPOINT_MARKER);
    tokio::fs::write(&marker, b"").await?;
    Ok(tokio::fs::metadata(&marker).await?.modified()?)
}

/// Upload every file modified at or after `checkpoint` to the job's output prefix.
async fn upload_outputs(
    ctx: &PipelineContext,
    job_id: &str,
    workdir: &Path,
    checkpoint: SystemTime,
) -> Result<Vec<String>, PipelineError> {
    let output_prefix = job_output_prefix(job_id);
    let mut uploaded = Vec::new();
    let mut pending = vec![workdir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                pending.push(path);
                continue;
            }
            if !metadata.is_file() || metadata.modified()? < checkpoint {
                continue;
            }

            let Some(relative) = path
                .strip_prefix(workdir)
                .ok()
                .and_then(to_blob_path)
            else {
                continue;
            };
            if relative == CHECKPOINT_MARKER {
                continue;
            }

            let data = tokio::fs::read(&path).await?;
            let blob_path = format!("{output_prefix}{relative}");
            ctx.blobs.put(&blob_path, Bytes::from(data)).await?;
            uploaded.push(blob_path);
        }
    }

    uploaded.sort();
    Ok(uploaded)
}
