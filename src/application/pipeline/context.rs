use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::application::{
    ports::{BlobStore, DocumentComposer, MailTransport, TabularSource, TypesetCompiler},
    random::SharedRng,
    repos::{
        GenerationJobsRepo, IngestCursorsRepo, InvoicesRepo, OutboundEmailsRepo, SourceRowsRepo,
        TemplatesRepo, WorkflowStepsRepo,
    },
    retry::RetryPolicy,
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Parent of the per-job local working directories.
    pub work_root: PathBuf,
    /// Upper bound on one unit of work.
    pub unit_deadline: Duration,
    pub retry: RetryPolicy,
}

/// Everything a unit of work needs, shared by polling workers and workflow activities.
#[derive(Clone)]
pub struct PipelineContext {
    pub templates: Arc<dyn TemplatesRepo>,
    pub source_rows: Arc<dyn SourceRowsRepo>,
    pub jobs: Arc<dyn GenerationJobsRepo>,
    pub emails: Arc<dyn OutboundEmailsRepo>,
    pub invoices: Arc<dyn InvoicesRepo>,
    pub cursors: Arc<dyn IngestCursorsRepo>,
    pub steps: Arc<dyn WorkflowStepsRepo>,
    pub tabular: Arc<dyn TabularSource>,
    pub blobs: Arc<dyn BlobStore>,
    pub mail: Arc<dyn MailTransport>,
    pub compiler: Arc<dyn TypesetCompiler>,
    pub composer: Arc<dyn DocumentComposer>,
    pub rng: SharedRng,
    pub options: PipelineOptions,
}

impl PipelineContext {
    /// A fresh generation job id.
    pub fn new_job_id(&self) -> String {
        self.rng.next_uuid().to_string()
    }
}
