use thiserror::Error;

use crate::{
    application::{
        ports::{BlobError, CompileError, ComposeError, MailError, TabularError},
        repos::RepoError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Terminal states of one unit of work that are not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The unit ran; `job_id` names the generation job it acted on.
    Processed { job_id: String },
    /// The row or record was already claimed by an earlier or concurrent attempt.
    AlreadyClaimed { job_id: Option<String> },
    /// The target already reached its terminal state.
    AlreadyProcessed { job_id: String },
    /// Nothing eligible this cycle.
    NoWork,
}

impl UnitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOutcome::Processed { .. } => "processed",
            UnitOutcome::AlreadyClaimed { .. } => "already_claimed",
            UnitOutcome::AlreadyProcessed { .. } => "already_processed",
            UnitOutcome::NoWork => "no_work",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("nothing to process yet for template `{template_id}` at offset {offset}")]
    NothingToProcess { template_id: String, offset: u64 },
    #[error("{entity} `{id}` not found")]
    UpstreamNotFound { entity: &'static str, id: String },
    #[error("unit exceeded its deadline of {seconds}s")]
    DeadlineExceeded { seconds: u64 },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Tabular(#[from] TabularError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn upstream_not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::UpstreamNotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether retrying the same attempt shortly afterwards may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::NothingToProcess { .. }
            | PipelineError::UpstreamNotFound { .. }
            | PipelineError::Domain(_)
            | PipelineError::Compose(_) => false,
            PipelineError::Compile(CompileError::NotFound(_)) => false,
            PipelineError::Repo(RepoError::InvalidInput { .. } | RepoError::Integrity { .. }) => {
                false
            }
            PipelineError::Tabular(TabularError::InvalidRange { .. }) => false,
            PipelineError::Blob(BlobError::InvalidPath(_)) => false,
            PipelineError::DeadlineExceeded { .. }
            | PipelineError::Repo(_)
            | PipelineError::Tabular(_)
            | PipelineError::Blob(_)
            | PipelineError::Mail(_)
            | PipelineError::Compile(_)
            | PipelineError::Io(_) => true,
        }
    }

    /// Short machine-readable code used in structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NothingToProcess { .. } => "nothing_to_process",
            PipelineError::UpstreamNotFound { .. } => "upstream_not_found",
            PipelineError::DeadlineExceeded { .. } => "deadline_exceeded",
            PipelineError::Domain(_) => "domain",
            PipelineError::Repo(_) => "repository",
            PipelineError::Tabular(_) => "tabular_source",
            PipelineError::Blob(_) => "blob_storage",
            PipelineError::Mail(_) => "mail_transport",
            PipelineError::Compile(_) => "compiler",
            PipelineError::Compose(_) => "composer",
            PipelineError::Io(_) => "io",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
