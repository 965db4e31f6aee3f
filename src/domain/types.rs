//! Shared domain enumerations aligned with persisted text columns.

use serde::{Deserialize, Serialize};

/// Rendering strategy a template is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Markup source with `((Token))` placeholders, compiled by the external typesetter.
    Markup,
    Canine,
    Equine,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Markup => "markup",
            DocumentKind::Canine => "canine",
            DocumentKind::Equine => "equine",
        }
    }

    pub fn is_markup(self) -> bool {
        matches!(self, DocumentKind::Markup)
    }
}

impl TryFrom<&str> for DocumentKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "markup" => Ok(DocumentKind::Markup),
            "canine" => Ok(DocumentKind::Canine),
            "equine" => Ok(DocumentKind::Equine),
            _ => Err(()),
        }
    }
}

/// The fixed set of singleton polling workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerName {
    RowIngest,
    InvoiceIntake,
    DocumentGenerate,
    EmailDelivery,
}

impl WorkerName {
    pub const ALL: [WorkerName; 4] = [
        WorkerName::RowIngest,
        WorkerName::InvoiceIntake,
        WorkerName::DocumentGenerate,
        WorkerName::EmailDelivery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerName::RowIngest => "row-ingest",
            WorkerName::InvoiceIntake => "invoice-intake",
            WorkerName::DocumentGenerate => "document-generate",
            WorkerName::EmailDelivery => "email-delivery",
        }
    }
}

impl TryFrom<&str> for WorkerName {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "row-ingest" => Ok(WorkerName::RowIngest),
            "invoice-intake" => Ok(WorkerName::InvoiceIntake),
            "document-generate" => Ok(WorkerName::DocumentGenerate),
            "email-delivery" => Ok(WorkerName::EmailDelivery),
            _ => Err(()),
        }
    }
}

/// Which execution strategy drives a generation job after its claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Polling,
    Workflow,
}

impl ExecutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStrategy::Polling => "polling",
            ExecutionStrategy::Workflow => "workflow",
        }
    }
}

impl TryFrom<&str> for ExecutionStrategy {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "polling" => Ok(ExecutionStrategy::Polling),
            "workflow" => Ok(ExecutionStrategy::Workflow),
            _ => Err(()),
        }
    }
}

/// Activities of an orchestrated document workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Claim,
    Render,
    Compile,
    Deliver,
}

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::Claim => "claim",
            WorkflowStep::Render => "render",
            WorkflowStep::Compile => "compile",
            WorkflowStep::Deliver => "deliver",
        }
    }
}

impl TryFrom<&str> for WorkflowStep {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "claim" => Ok(WorkflowStep::Claim),
            "render" => Ok(WorkflowStep::Render),
            "compile" => Ok(WorkflowStep::Compile),
            "deliver" => Ok(WorkflowStep::Deliver),
            _ => Err(()),
        }
    }
}

/// Queue namespaces used with the Postgres-backed job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DocumentWorkflow,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::DocumentWorkflow => "docket::document_workflow",
        }
    }
}
