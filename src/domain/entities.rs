//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    types::{DocumentKind, ExecutionStrategy},
};

/// Spreadsheet location a template reads its rows from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetReference {
    pub sheet_id: String,
    /// A1-notation range such as `Form Responses 1!A:N`.
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateRecord {
    pub id: String,
    pub kind: DocumentKind,
    pub sheet: Option<SheetReference>,
    pub recipient: String,
    pub cc: Option<String>,
    pub subject_template: String,
    pub attachment_name_template: String,
    pub body_text: Option<String>,
    pub allowed_submitters: Option<Vec<String>>,
    /// Blob prefix holding the markup source and its assets.
    pub source_prefix: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Deduplication record keyed by (template id, content hash).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRowRecord {
    pub template_id: String,
    pub content_hash: String,
    pub job_id: String,
    pub row_offset: i64,
    pub row_created_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}

/// What a generation job renders from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum JobInput {
    SheetRow {
        row_offset: u64,
        headers: Vec<String>,
        cells: Vec<String>,
    },
    Invoice {
        invoice_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationJobRecord {
    pub id: String,
    pub template_id: String,
    pub input: JobInput,
    pub strategy: ExecutionStrategy,
    pub created_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
    pub successful: Option<bool>,
    pub artifact_path: Option<String>,
}

impl GenerationJobRecord {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEmailRecord {
    pub id: String,
    pub to_address: String,
    pub cc: Option<String>,
    pub subject: String,
    pub attachment_name: String,
    pub body_text: Option<String>,
    pub created_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseRecord {
    pub worker_name: String,
    pub last_executed_at: OffsetDateTime,
    pub execution_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLineRecord {
    pub position: i32,
    pub title: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl InvoiceLineRecord {
    pub fn total_cents(&self) -> Result<i64, DomainError> {
        i64::from(self.quantity)
            .checked_mul(self.unit_price_cents)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "invoice line {} overflows its total ({} x {} cents)",
                    self.position, self.quantity, self.unit_price_cents
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub template_id: String,
    pub number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub currency: String,
    pub issued_on: Date,
    pub ready_for_processing: bool,
    pub processed_at: Option<OffsetDateTime>,
    pub job_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub lines: Vec<InvoiceLineRecord>,
}

impl InvoiceRecord {
    pub fn total_cents(&self) -> Result<i64, DomainError> {
        self.lines.iter().try_fold(0_i64, |total, line| {
            total.checked_add(line.total_cents()?).ok_or_else(|| {
                DomainError::validation(format!("invoice {} overflows its total", self.number))
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStepRecord {
    pub instance_id: String,
    pub step: String,
    pub output: serde_json::Value,
    pub completed_at: OffsetDateTime,
}
