//! Traits for the external collaborators the pipeline drives: the tabular source,
//! blob storage, the mail transport, the typesetting compiler and the PDF composer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::entities::SheetReference;

#[derive(Debug, Error)]
pub enum TabularError {
    #[error("invalid sheet range `{range}`: {reason}")]
    InvalidRange { range: String, reason: String },
    #[error("tabular source request failed: {0}")]
    Request(String),
    #[error("tabular source returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("tabular source payload could not be decoded: {0}")]
    Decode(String),
}

/// The header row plus at most one data row read at a given offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFetch {
    pub header: Vec<String>,
    /// `None` when nothing exists at the requested offset.
    pub row: Option<Vec<serde_json::Value>>,
}

#[async_trait]
pub trait TabularSource: Send + Sync {
    /// Read the header and the data row at `offset` (0 = first row after the header).
    async fn fetch_row(&self, sheet: &SheetReference, offset: u64)
    -> Result<RowFetch, TabularError>;

    /// Whether any non-blank data row exists beyond `offset`.
    async fn has_rows_after(&self, sheet: &SheetReference, offset: u64)
    -> Result<bool, TabularError>;
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob path `{0}`")]
    InvalidPath(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("blob backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Bytes, BlobError>;

    async fn put(&self, path: &str, data: Bytes) -> Result<(), BlobError>;

    /// Full paths of every blob whose path starts with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;

    /// Server-side copy without a local round trip.
    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: Option<String>,
    pub attachment: Option<MailAttachment>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport request failed: {0}")]
    Request(String),
    #[error("mail transport rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Outcome of one compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerPass {
    pub pass: u8,
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

impl CompilerPass {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compiler executable unavailable: {0}")]
    NotFound(std::io::Error),
    #[error("failed to run compiler: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait TypesetCompiler: Send + Sync {
    /// Run one pass against `source` inside `workdir`, capturing output under `log_dir`.
    async fn run_pass(
        &self,
        workdir: &Path,
        source: &Path,
        log_dir: &Path,
        pass: u8,
    ) -> Result<CompilerPass, CompileError>;
}

/// In-memory layout handed to the document-composition library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedDocument {
    pub title: String,
    pub fields: Vec<ComposedField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedField {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("failed to load fonts: {0}")]
    Fonts(String),
    #[error("failed to render document: {0}")]
    Render(String),
}

pub trait DocumentComposer: Send + Sync {
    /// Lay out and render the document to PDF bytes. CPU-bound; callers run it off the
    /// async executor.
    fn render_pdf(&self, document: &ComposedDocument) -> Result<Vec<u8>, ComposeError>;
}
