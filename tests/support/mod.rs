//! In-memory adapters for the pipeline's repositories and collaborators.
//!
//! The repositories honour the same guards as the Postgres implementation: conditional
//! terminal-state updates, the (template, content hash) uniqueness claim and the lease
//! compare-and-set.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use docket::{
    application::{
        pipeline::{PipelineContext, PipelineOptions},
        ports::{
            BlobError, BlobStore, CompileError, CompilerPass, ComposeError, ComposedDocument,
            DocumentComposer, MailError, MailMessage, MailTransport, RowFetch, TabularError,
            TabularSource, TypesetCompiler,
        },
        random::SharedRng,
        repos::{
            ClaimResult, ClaimRowParams, FinishJobParams, GenerationJobsRepo, IngestCursorsRepo,
            InvoicesRepo, LeasesRepo, NewJobParams, NewQueueJob, OutboundEmailsRepo, QueueRepo,
            RepoError, SourceRowsRepo, TemplatesRepo, WorkflowStepsRepo,
        },
        retry::RetryPolicy,
    },
    domain::{
        entities::{
            GenerationJobRecord, InvoiceLineRecord, InvoiceRecord, LeaseRecord,
            OutboundEmailRecord, SheetReference, SourceRowRecord, TemplateRecord,
            WorkflowStepRecord,
        },
        types::{DocumentKind, ExecutionStrategy},
    },
};
use serde_json::Value;
use tempfile::TempDir;
use time::{OffsetDateTime, macros::date, macros::datetime};
use uuid::Uuid;

pub const SHEET_ID: &str = "registrations";
pub const MARKUP_PREFIX: &str = "templates/registration";

#[derive(Default)]
struct StoreState {
    seq: i64,
    templates: BTreeMap<String, TemplateRecord>,
    source_rows: Vec<SourceRowRecord>,
    jobs: Vec<GenerationJobRecord>,
    emails: Vec<OutboundEmailRecord>,
    invoices: BTreeMap<Uuid, InvoiceRecord>,
    cursors: HashMap<String, u64>,
    steps: BTreeMap<(String, String), WorkflowStepRecord>,
    leases: HashMap<String, LeaseRecord>,
    queue: Vec<NewQueueJob>,
}

impl StoreState {
    /// Strictly increasing creation timestamps, so "oldest" is insertion order.
    fn next_timestamp(&mut self) -> OffsetDateTime {
        self.seq += 1;
        datetime!(2026-01-01 00:00 UTC) + time::Duration::seconds(self.seq)
    }

    fn insert_job_with_email(&mut self, job: NewJobParams) {
        let created_at = self.next_timestamp();
        self.jobs.push(GenerationJobRecord {
            id: job.job_id.clone(),
            template_id: job.template_id,
            input: job.input,
            strategy: job.strategy,
            created_at,
            processed_at: None,
            successful: None,
            artifact_path: None,
        });
        self.emails.push(OutboundEmailRecord {
            id: job.job_id,
            to_address: job.to_address,
            cc: job.cc,
            subject: job.subject,
            attachment_name: job.attachment_name,
            body_text: job.body_text,
            created_at,
            processed_at: None,
        });
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_template(&self, template: TemplateRecord) {
        let mut state = self.state.lock().unwrap();
        state.templates.insert(template.id.clone(), template);
    }

    pub fn insert_invoice(&self, mut invoice: InvoiceRecord) {
        let mut state = self.state.lock().unwrap();
        invoice.created_at = state.next_timestamp();
        state.invoices.insert(invoice.id, invoice);
    }

    pub fn jobs(&self) -> Vec<GenerationJobRecord> {
        self.state.lock().unwrap().jobs.clone()
    }

    pub fn job(&self, id: &str) -> Option<GenerationJobRecord> {
        self.jobs().into_iter().find(|job| job.id == id)
    }

    pub fn emails(&self) -> Vec<OutboundEmailRecord> {
        self.state.lock().unwrap().emails.clone()
    }

    pub fn email(&self, id: &str) -> Option<OutboundEmailRecord> {
        self.emails().into_iter().find(|email| email.id == id)
    }

    pub fn source_rows(&self) -> Vec<SourceRowRecord> {
        self.state.lock().unwrap().source_rows.clone()
    }

    pub fn invoice(&self, id: Uuid) -> Option<InvoiceRecord> {
        self.state.lock().unwrap().invoices.get(&id).cloned()
    }

    pub fn cursor(&self, template_id: &str) -> Option<u64> {
        self.state.lock().unwrap().cursors.get(template_id).copied()
    }

    pub fn recorded_steps(&self, instance_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .steps
            .keys()
            .filter(|(instance, _)| instance == instance_id)
            .map(|(_, step)| step.clone())
            .collect()
    }

    pub fn lease(&self, worker_name: &str) -> Option<LeaseRecord> {
        self.state.lock().unwrap().leases.get(worker_name).cloned()
    }

    pub fn queued(&self) -> Vec<NewQueueJob> {
        self.state.lock().unwrap().queue.clone()
    }
}

#[async_trait]
impl TemplatesRepo for MemoryStore {
    async fn find_template(&self, id: &str) -> Result<Option<TemplateRecord>, RepoError> {
        Ok(self.state.lock().unwrap().templates.get(id).cloned())
    }

    async fn list_sheet_templates(&self) -> Result<Vec<TemplateRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .templates
            .values()
            .filter(|template| template.sheet.is_some())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SourceRowsRepo for MemoryStore {
    async fn find_source_row(
        &self,
        template_id: &str,
        content_hash: &str,
    ) -> Result<Option<SourceRowRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .source_rows
            .iter()
            .find(|row| row.template_id == template_id && row.content_hash == content_hash)
            .cloned())
    }

    async fn claim_row(&self, params: ClaimRowParams) -> Result<ClaimResult, RepoError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.source_rows.iter().find(|row| {
            row.template_id == params.job.template_id && row.content_hash == params.content_hash
        }) {
            return Ok(ClaimResult::AlreadyClaimed {
                job_id: Some(existing.job_id.clone()),
            });
        }

        let created_at = state.next_timestamp();
        state.source_rows.push(SourceRowRecord {
            template_id: params.job.template_id.clone(),
            content_hash: params.content_hash,
            job_id: params.job.job_id.clone(),
            row_offset: params.row_offset,
            row_created_at: params.row_created_at,
            created_at,
            processed_at: None,
        });
        let job_id = params.job.job_id.clone();
        state.insert_job_with_email(params.job);
        Ok(ClaimResult::Claimed { job_id })
    }

    async fn mark_row_processed(
        &self,
        job_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut state = self.state.lock().unwrap();
        for row in state
            .source_rows
            .iter_mut()
            .filter(|row| row.job_id == job_id && row.processed_at.is_none())
        {
            row.processed_at = Some(processed_at);
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationJobsRepo for MemoryStore {
    async fn find_job(&self, id: &str) -> Result<Option<GenerationJobRecord>, RepoError> {
        Ok(self.job(id))
    }

    async fn oldest_unprocessed_job(
        &self,
        strategy: ExecutionStrategy,
    ) -> Result<Option<GenerationJobRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|job| job.processed_at.is_none() && job.strategy == strategy)
            .min_by_key(|job| job.created_at)
            .cloned())
    }

    async fn finish_job(&self, params: FinishJobParams) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        let Some(job) = state
            .jobs
            .iter_mut()
            .find(|job| job.id == params.id && job.processed_at.is_none())
        else {
            return Ok(false);
        };
        job.processed_at = Some(params.processed_at);
        job.successful = Some(params.successful);
        job.artifact_path = params.artifact_path;
        Ok(true)
    }
}

#[async_trait]
impl OutboundEmailsRepo for MemoryStore {
    async fn find_email(&self, id: &str) -> Result<Option<OutboundEmailRecord>, RepoError> {
        Ok(self.email(id))
    }

    async fn oldest_deliverable_email(
        &self,
        strategy: ExecutionStrategy,
    ) -> Result<Option<OutboundEmailRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .emails
            .iter()
            .filter(|email| email.processed_at.is_none())
            .filter(|email| {
                state
                    .jobs
                    .iter()
                    .any(|job| {
                        job.id == email.id && job.processed_at.is_some() && job.strategy == strategy
                    })
            })
            .min_by_key(|email| email.created_at)
            .cloned())
    }

    async fn mark_email_processed(
        &self,
        id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        let Some(email) = state
            .emails
            .iter_mut()
            .find(|email| email.id == id && email.processed_at.is_none())
        else {
            return Ok(false);
        };
        email.processed_at = Some(processed_at);
        Ok(true)
    }
}

#[async_trait]
impl InvoicesRepo for MemoryStore {
    async fn find_invoice(&self, id: Uuid) -> Result<Option<InvoiceRecord>, RepoError> {
        Ok(self.invoice(id))
    }

    async fn oldest_ready_invoice(&self) -> Result<Option<InvoiceRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .filter(|invoice| invoice.ready_for_processing && invoice.processed_at.is_none())
            .min_by_key(|invoice| invoice.created_at)
            .cloned())
    }

    async fn claim_invoice(
        &self,
        invoice_id: Uuid,
        job: NewJobParams,
        claimed_at: OffsetDateTime,
    ) -> Result<ClaimResult, RepoError> {
        let mut state = self.state.lock().unwrap();
        let invoice = state
            .invoices
            .get_mut(&invoice_id)
            .ok_or(RepoError::NotFound)?;
        if !invoice.ready_for_processing || invoice.processed_at.is_some() {
            return Ok(ClaimResult::AlreadyClaimed {
                job_id: invoice.job_id.clone(),
            });
        }

        invoice.processed_at = Some(claimed_at);
        invoice.job_id = Some(job.job_id.clone());
        let job_id = job.job_id.clone();
        state.insert_job_with_email(job);
        Ok(ClaimResult::Claimed { job_id })
    }
}

#[async_trait]
impl IngestCursorsRepo for MemoryStore {
    async fn next_offset(&self, template_id: &str) -> Result<u64, RepoError> {
        Ok(self.cursor(template_id).unwrap_or(0))
    }

    async fn advance_past(&self, template_id: &str, offset: u64) -> Result<(), RepoError> {
        let mut state = self.state.lock().unwrap();
        let cursor = state.cursors.entry(template_id.to_string()).or_insert(0);
        *cursor = (*cursor).max(offset + 1);
        Ok(())
    }
}

#[async_trait]
impl WorkflowStepsRepo for MemoryStore {
    async fn find_step(
        &self,
        instance_id: &str,
        step: &str,
    ) -> Result<Option<WorkflowStepRecord>, RepoError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .steps
            .get(&(instance_id.to_string(), step.to_string()))
            .cloned())
    }

    async fn record_step(
        &self,
        instance_id: &str,
        step: &str,
        output: Value,
    ) -> Result<(), RepoError> {
        let mut state = self.state.lock().unwrap();
        let completed_at = state.next_timestamp();
        state
            .steps
            .entry((instance_id.to_string(), step.to_string()))
            .or_insert_with(|| WorkflowStepRecord {
                instance_id: instance_id.to_string(),
                step: step.to_string(),
                output,
                completed_at,
            });
        Ok(())
    }
}

#[async_trait]
impl LeasesRepo for MemoryStore {
    async fn load_lease(&self, worker_name: &str) -> Result<LeaseRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .leases
            .entry(worker_name.to_string())
            .or_insert_with(|| LeaseRecord {
                worker_name: worker_name.to_string(),
                last_executed_at: OffsetDateTime::UNIX_EPOCH,
                execution_count: 0,
            })
            .clone())
    }

    async fn try_advance_lease(
        &self,
        worker_name: &str,
        expected: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        match state.leases.get_mut(worker_name) {
            Some(lease) if lease.last_executed_at == expected && now >= expected => {
                lease.last_executed_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_execution(&self, worker_name: &str) -> Result<(), RepoError> {
        let mut state = self.state.lock().unwrap();
        if let Some(lease) = state.leases.get_mut(worker_name) {
            lease.execution_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl QueueRepo for MemoryStore {
    async fn enqueue_job(&self, job: NewQueueJob) -> Result<String, RepoError> {
        let mut state = self.state.lock().unwrap();
        state.queue.push(job);
        Ok(format!("queued-{}", state.queue.len()))
    }
}

/// A sheet whose header and rows are set by the test.
#[derive(Default)]
pub struct ScriptedSheet {
    header: Mutex<Vec<String>>,
    rows: Mutex<Vec<Vec<Value>>>,
    fetches: AtomicUsize,
}

impl ScriptedSheet {
    pub fn set_header(&self, header: &[&str]) {
        *self.header.lock().unwrap() = header.iter().map(|name| name.to_string()).collect();
    }

    pub fn push_row(&self, cells: &[&str]) {
        self.rows
            .lock()
            .unwrap()
            .push(cells.iter().map(|cell| Value::from(*cell)).collect());
    }

    pub fn push_values(&self, cells: Vec<Value>) {
        self.rows.lock().unwrap().push(cells);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabularSource for ScriptedSheet {
    async fn fetch_row(
        &self,
        sheet: &SheetReference,
        offset: u64,
    ) -> Result<RowFetch, TabularError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if sheet.sheet_id != SHEET_ID {
            return Err(TabularError::Status {
                status: 404,
                body: format!("unknown spreadsheet {}", sheet.sheet_id),
            });
        }
        let row = usize::try_from(offset)
            .ok()
            .and_then(|offset| self.rows.lock().unwrap().get(offset).cloned());
        Ok(RowFetch {
            header: self.header.lock().unwrap().clone(),
            row,
        })
    }

    async fn has_rows_after(
        &self,
        sheet: &SheetReference,
        offset: u64,
    ) -> Result<bool, TabularError> {
        if sheet.sheet_id != SHEET_ID {
            return Err(TabularError::Status {
                status: 404,
                body: format!("unknown spreadsheet {}", sheet.sheet_id),
            });
        }
        let start = usize::try_from(offset).map_or(usize::MAX, |offset| offset.saturating_add(1));
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .skip(start)
            .any(|row| row.iter().any(|cell| !cell.is_null())))
    }
}

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryBlobs {
    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        self.blobs.lock().unwrap().insert(path.to_string(), data.into());
    }

    pub fn read(&self, path: &str) -> Option<Bytes> {
        self.blobs.lock().unwrap().get(path).cloned()
    }

    pub fn read_string(&self, path: &str) -> Option<String> {
        self.read(path)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    pub fn paths(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn get(&self, path: &str) -> Result<Bytes, BlobError> {
        self.read(path)
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), BlobError> {
        self.insert(path, data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        Ok(self
            .paths()
            .into_iter()
            .filter(|path| path.starts_with(prefix))
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        let data = self.get(from).await?;
        self.insert(to, data);
        Ok(())
    }
}

/// Records accepted messages; rejects while `failing` is set.
#[derive(Default)]
pub struct RecordingMail {
    sent: Mutex<Vec<MailMessage>>,
    failing: Mutex<bool>,
    attempts: AtomicUsize,
}

impl RecordingMail {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for RecordingMail {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(MailError::Rejected {
                status: 503,
                body: "mail relay unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub const STUB_PDF: &[u8] = b"%PDF-1.4 composed";

/// Returns a fixed payload and remembers what it was asked to lay out.
#[derive(Default)]
pub struct StubComposer {
    documents: Mutex<Vec<ComposedDocument>>,
}

impl StubComposer {
    pub fn documents(&self) -> Vec<ComposedDocument> {
        self.documents.lock().unwrap().clone()
    }
}

impl DocumentComposer for StubComposer {
    fn render_pdf(&self, document: &ComposedDocument) -> Result<Vec<u8>, ComposeError> {
        self.documents.lock().unwrap().push(document.clone());
        Ok(STUB_PDF.to_vec())
    }
}

/// Writes `main.aux` on every pass and `main.pdf` on the last one, unless told to fail.
#[derive(Default)]
pub struct FakeCompiler {
    fail_on_pass: Mutex<Option<u8>>,
    passes: AtomicUsize,
}

impl FakeCompiler {
    pub fn fail_on_pass(&self, pass: u8) {
        *self.fail_on_pass.lock().unwrap() = Some(pass);
    }

    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TypesetCompiler for FakeCompiler {
    async fn run_pass(
        &self,
        workdir: &Path,
        _source: &Path,
        log_dir: &Path,
        pass: u8,
    ) -> Result<CompilerPass, CompileError> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        let stdout_log = log_dir.join(format!("pass{pass}.stdout.log"));
        let stderr_log = log_dir.join(format!("pass{pass}.stderr.log"));
        tokio::fs::write(&stdout_log, format!("pass {pass}\n")).await?;
        tokio::fs::write(&stderr_log, b"").await?;

        let failed = *self.fail_on_pass.lock().unwrap() == Some(pass);
        if !failed {
            tokio::fs::write(workdir.join("main.aux"), format!("aux {pass}\n")).await?;
            if pass == 2 {
                tokio::fs::write(workdir.join("main.pdf"), b"%PDF-1.4 compiled").await?;
            }
        }

        Ok(CompilerPass {
            pass,
            exit_code: Some(if failed { 1 } else { 0 }),
            timed_out: false,
            stdout_log,
            stderr_log,
        })
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    }
}

/// A fully wired context over in-memory adapters.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub sheet: Arc<ScriptedSheet>,
    pub blobs: Arc<MemoryBlobs>,
    pub mail: Arc<RecordingMail>,
    pub composer: Arc<StubComposer>,
    pub work_root: TempDir,
    pub ctx: PipelineContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_compiler(Arc::new(FakeCompiler::default()))
    }

    pub fn with_compiler(compiler: Arc<dyn TypesetCompiler>) -> Self {
        let store = MemoryStore::new();
        let sheet = Arc::new(ScriptedSheet::default());
        let blobs = Arc::new(MemoryBlobs::default());
        let mail = Arc::new(RecordingMail::default());
        let composer = Arc::new(StubComposer::default());
        let work_root = TempDir::new().expect("work root");

        let ctx = PipelineContext {
            templates: store.clone(),
            source_rows: store.clone(),
            jobs: store.clone(),
            emails: store.clone(),
            invoices: store.clone(),
            cursors: store.clone(),
            steps: store.clone(),
            tabular: sheet.clone(),
            blobs: blobs.clone(),
            mail: mail.clone(),
            compiler,
            composer: composer.clone(),
            rng: SharedRng::seeded(42),
            options: PipelineOptions {
                work_root: work_root.path().to_path_buf(),
                unit_deadline: Duration::from_secs(30),
                retry: fast_retry(),
            },
        };

        Self {
            store,
            sheet,
            blobs,
            mail,
            composer,
            work_root,
            ctx,
        }
    }

    /// Markup template reading the registration sheet, plus its source blobs.
    pub fn with_markup_template(self, id: &str) -> Self {
        self.store.insert_template(markup_template(id));
        self.blobs.insert(
            &format!("{MARKUP_PREFIX}/main.tex"),
            "Dear ((Name)), your pet ((Pet)) is registered. Ref ((Missing)).",
        );
        self.blobs
            .insert(&format!("{MARKUP_PREFIX}/assets/logo.png"), "png-bytes");
        self.sheet.set_header(&["Timestamp", "Name", "Pet"]);
        self
    }

    pub fn with_composed_template(self, id: &str, kind: DocumentKind) -> Self {
        self.store.insert_template(composed_template(id, kind));
        self.sheet.set_header(&[
            "Timestamp", "Email", "Owner", "Phone", "Name", "Breed", "Sex", "Born", "Colour",
            "Street", "Line 2", "City", "Postcode", "Notes",
        ]);
        self
    }
}

pub fn markup_template(id: &str) -> TemplateRecord {
    TemplateRecord {
        id: id.to_string(),
        kind: DocumentKind::Markup,
        sheet: Some(SheetReference {
            sheet_id: SHEET_ID.to_string(),
            range: "Form Responses 1!A:C".to_string(),
        }),
        recipient: "office@example.com".to_string(),
        cc: Some("records@example.com; vet@example.com".to_string()),
        subject_template: "Registration for ((Pet))".to_string(),
        attachment_name_template: "((Name)) registration".to_string(),
        body_text: Some("Your registration is attached.".to_string()),
        allowed_submitters: None,
        source_prefix: Some(MARKUP_PREFIX.to_string()),
        created_at: datetime!(2025-12-01 00:00 UTC),
    }
}

pub fn composed_template(id: &str, kind: DocumentKind) -> TemplateRecord {
    TemplateRecord {
        id: id.to_string(),
        kind,
        sheet: Some(SheetReference {
            sheet_id: SHEET_ID.to_string(),
            range: "Form Responses 1!A:N".to_string(),
        }),
        recipient: "office@example.com".to_string(),
        cc: None,
        subject_template: "New registration: ((Name))".to_string(),
        attachment_name_template: "((Name))".to_string(),
        body_text: None,
        allowed_submitters: Some(vec!["vet@example.com".to_string()]),
        source_prefix: None,
        created_at: datetime!(2025-12-01 00:00 UTC),
    }
}

pub fn invoice_template(id: &str) -> TemplateRecord {
    TemplateRecord {
        id: id.to_string(),
        kind: DocumentKind::Markup,
        sheet: None,
        recipient: "billing@example.com".to_string(),
        cc: None,
        subject_template: "Invoice ((InvoiceNumber))".to_string(),
        attachment_name_template: "invoice ((InvoiceNumber))".to_string(),
        body_text: Some("Thank you for your business.".to_string()),
        allowed_submitters: None,
        source_prefix: Some("templates/invoice".to_string()),
        created_at: datetime!(2025-12-01 00:00 UTC),
    }
}

pub fn ready_invoice(template_id: &str, number: &str) -> InvoiceRecord {
    InvoiceRecord {
        id: Uuid::new_v4(),
        template_id: template_id.to_string(),
        number: number.to_string(),
        customer_name: "Ada Lovelace".to_string(),
        customer_email: "ada@example.com".to_string(),
        currency: "EUR".to_string(),
        issued_on: date!(2026 - 10 - 01),
        ready_for_processing: true,
        processed_at: None,
        job_id: None,
        created_at: datetime!(2026-01-01 00:00 UTC),
        lines: vec![
            InvoiceLineRecord {
                position: 1,
                title: "Annual checkup".to_string(),
                quantity: 1,
                unit_price_cents: 4500,
            },
            InvoiceLineRecord {
                position: 2,
                title: "Vaccine & booster".to_string(),
                quantity: 2,
                unit_price_cents: 1250,
            },
        ],
    }
}
