use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use docket::{
    application::{
        error::AppError,
        lease::{LeaseManager, ReadinessGate},
        pipeline::{
            CycleOutcome, DocumentWorkflowPayload, PipelineContext, PipelineOptions,
            PollingWorkers, WorkflowUnit, enqueue_document_workflow, process_document_workflow,
        },
        ports::{BlobStore, DocumentComposer, MailTransport, TabularSource},
        random::SharedRng,
    },
    config::{self, SheetsCredential, SheetsSettings, StorageSettings},
    domain::types::{JobType, WorkerName},
    infra::{
        blob::{FilesystemBlobStore, S3BlobStore, S3Options},
        compiler::ProcessCompiler,
        csv_source::CsvDirectorySource,
        db::PostgresRepositories,
        error::InfraError,
        mail::HttpMailTransport,
        pdf::GenpdfComposer,
        sheets::{GoogleSheetsSource, SheetsAuth},
        telemetry,
    },
};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const WORKFLOW_WORKER_NAME: &str = "document-workflow-worker";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::RunWorker(args) => run_worker(settings, args).await,
        config::Command::Enqueue(args) => run_enqueue(settings, args).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let context = build_pipeline_context(&settings, repositories.clone()).await?;

    let gate = ReadinessGate::new();
    let polling = PollingWorkers::new(
        context.clone(),
        LeaseManager::new(repositories.clone()),
        gate.clone(),
    );
    let worker_handles: Vec<JoinHandle<()>> = settings
        .workers
        .enabled
        .iter()
        .map(|worker| polling.spawn(*worker, settings.workers.interval(*worker)))
        .collect();

    if let Err(err) = PostgresRepositories::run_migrations(repositories.pool()).await {
        abort_all(worker_handles).await;
        return Err(err.into());
    }
    gate.open();

    let monitor_handle = spawn_workflow_monitor(
        &repositories,
        context,
        settings.pipeline.workflow_concurrency.get() as usize,
    );

    info!(
        target = "docket::serve",
        workers = ?settings.workers.enabled.iter().map(|w| w.as_str()).collect::<Vec<_>>(),
        workflow_concurrency = settings.pipeline.workflow_concurrency.get(),
        "Pipeline running"
    );

    let result = tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)));
    info!(target = "docket::serve", "Shutdown requested");

    monitor_handle.abort();
    let _ = monitor_handle.await;
    abort_all(worker_handles).await;

    result
}

async fn abort_all(handles: Vec<JoinHandle<()>>) {
    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn run_worker(settings: config::Settings, args: config::RunWorkerArgs) -> Result<(), AppError> {
    let worker = WorkerName::try_from(args.worker.as_str()).map_err(|_| {
        AppError::validation(format!(
            "unknown worker `{}`; expected one of: {}",
            args.worker,
            WorkerName::ALL.map(WorkerName::as_str).join(", ")
        ))
    })?;

    let repositories = init_repositories(&settings).await?;
    let context = build_pipeline_context(&settings, repositories.clone()).await?;
    let polling = PollingWorkers::new(
        context,
        LeaseManager::new(repositories),
        ReadinessGate::opened(),
    );

    match polling
        .run_cycle(worker, settings.workers.interval(worker))
        .await
    {
        CycleOutcome::Skipped(decision) => {
            info!(
                target = "docket::run_worker",
                worker = worker.as_str(),
                result = decision.as_str(),
                "Lease not acquired; another instance ran recently"
            );
            Ok(())
        }
        CycleOutcome::Ran(outcome) => {
            info!(
                target = "docket::run_worker",
                worker = worker.as_str(),
                result = outcome.as_str(),
                "Worker cycle finished"
            );
            Ok(())
        }
        CycleOutcome::Failed(err) => Err(err.into()),
    }
}

async fn run_enqueue(settings: config::Settings, args: config::EnqueueArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let unit = match args.target {
        config::EnqueueTarget::Row { template, offset } => WorkflowUnit::SheetRow {
            template_id: template,
            offset,
        },
        config::EnqueueTarget::Invoice { id } => WorkflowUnit::Invoice { invoice_id: id },
    };
    let instance_id = unit.instance_id();

    let queue_job_id = enqueue_document_workflow(repositories.as_ref(), unit, None)
        .await
        .map_err(|err| AppError::from(InfraError::queue(err.to_string())))?;

    info!(
        target = "docket::enqueue",
        instance_id = %instance_id,
        queue_job_id = %queue_job_id,
        "Workflow instance queued"
    );
    println!("{queue_job_id}");
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    PostgresRepositories::run_migrations(repositories.pool()).await?;
    info!(target = "docket::migrate", "Migrations applied");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn build_pipeline_context(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
) -> Result<PipelineContext, AppError> {
    let compiler = ProcessCompiler::new(
        settings.compiler.program.clone(),
        settings.compiler.args.clone(),
        settings.compiler.timeout,
    );

    Ok(PipelineContext {
        templates: repositories.clone(),
        source_rows: repositories.clone(),
        jobs: repositories.clone(),
        emails: repositories.clone(),
        invoices: repositories.clone(),
        cursors: repositories.clone(),
        steps: repositories,
        tabular: build_tabular_source(&settings.sheets)?,
        blobs: build_blob_store(&settings.storage).await?,
        mail: build_mail_transport(&settings.mail)?,
        compiler: Arc::new(compiler),
        composer: build_composer(&settings.composer)?,
        rng: SharedRng::from_os(),
        options: PipelineOptions {
            work_root: settings.pipeline.work_root.clone(),
            unit_deadline: settings.pipeline.unit_deadline,
            retry: settings.retry,
        },
    })
}

async fn build_blob_store(storage: &StorageSettings) -> Result<Arc<dyn BlobStore>, AppError> {
    match storage {
        StorageSettings::Filesystem { root } => {
            let store = FilesystemBlobStore::new(root.clone()).map_err(|err| {
                AppError::from(InfraError::storage(format!(
                    "failed to prepare blob root {}: {err}",
                    root.display()
                )))
            })?;
            Ok(Arc::new(store))
        }
        StorageSettings::S3 {
            bucket,
            region,
            endpoint,
            force_path_style,
        } => {
            let store = S3BlobStore::connect(S3Options {
                bucket: bucket.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                force_path_style: *force_path_style,
            })
            .await;
            Ok(Arc::new(store))
        }
    }
}

fn build_tabular_source(sheets: &SheetsSettings) -> Result<Arc<dyn TabularSource>, AppError> {
    match sheets {
        SheetsSettings::Google {
            api_base,
            credential,
        } => {
            let auth = credential.as_ref().map(|credential| match credential {
                SheetsCredential::ApiKey(key) => SheetsAuth::ApiKey(key.clone()),
                SheetsCredential::AccessToken(token) => SheetsAuth::Bearer(token.clone()),
            });
            if auth.is_none() {
                warn!(
                    target = "docket::bootstrap",
                    "No Google Sheets credential configured; row ingestion will fail"
                );
            }
            let source = GoogleSheetsSource::new(api_base.clone(), auth)
                .map_err(|err| AppError::from(InfraError::HttpClient(err.to_string())))?;
            Ok(Arc::new(source))
        }
        SheetsSettings::Csv { directory } => Ok(Arc::new(CsvDirectorySource::new(directory.clone()))),
    }
}

fn build_mail_transport(mail: &config::MailSettings) -> Result<Arc<dyn MailTransport>, AppError> {
    let endpoint = mail
        .endpoint
        .clone()
        .ok_or_else(|| InfraError::configuration("mail.endpoint is not configured"))?;
    let api_key = mail
        .api_key
        .clone()
        .ok_or_else(|| InfraError::configuration("mail.api_key is not configured"))?;

    let transport = HttpMailTransport::new(endpoint, api_key, mail.from.clone())
        .map_err(|err| AppError::from(InfraError::HttpClient(err.to_string())))?;
    Ok(Arc::new(transport))
}

fn build_composer(
    composer: &config::ComposerSettings,
) -> Result<Arc<dyn DocumentComposer>, AppError> {
    let composer = GenpdfComposer::from_dir(&composer.font_dir, &composer.font_family)
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
    Ok(Arc::new(composer))
}

fn spawn_workflow_monitor(
    repositories: &PostgresRepositories,
    context: PipelineContext,
    concurrency: usize,
) -> JoinHandle<()> {
    let storage: PostgresStorage<DocumentWorkflowPayload> = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::DocumentWorkflow.as_str()),
    );

    let worker = WorkerBuilder::new(WORKFLOW_WORKER_NAME)
        .concurrency(concurrency)
        .data(context)
        .backend(storage)
        .build_fn(process_document_workflow);

    let monitor = Monitor::new().register(worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "workflow monitor stopped");
        }
    })
}
