//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{application::retry::RetryPolicy, domain::types::WorkerName};

pub use cli::{
    CliArgs, Command, DatabaseOverride, EnqueueArgs, EnqueueTarget, MigrateArgs, RunWorkerArgs,
    ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "docket";
const ENV_PREFIX: &str = "DOCKET";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BLOB_ROOT: &str = "blobs";
const DEFAULT_CSV_DIR: &str = "sheets";
const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
const DEFAULT_MAIL_FROM: &str = "documents@localhost";
const DEFAULT_COMPILER_PROGRAM: &str = "pdflatex";
const DEFAULT_COMPILER_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FONT_DIR: &str = "fonts";
const DEFAULT_FONT_FAMILY: &str = "LiberationSans";
const DEFAULT_WORK_ROOT: &str = "/tmp/docket-work";
const DEFAULT_UNIT_DEADLINE_SECS: u64 = 280;
const DEFAULT_WORKFLOW_CONCURRENCY: u32 = 2;
const DEFAULT_WORKER_INTERVAL_SECS: u64 = 300;

fn default_compiler_args() -> Vec<String> {
    [
        "-interaction=nonstopmode",
        "-halt-on-error",
        "-output-directory={workdir}",
        "{source}",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub sheets: SheetsSettings,
    pub mail: MailSettings,
    pub compiler: CompilerSettings,
    pub composer: ComposerSettings,
    pub pipeline: PipelineSettings,
    pub workers: WorkersSettings,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSettings {
    Filesystem {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        force_path_style: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetsCredential {
    ApiKey(String),
    AccessToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetsSettings {
    /// Google Sheets; the credential is only required once a row is fetched.
    Google {
        api_base: Url,
        credential: Option<SheetsCredential>,
    },
    Csv {
        directory: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub endpoint: Option<Url>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ComposerSettings {
    pub font_dir: PathBuf,
    pub font_family: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_root: PathBuf,
    pub unit_deadline: Duration,
    pub workflow_concurrency: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct WorkersSettings {
    pub enabled: Vec<WorkerName>,
    pub row_ingest_interval: Duration,
    pub invoice_intake_interval: Duration,
    pub document_generate_interval: Duration,
    pub email_delivery_interval: Duration,
}

impl WorkersSettings {
    pub fn interval(&self, worker: WorkerName) -> Duration {
        match worker {
            WorkerName::RowIngest => self.row_ingest_interval,
            WorkerName::InvoiceIntake => self.invoice_intake_interval,
            WorkerName::DocumentGenerate => self.document_generate_interval,
            WorkerName::EmailDelivery => self.email_delivery_interval,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("compiler.args")
            .with_list_parse_key("workers.enabled")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::RunWorker(args)) => raw.apply_database_override(&args.database),
        Some(Command::Enqueue(args)) => raw.apply_database_override(&args.database),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    storage: RawStorageSettings,
    sheets: RawSheetsSettings,
    mail: RawMailSettings,
    compiler: RawCompilerSettings,
    composer: RawComposerSettings,
    pipeline: RawPipelineSettings,
    workers: RawWorkersSettings,
    retry: RawRetrySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(root) = overrides.work_root.as_ref() {
            self.pipeline.work_root = Some(root.clone());
        }
        if let Some(value) = overrides.workflow_concurrency {
            self.pipeline.workflow_concurrency = Some(value);
        }
        if !overrides.workers.is_empty() {
            self.workers.enabled = Some(overrides.workers.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            storage,
            sheets,
            mail,
            compiler,
            composer,
            pipeline,
            workers,
            retry,
        } = raw;

        let pipeline = build_pipeline_settings(pipeline)?;
        let workers = build_workers_settings(workers)?;
        ensure_deadline_fits_intervals(&pipeline, &workers)?;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            storage: build_storage_settings(storage)?,
            sheets: build_sheets_settings(sheets)?,
            mail: build_mail_settings(mail)?,
            compiler: build_compiler_settings(compiler)?,
            composer: build_composer_settings(composer)?,
            pipeline,
            workers,
            retry: build_retry_policy(retry)?,
        })
    }
}

/// A unit must end before its lease can be granted again, or two instances would work the
/// same record.
fn ensure_deadline_fits_intervals(
    pipeline: &PipelineSettings,
    workers: &WorkersSettings,
) -> Result<(), LoadError> {
    for &worker in &workers.enabled {
        let interval = workers.interval(worker);
        if pipeline.unit_deadline >= interval {
            return Err(LoadError::invalid(
                "pipeline.unit_deadline_seconds",
                format!(
                    "{}s must be shorter than the {}s interval of `{}`",
                    pipeline.unit_deadline.as_secs(),
                    interval.as_secs(),
                    worker.as_str()
                ),
            ));
        }
    }
    Ok(())
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    match storage.backend.as_deref().unwrap_or("filesystem") {
        "filesystem" => {
            let root = storage
                .root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BLOB_ROOT));
            non_empty_path(&root, "storage.root")?;
            Ok(StorageSettings::Filesystem { root })
        }
        "s3" => {
            let bucket = non_blank(storage.bucket)
                .ok_or_else(|| LoadError::invalid("storage.bucket", "required for s3"))?;
            let region = non_blank(storage.region)
                .ok_or_else(|| LoadError::invalid("storage.region", "required for s3"))?;
            Ok(StorageSettings::S3 {
                bucket,
                region,
                endpoint: non_blank(storage.endpoint),
                force_path_style: storage.force_path_style.unwrap_or(false),
            })
        }
        other => Err(LoadError::invalid(
            "storage.backend",
            format!("unknown backend `{other}` (expected filesystem or s3)"),
        )),
    }
}

fn build_sheets_settings(sheets: RawSheetsSettings) -> Result<SheetsSettings, LoadError> {
    match sheets.backend.as_deref().unwrap_or("google") {
        "google" => {
            let raw_base = sheets
                .api_base
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string());
            let api_base = Url::parse(&raw_base)
                .map_err(|err| LoadError::invalid("sheets.api_base", err.to_string()))?;
            let credential = match (non_blank(sheets.access_token), non_blank(sheets.api_key)) {
                (Some(token), _) => Some(SheetsCredential::AccessToken(token)),
                (None, Some(key)) => Some(SheetsCredential::ApiKey(key)),
                (None, None) => None,
            };
            Ok(SheetsSettings::Google {
                api_base,
                credential,
            })
        }
        "csv" => {
            let directory = sheets
                .csv_directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_DIR));
            non_empty_path(&directory, "sheets.csv_directory")?;
            Ok(SheetsSettings::Csv { directory })
        }
        other => Err(LoadError::invalid(
            "sheets.backend",
            format!("unknown backend `{other}` (expected google or csv)"),
        )),
    }
}

fn build_mail_settings(mail: RawMailSettings) -> Result<MailSettings, LoadError> {
    let endpoint = non_blank(mail.endpoint)
        .map(|raw| Url::parse(&raw))
        .transpose()
        .map_err(|err| LoadError::invalid("mail.endpoint", err.to_string()))?;
    let from = non_blank(mail.from).unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string());

    Ok(MailSettings {
        endpoint,
        api_key: non_blank(mail.api_key),
        from,
    })
}

fn build_compiler_settings(compiler: RawCompilerSettings) -> Result<CompilerSettings, LoadError> {
    let program = compiler
        .program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPILER_PROGRAM));
    non_empty_path(&program, "compiler.program")?;

    let args = compiler.args.unwrap_or_else(default_compiler_args);
    let timeout = non_zero_secs(
        compiler
            .timeout_seconds
            .unwrap_or(DEFAULT_COMPILER_TIMEOUT_SECS),
        "compiler.timeout_seconds",
    )?;

    Ok(CompilerSettings {
        program,
        args,
        timeout,
    })
}

fn build_composer_settings(composer: RawComposerSettings) -> Result<ComposerSettings, LoadError> {
    let font_dir = composer
        .font_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_DIR));
    non_empty_path(&font_dir, "composer.font_dir")?;
    let font_family =
        non_blank(composer.font_family).unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string());

    Ok(ComposerSettings {
        font_dir,
        font_family,
    })
}

fn build_pipeline_settings(pipeline: RawPipelineSettings) -> Result<PipelineSettings, LoadError> {
    let work_root = pipeline
        .work_root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_ROOT));
    non_empty_path(&work_root, "pipeline.work_root")?;

    Ok(PipelineSettings {
        work_root,
        unit_deadline: non_zero_secs(
            pipeline
                .unit_deadline_seconds
                .unwrap_or(DEFAULT_UNIT_DEADLINE_SECS),
            "pipeline.unit_deadline_seconds",
        )?,
        workflow_concurrency: non_zero_u32(
            pipeline
                .workflow_concurrency
                .unwrap_or(DEFAULT_WORKFLOW_CONCURRENCY)
                .into(),
            "pipeline.workflow_concurrency",
        )?,
    })
}

fn build_workers_settings(workers: RawWorkersSettings) -> Result<WorkersSettings, LoadError> {
    let enabled = match workers.enabled {
        None => WorkerName::ALL.to_vec(),
        Some(names) => {
            let mut enabled = Vec::with_capacity(names.len());
            for name in names {
                let worker = WorkerName::try_from(name.trim()).map_err(|_| {
                    LoadError::invalid("workers.enabled", format!("unknown worker `{name}`"))
                })?;
                if !enabled.contains(&worker) {
                    enabled.push(worker);
                }
            }
            enabled
        }
    };

    let interval = |value: Option<u64>, key: &'static str| {
        non_zero_secs(value.unwrap_or(DEFAULT_WORKER_INTERVAL_SECS), key)
    };

    Ok(WorkersSettings {
        enabled,
        row_ingest_interval: interval(
            workers.row_ingest_interval_seconds,
            "workers.row_ingest_interval_seconds",
        )?,
        invoice_intake_interval: interval(
            workers.invoice_intake_interval_seconds,
            "workers.invoice_intake_interval_seconds",
        )?,
        document_generate_interval: interval(
            workers.document_generate_interval_seconds,
            "workers.document_generate_interval_seconds",
        )?,
        email_delivery_interval: interval(
            workers.email_delivery_interval_seconds,
            "workers.email_delivery_interval_seconds",
        )?,
    })
}

fn build_retry_policy(retry: RawRetrySettings) -> Result<RetryPolicy, LoadError> {
    let defaults = RetryPolicy::default();
    let max_attempts = non_zero_u32(
        retry
            .max_attempts
            .map(u64::from)
            .unwrap_or(u64::from(defaults.max_attempts)),
        "retry.max_attempts",
    )?;
    let initial_backoff = retry
        .initial_backoff_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.initial_backoff);
    let max_backoff = retry
        .max_backoff_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.max_backoff);
    if max_backoff < initial_backoff {
        return Err(LoadError::invalid(
            "retry.max_backoff_ms",
            "must not be smaller than retry.initial_backoff_ms",
        ));
    }

    Ok(RetryPolicy {
        max_attempts: max_attempts.get(),
        initial_backoff,
        max_backoff,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    root: Option<PathBuf>,
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    force_path_style: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSheetsSettings {
    backend: Option<String>,
    api_base: Option<String>,
    api_key: Option<String>,
    access_token: Option<String>,
    csv_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMailSettings {
    endpoint: Option<String>,
    api_key: Option<String>,
    from: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCompilerSettings {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawComposerSettings {
    font_dir: Option<PathBuf>,
    font_family: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPipelineSettings {
    work_root: Option<PathBuf>,
    unit_deadline_seconds: Option<u64>,
    workflow_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkersSettings {
    enabled: Option<Vec<String>>,
    row_ingest_interval_seconds: Option<u64>,
    invoice_intake_interval_seconds: Option<u64>,
    document_generate_interval_seconds: Option<u64>,
    email_delivery_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetrySettings {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_empty_path(path: &std::path::Path, key: &'static str) -> Result<(), LoadError> {
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(())
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
