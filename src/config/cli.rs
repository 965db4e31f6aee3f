use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use uuid::Uuid;

/// Command-line arguments for the docket binary.
#[derive(Debug, Parser)]
#[command(name = "docket", version, about = "Document generation and delivery pipeline")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DOCKET_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run migrations, the polling workers and the workflow queue.
    Serve(Box<ServeArgs>),
    /// Run one leased cycle of a polling worker and exit.
    #[command(name = "run-worker")]
    RunWorker(RunWorkerArgs),
    /// Queue a workflow instance for one unit of work.
    Enqueue(EnqueueArgs),
    /// Apply database migrations and install the queue schema.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the directory holding per-job compiler working directories.
    #[arg(long = "work-root", value_name = "PATH")]
    pub work_root: Option<PathBuf>,

    /// Override the workflow queue concurrency.
    #[arg(long = "workflow-concurrency", value_name = "COUNT")]
    pub workflow_concurrency: Option<u32>,

    /// Restrict the polling workers started (repeatable).
    #[arg(long = "worker", value_name = "NAME")]
    pub workers: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RunWorkerArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Worker to run: row-ingest, invoice-intake, document-generate or email-delivery.
    #[arg(value_name = "NAME")]
    pub worker: String,
}

#[derive(Debug, Args, Clone)]
pub struct EnqueueArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub target: EnqueueTarget,
}

#[derive(Debug, Subcommand, Clone)]
pub enum EnqueueTarget {
    /// A spreadsheet row of a sheet-backed template.
    Row {
        #[arg(long = "template", value_name = "ID")]
        template: String,
        /// Data row offset, 0 being the first row after the header.
        #[arg(long = "offset", value_name = "N")]
        offset: u64,
    },
    /// An invoice flagged ready for processing.
    Invoice {
        #[arg(long = "id", value_name = "UUID")]
        id: Uuid,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}
