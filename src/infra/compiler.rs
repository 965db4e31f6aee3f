//! External typesetting compiler driven as a subprocess.

use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tokio::{fs::File, process::Command};
use tracing::{info, warn};

use crate::application::ports::{CompileError, CompilerPass, TypesetCompiler};

const WORKDIR_PLACEHOLDER: &str = "{workdir}";
const SOURCE_PLACEHOLDER: &str = "{source}";
const LOG_STAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");

/// Program plus an argument template; `{workdir}` and `{source}` are substituted per pass.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessCompiler {
    pub fn new(program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    fn expand_args(&self, workdir: &Path, source: &Path) -> Vec<OsString> {
        let workdir = workdir.to_string_lossy();
        let source = source.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                OsString::from(
                    arg.replace(WORKDIR_PLACEHOLDER, &workdir)
                        .replace(SOURCE_PLACEHOLDER, &source),
                )
            })
            .collect()
    }
}

fn log_paths(log_dir: &Path, pass: u8) -> (PathBuf, PathBuf) {
    let stamp = OffsetDateTime::now_utc()
        .format(LOG_STAMP)
        .unwrap_or_else(|_| "unknown".to_string());
    (
        log_dir.join(format!("pass{pass}-{stamp}.stdout.log")),
        log_dir.join(format!("pass{pass}-{stamp}.stderr.log")),
    )
}

#[async_trait]
impl TypesetCompiler for ProcessCompiler {
    async fn run_pass(
        &self,
        workdir: &Path,
        source: &Path,
        log_dir: &Path,
        pass: u8,
    ) -> Result<CompilerPass, CompileError> {
        let started_at = Instant::now();
        let (stdout_log, stderr_log) = log_paths(log_dir, pass);
        let stdout = File::create(&stdout_log).await?.into_std().await;
        let stderr = File::create(&stderr_log).await?.into_std().await;

        let mut child = Command::new(&self.program)
            .args(self.expand_args(workdir, source))
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!(
                    target = "infra::compiler",
                    op = "run_pass",
                    result = "error",
                    error_code = "spawn_compiler",
                    program = %self.program.display(),
                    error = %err,
                    "Failed to spawn compiler"
                );
                if err.kind() == ErrorKind::NotFound {
                    CompileError::NotFound(err)
                } else {
                    CompileError::Io(err)
                }
            })?;

        let (exit_code, timed_out) = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => (status?.code(), false),
            Err(_) => {
                child.kill().await?;
                (None, true)
            }
        };

        info!(
            target = "infra::compiler",
            op = "run_pass",
            result = if timed_out { "timeout" } else { "exited" },
            pass,
            exit_code = exit_code.map(i64::from).unwrap_or(-1),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Compiler pass finished"
        );

        Ok(CompilerPass {
            pass,
            exit_code,
            timed_out,
            stdout_log,
            stderr_log,
        })
    }
}
