//! Local process sandbox
//!
//! Each action gets a fresh temporary directory under the configured work
//! root. Commands run through `sh -c` in their own process group with that
//! directory as working directory. The whole group is killed once the
//! command returns, times out or is cancelled, so background children
//! cannot outlive it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::{io::AsyncWriteExt, process::Command};

use super::{
    command::{self, Placeholders},
    truncate_output, CompilationResult, ExecutionBackend, Execution, Sandbox,
};
use crate::{
    config::SandboxConfig,
    constants::TIMEOUT_EXIT_CODE,
    error::{AppError, AppResult},
    models::{Language, Submission, TestCase},
};

/// Backend running submissions as local processes
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    work_root: PathBuf,
    output_limit: usize,
}

impl ProcessBackend {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            work_root: config.work_root.clone(),
            output_limit: config.output_limit_bytes,
        }
    }
}

#[async_trait]
impl ExecutionBackend for ProcessBackend {
    async fn acquire(
        &self,
        submission: &Submission,
        language: &Language,
    ) -> AppResult<Box<dyn Sandbox>> {
        tokio::fs::create_dir_all(&self.work_root).await?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("sauce-{}-", submission.id))
            .tempdir_in(&self.work_root)?;

        let filename = source_file_name(submission, language);
        tokio::fs::write(dir.path().join(&filename), &submission.source).await?;

        Ok(Box::new(ProcessSandbox {
            dir: Some(dir),
            language: language.clone(),
            filename,
            output_limit: self.output_limit,
        }))
    }
}

/// Name of the source file inside a sandbox
pub fn source_file_name(submission: &Submission, language: &Language) -> String {
    command::plain_file_name(&submission.filename)
        .map(str::to_string)
        .or_else(|| {
            Path::new(&submission.filename)
                .file_name()
                .and_then(|name| name.to_str())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("{}.{}", submission.id, language.extension_src))
}

/// Temporary directory holding one submission
pub struct ProcessSandbox {
    /// `None` once released
    dir: Option<TempDir>,
    language: Language,
    filename: String,
    output_limit: usize,
}

/// Raw result of one shell invocation
struct ShellOutcome {
    returncode: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    runtime_secs: f64,
    timed_out: bool,
}

/// Kills a process group when dropped
struct GroupGuard(Option<Pid>);

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.0 else { return };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(
                pgid = pgid.as_raw(),
                error = %e,
                "Failed to kill process group"
            ),
        }
    }
}

impl ProcessSandbox {
    fn dir(&self) -> AppResult<&Path> {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| AppError::Sandbox("Sandbox already released".to_string()))
    }

    async fn shell(
        &self,
        cmd: &str,
        stdin: Option<&str>,
        timeout: Duration,
    ) -> AppResult<ShellOutcome> {
        let dir = self.dir()?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(dir)
            .env("LANG", "C.UTF-8")
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()?;
        let _group = GroupGuard(
            child
                .id()
                .and_then(|id| i32::try_from(id).ok())
                .map(Pid::from_raw),
        );

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let input = input.to_string();
            tokio::spawn(async move {
                // The program may exit without reading its input
                let _ = pipe.write_all(input.as_bytes()).await;
                let _ = pipe.shutdown().await;
            });
        }

        let start = Instant::now();
        let outcome = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                ShellOutcome {
                    returncode: output.status.code(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                    runtime_secs: start.elapsed().as_secs_f64(),
                    timed_out: false,
                }
            }
            Err(_) => ShellOutcome {
                returncode: None,
                stdout: Vec::new(),
                stderr: format!("Time limit of {:.1}s exceeded", timeout.as_secs_f64())
                    .into_bytes(),
                runtime_secs: timeout.as_secs_f64(),
                timed_out: true,
            },
        };

        Ok(outcome)
    }

    fn placeholders<'a>(&self, dir: &'a str, src: &'a str, bin: &'a str) -> Placeholders<'a> {
        Placeholders {
            path: dir,
            srcfile: src,
            binfile: bin,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn compile(&mut self, timeout: Duration) -> AppResult<Option<CompilationResult>> {
        let template = match &self.language.compile_command {
            Some(template) if self.language.needs_compilation() => template.clone(),
            _ => return Ok(None),
        };

        let dir = self.dir()?.to_path_buf();
        let dir_str = dir.display().to_string();
        let src = dir.join(&self.filename).display().to_string();
        let bin = dir.join(self.language.binary_name()).display().to_string();
        let cmd = command::render(&template, &self.placeholders(&dir_str, &src, &bin));

        let outcome = self.shell(&cmd, None, timeout).await?;

        Ok(Some(CompilationResult {
            returncode: outcome
                .returncode
                .unwrap_or(if outcome.timed_out { TIMEOUT_EXIT_CODE } else { -1 }),
            stdout: truncate_output(&outcome.stdout, self.output_limit),
            stderr: truncate_output(&outcome.stderr, self.output_limit),
            runtime_secs: outcome.runtime_secs,
            timed_out: outcome.timed_out,
        }))
    }

    async fn execute(&mut self, test: &TestCase, timeout: Duration) -> AppResult<Execution> {
        let dir = self.dir()?.to_path_buf();
        let dir_str = dir.display().to_string();
        let src = dir.join(&self.filename).display().to_string();
        let bin = dir.join(self.language.binary_name()).display().to_string();
        let infile = dir.join(file_component(test.input_file())?);
        let outfile = dir.join(file_component(test.output_file())?);
        let infile_str = infile.display().to_string();
        let outfile_str = outfile.display().to_string();

        let values = Placeholders {
            infile: &infile_str,
            outfile: &outfile_str,
            ..self.placeholders(&dir_str, &src, &bin)
        };
        let cmd = command::run_command(&self.language.run_command, test.argv.as_deref(), &values);

        let stdin = if test.reads_file() {
            tokio::fs::write(&infile, &test.input_data).await?;
            None
        } else {
            Some(test.input_data.as_str())
        };

        if test.writes_file() {
            match tokio::fs::remove_file(&outfile).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let outcome = self.shell(&cmd, stdin, timeout).await?;

        let output = if test.writes_file() && !outcome.timed_out {
            match tokio::fs::read(&outfile).await {
                Ok(bytes) => truncate_output(&bytes, self.output_limit),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(e.into()),
            }
        } else {
            truncate_output(&outcome.stdout, self.output_limit)
        };

        Ok(Execution {
            returncode: outcome.returncode,
            output,
            stderr: truncate_output(&outcome.stderr, self.output_limit),
            runtime_secs: outcome.runtime_secs,
            timed_out: outcome.timed_out,
        })
    }

    async fn release(&mut self) -> AppResult<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().display().to_string();
            dir.close()?;
            tracing::debug!(path = %path, "Removed sandbox directory");
        }
        Ok(())
    }
}

/// Reject test file names that would escape the sandbox
fn file_component(name: &str) -> AppResult<&str> {
    command::plain_file_name(name)
        .ok_or_else(|| AppError::Sandbox(format!("Invalid test file name: {}", name)))
}
