//! Docker sandbox
//!
//! One short-lived container per action. Files are written through `base64`
//! and every command is bounded twice: by `timeout(1)` inside the container
//! and by a tokio timer around the exec stream.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use bollard::{
    container::LogOutput,
    exec::{CreateExecOptions, StartExecResults},
    models::{ContainerCreateBody, HostConfig},
    query_parameters::{
        CreateContainerOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
    },
    Docker,
};
use futures::StreamExt;
use uuid::Uuid;

use super::{
    command::{self, Placeholders},
    process::source_file_name,
    truncate_output, CompilationResult, ExecutionBackend, Execution, Sandbox,
};
use crate::{
    config::SandboxConfig,
    constants::{CONTAINER_WORKDIR, SANDBOX_PIDS_LIMIT, TIMEOUT_EXIT_CODE},
    error::{AppError, AppResult},
    models::{Language, Submission, TestCase},
};

/// Grace period for the outer timer beyond the in-container bound
const EXEC_GRACE: Duration = Duration::from_secs(2);

/// Raw bytes per write; keeps each exec argument well below `MAX_ARG_STRLEN`
const WRITE_CHUNK_BYTES: usize = 48 * 1024;

/// Backend running each action in a fresh container
#[derive(Clone)]
pub struct DockerBackend {
    docker: Docker,
    config: SandboxConfig,
}

impl DockerBackend {
    pub fn new(docker: Docker, config: SandboxConfig) -> Self {
        Self { docker, config }
    }

    /// Connect to the configured Docker socket
    pub fn connect(config: &SandboxConfig) -> AppResult<Self> {
        let docker = Docker::connect_with_socket(
            &config.docker_socket,
            120,
            bollard::API_DEFAULT_VERSION,
        )?;
        Ok(Self::new(docker, config.clone()))
    }

    /// Version string reported by the Docker daemon
    pub async fn version(&self) -> AppResult<String> {
        let version = self.docker.version().await?;
        Ok(version.version.unwrap_or_default())
    }

    async fn create_container(&self, submission_id: &Uuid, image: &str) -> AppResult<String> {
        let container_name = format!("sauce-{}-{}", submission_id, Uuid::new_v4().simple());

        let options = CreateContainerOptionsBuilder::default()
            .name(&container_name)
            .build();

        let memory = (self.config.memory_limit_mb * 1024 * 1024) as i64;
        let host_config = HostConfig {
            memory: Some(memory),
            memory_swap: Some(memory),
            cpu_period: Some(100000),
            cpu_quota: Some(100000),
            network_mode: Some(self.config.network_name.clone()),
            pids_limit: Some(SANDBOX_PIDS_LIMIT),
            readonly_rootfs: Some(false),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(image.to_string()),
            // Keep the container alive between execs
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            tty: Some(false),
            open_stdin: Some(false),
            host_config: Some(host_config),
            working_dir: Some(CONTAINER_WORKDIR.to_string()),
            env: Some(vec!["LANG=C.UTF-8".to_string()]),
            labels: Some(HashMap::from([(
                "sauce.submission".to_string(),
                submission_id.to_string(),
            )])),
            ..Default::default()
        };

        let container = self.docker.create_container(Some(options), body).await?;

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await
        {
            remove_container(&self.docker, &container.id).await.ok();
            return Err(e.into());
        }

        Ok(container.id)
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    async fn acquire(
        &self,
        submission: &Submission,
        language: &Language,
    ) -> AppResult<Box<dyn Sandbox>> {
        let container_id = self.create_container(&submission.id, &language.image).await?;
        tracing::debug!(
            submission_id = %submission.id,
            container_id = %container_id,
            "Container started"
        );

        let mut sandbox = DockerSandbox {
            docker: self.docker.clone(),
            container_id: Some(container_id),
            language: language.clone(),
            filename: source_file_name(submission, language),
            output_limit: self.config.output_limit_bytes,
        };

        let path = format!("{}/{}", CONTAINER_WORKDIR, sandbox.filename);
        if let Err(e) = sandbox.write_file(&path, submission.source.as_bytes()).await {
            sandbox.release().await.ok();
            return Err(e);
        }

        Ok(Box::new(sandbox))
    }
}

/// Output of a command executed in the container
struct ExecOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i64,
    runtime_secs: f64,
    timed_out: bool,
}

/// Running container for one action
pub struct DockerSandbox {
    docker: Docker,
    /// `None` once released
    container_id: Option<String>,
    language: Language,
    filename: String,
    output_limit: usize,
}

impl DockerSandbox {
    fn container_id(&self) -> AppResult<&str> {
        self.container_id
            .as_deref()
            .ok_or_else(|| AppError::Sandbox("Sandbox already released".to_string()))
    }

    fn placeholders<'a>(&self, src: &'a str, bin: &'a str) -> Placeholders<'a> {
        Placeholders {
            path: CONTAINER_WORKDIR,
            srcfile: src,
            binfile: bin,
            ..Default::default()
        }
    }

    /// Write a file to the container in base64 chunks
    async fn write_file(&self, path: &str, content: &[u8]) -> AppResult<()> {
        let target = command::shell_quote(path);
        let mut chunks: Vec<&[u8]> = content.chunks(WRITE_CHUNK_BYTES).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        for (i, chunk) in chunks.into_iter().enumerate() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(chunk);
            let redirect = if i == 0 { ">" } else { ">>" };
            let cmd = format!("printf '%s' '{}' | base64 -d {} {}", encoded, redirect, target);

            let result = self.exec(&cmd, Duration::from_secs(30)).await?;
            if result.exit_code != 0 {
                return Err(AppError::Sandbox(format!(
                    "Failed to write {}: {}",
                    path,
                    String::from_utf8_lossy(&result.stderr)
                )));
            }
        }

        Ok(())
    }

    /// Execute a shell command bounded by `timeout`
    async fn exec(&self, cmd: &str, timeout: Duration) -> AppResult<ExecOutput> {
        let container_id = self.container_id()?;
        let bounded = format!(
            "timeout -s KILL {:.3} sh -c {}",
            timeout.as_secs_f64(),
            command::shell_quote(cmd)
        );

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["/bin/sh", "-c", bounded.as_str()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(CONTAINER_WORKDIR),
                    ..Default::default()
                },
            )
            .await?;

        let start = Instant::now();
        let output = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let limit = self.output_limit + 1;

        let collect = async {
            if let StartExecResults::Attached { mut output, .. } = output {
                while let Some(msg) = output.next().await {
                    match msg? {
                        LogOutput::StdOut { message } if stdout.len() < limit => {
                            stdout.extend_from_slice(&message);
                        }
                        LogOutput::StdErr { message } if stderr.len() < limit => {
                            stderr.extend_from_slice(&message);
                        }
                        _ => {}
                    }
                }
            }
            Ok::<(), bollard::errors::Error>(())
        };

        let finished = tokio::time::timeout(timeout + EXEC_GRACE, collect).await;
        let runtime_secs = start.elapsed().as_secs_f64();

        match finished {
            Ok(result) => result?,
            Err(_) => {
                return Ok(ExecOutput {
                    stdout,
                    stderr,
                    exit_code: TIMEOUT_EXIT_CODE as i64,
                    runtime_secs,
                    timed_out: true,
                });
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(-1);
        // `timeout -s KILL` reports 137 when it had to kill the command
        let timed_out = exit_code == TIMEOUT_EXIT_CODE as i64
            || (exit_code == 137 && runtime_secs >= timeout.as_secs_f64());

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
            runtime_secs: if timed_out { timeout.as_secs_f64() } else { runtime_secs },
            timed_out,
        })
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn compile(&mut self, timeout: Duration) -> AppResult<Option<CompilationResult>> {
        let template = match self.language.compile_command.as_deref() {
            Some(template) if self.language.needs_compilation() => template,
            _ => return Ok(None),
        };

        let src = format!("{}/{}", CONTAINER_WORKDIR, self.filename);
        let bin = format!("{}/{}", CONTAINER_WORKDIR, self.language.binary_name());
        let cmd = command::render(template, &self.placeholders(&src, &bin));

        let result = self.exec(&cmd, timeout).await?;
        let mut stderr = truncate_output(&result.stderr, self.output_limit);
        if result.timed_out {
            stderr.push_str(&format!("\nCompilation exceeded {:.1}s", timeout.as_secs_f64()));
        }

        Ok(Some(CompilationResult {
            returncode: if result.timed_out { TIMEOUT_EXIT_CODE } else { result.exit_code as i32 },
            stdout: truncate_output(&result.stdout, self.output_limit),
            stderr,
            runtime_secs: result.runtime_secs,
            timed_out: result.timed_out,
        }))
    }

    async fn execute(&mut self, test: &TestCase, timeout: Duration) -> AppResult<Execution> {
        let input_name = command::plain_file_name(test.input_file()).ok_or_else(|| {
            AppError::Sandbox(format!("Invalid test file name: {}", test.input_file()))
        })?;
        let output_name = command::plain_file_name(test.output_file()).ok_or_else(|| {
            AppError::Sandbox(format!("Invalid test file name: {}", test.output_file()))
        })?;

        let src = format!("{}/{}", CONTAINER_WORKDIR, self.filename);
        let bin = format!("{}/{}", CONTAINER_WORKDIR, self.language.binary_name());
        let infile = format!("{}/{}", CONTAINER_WORKDIR, input_name);
        let outfile = format!("{}/{}", CONTAINER_WORKDIR, output_name);
        let stdin_file = format!("{}/.stdin", CONTAINER_WORKDIR);

        let values = Placeholders {
            infile: &infile,
            outfile: &outfile,
            ..self.placeholders(&src, &bin)
        };
        let run = command::run_command(&self.language.run_command, test.argv.as_deref(), &values);

        let cmd = if test.reads_file() {
            self.write_file(&infile, test.input_data.as_bytes()).await?;
            format!("{} < /dev/null", run)
        } else {
            self.write_file(&stdin_file, test.input_data.as_bytes()).await?;
            format!("{} < {}", run, command::shell_quote(&stdin_file))
        };
        let cmd = if test.writes_file() {
            format!("rm -f {} && {}", command::shell_quote(&outfile), cmd)
        } else {
            cmd
        };

        let result = self.exec(&cmd, timeout).await?;

        let output = if test.writes_file() && !result.timed_out {
            let cat = format!("cat {} 2>/dev/null || true", command::shell_quote(&outfile));
            let file = self.exec(&cat, Duration::from_secs(30)).await?;
            truncate_output(&file.stdout, self.output_limit)
        } else {
            truncate_output(&result.stdout, self.output_limit)
        };

        Ok(Execution {
            returncode: if result.timed_out { None } else { Some(result.exit_code as i32) },
            output,
            stderr: truncate_output(&result.stderr, self.output_limit),
            runtime_secs: result.runtime_secs,
            timed_out: result.timed_out,
        })
    }

    async fn release(&mut self) -> AppResult<()> {
        if let Some(container_id) = self.container_id.take() {
            remove_container(&self.docker, &container_id).await?;
            tracing::debug!(container_id = %container_id, "Container removed");
        }
        Ok(())
    }
}

impl Drop for DockerSandbox {
    fn drop(&mut self) {
        let Some(container_id) = self.container_id.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let docker = self.docker.clone();
                handle.spawn(async move {
                    if let Err(e) = remove_container(&docker, &container_id).await {
                        tracing::warn!(
                            container_id = %container_id,
                            error = %e,
                            "Failed to remove container"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    container_id = %container_id,
                    "Container leaked, no runtime to remove it"
                );
            }
        }
    }
}

/// Force-remove a container
async fn remove_container(docker: &Docker, container_id: &str) -> AppResult<()> {
    let options = RemoveContainerOptionsBuilder::default().force(true).build();
    docker.remove_container(container_id, Some(options)).await?;
    Ok(())
}
