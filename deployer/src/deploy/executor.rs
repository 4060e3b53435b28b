//! External tool executor
//!
//! Runs `ansible-playbook` once, bounded by a wall-clock timeout. Every
//! outcome, including launch failures and timeouts, comes back as an
//! [`ExecutionResult`]; nothing is raised past this module.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::deploy::inventory::SSH_COMMON_ARGS;
use crate::models::extra_vars::ExtraVariables;
use crate::storage::settings::AnsibleSettings;
use crate::utils::tail;

/// Default hard limit for one playbook run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);

/// Characters of stdout/stderr kept from a run
pub const RAW_TAIL_CHARS: usize = 20_000;

/// Exit code reported when the tool produced none
pub const NO_EXIT_CODE: i32 = -1;

/// How long to wait for output pipes to drain after the process is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(5);

const VERBOSITY: &str = "-vv";

/// Outcome of one tool run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub success: bool,
    pub timed_out: bool,
    /// Wall-clock time, including cleanup after the tool exited
    pub duration: Duration,
    /// Configured limit the run was held to
    pub limit: Duration,
}

impl ExecutionResult {
    fn completed(exit_code: i32, stdout: &str, stderr: &str, limit: Duration, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout_tail: tail(stdout, RAW_TAIL_CHARS).to_string(),
            stderr_tail: tail(stderr, RAW_TAIL_CHARS).to_string(),
            success: exit_code == 0,
            timed_out: false,
            duration,
            limit,
        }
    }

    fn launch_failed(message: String, limit: Duration, duration: Duration) -> Self {
        Self {
            exit_code: NO_EXIT_CODE,
            stdout_tail: String::new(),
            stderr_tail: tail(&message, RAW_TAIL_CHARS).to_string(),
            success: false,
            timed_out: false,
            duration,
            limit,
        }
    }

    fn timed_out(limit: Duration, stdout: &str, duration: Duration) -> Self {
        Self {
            exit_code: NO_EXIT_CODE,
            stdout_tail: tail(stdout, RAW_TAIL_CHARS).to_string(),
            stderr_tail: format!("Execution timed out after {} seconds", limit.as_secs()),
            success: false,
            timed_out: true,
            duration,
            limit,
        }
    }

    fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout_tail = tail(stdout, RAW_TAIL_CHARS).to_string();
        self
    }
}

/// Everything one invocation needs
#[derive(Debug)]
pub struct Invocation<'a> {
    /// Working directory holding the playbook
    pub automation_dir: &'a Path,
    pub inventory: &'a Path,
    pub private_key: Option<&'a Path>,
    pub extra_vars: &'a ExtraVariables,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
}

/// Runs the configuration-management tool
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    playbook: String,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(settings: &AnsibleSettings) -> Self {
        Self {
            program: PathBuf::from(&settings.binary),
            playbook: settings.playbook.clone(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments in order: inventory, playbook, connection policy, key,
    /// verbosity, then one `-e` pair per extra variable
    pub fn build_args(&self, invocation: &Invocation<'_>, redact: bool) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            invocation.inventory.display().to_string(),
            self.playbook.clone(),
            "--ssh-common-args".to_string(),
            SSH_COMMON_ARGS.to_string(),
        ];
        if let Some(key) = invocation.private_key {
            args.push("--private-key".to_string());
            args.push(key.display().to_string());
        }
        args.push(VERBOSITY.to_string());
        if redact {
            args.extend(invocation.extra_vars.to_redacted_args());
        } else {
            args.extend(invocation.extra_vars.to_args());
        }
        args
    }

    /// Environment forced on top of the inherited one
    pub fn tool_env(extra: &[(String, String)]) -> Vec<(String, String)> {
        let callback = std::env::var("ANSIBLE_STDOUT_CALLBACK")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "yaml".to_string());

        let mut env = vec![
            ("ANSIBLE_HOST_KEY_CHECKING".to_string(), "False".to_string()),
            ("ANSIBLE_STDOUT_CALLBACK".to_string(), callback),
            ("ANSIBLE_NOCOLOR".to_string(), "1".to_string()),
        ];
        env.extend(extra.iter().cloned());
        env
    }

    /// Run the tool once
    pub async fn run(&self, invocation: &Invocation<'_>) -> ExecutionResult {
        let started = Instant::now();
        info!(
            "Executing: {} {}",
            self.program.display(),
            self.build_args(invocation, true).join(" ")
        );

        let mut command = Command::new(&self.program);
        command
            .args(self.build_args(invocation, false))
            .current_dir(invocation.automation_dir)
            .envs(Self::tool_env(&invocation.env))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch {}: {}", self.program.display(), e);
                return ExecutionResult::launch_failed(
                    format!("Failed to launch {}: {}", self.program.display(), e),
                    self.timeout,
                    started.elapsed(),
                );
            }
        };
        // The child is its own group leader; the id is gone once it is reaped.
        let group = child.id();

        let stdout = OutputCapture::spawn(child.stdout.take());
        let stderr = OutputCapture::spawn(child.stderr.take());

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // Background jobs left by the playbook would hold the pipes open.
                kill_group(group);
                let stdout = stdout.drain(PIPE_DRAIN_GRACE).await;
                let stderr = stderr.drain(PIPE_DRAIN_GRACE).await;
                let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
                info!("Playbook exited with {} after {:?}", exit_code, started.elapsed());
                ExecutionResult::completed(exit_code, &stdout, &stderr, self.timeout, started.elapsed())
            }
            Ok(Err(e)) => {
                error!("Failed waiting for {}: {}", self.program.display(), e);
                terminate(&mut child, group).await;
                let stdout = stdout.drain(PIPE_DRAIN_GRACE).await;
                stderr.abort();
                ExecutionResult::launch_failed(e.to_string(), self.timeout, started.elapsed())
                    .with_stdout(&stdout)
            }
            Err(_) => {
                error!("Playbook execution timed out after {:?}", self.timeout);
                terminate(&mut child, group).await;
                let stdout = stdout.drain(PIPE_DRAIN_GRACE).await;
                stderr.abort();
                ExecutionResult::timed_out(self.timeout, &stdout, started.elapsed())
            }
        }
    }
}

/// Bytes held per stream. Enough for `RAW_TAIL_CHARS` of any UTF-8 text.
const CAPTURE_BYTES: usize = RAW_TAIL_CHARS * 4 + 4;

/// A pipe read in the background into a shared buffer, so whatever arrived
/// survives a reader that never sees end-of-file.
struct OutputCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl OutputCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => append(&sink, &chunk[..n]),
                    Err(e) => {
                        debug!("Output pipe closed with error: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buf, reader }
    }

    /// Wait up to `grace` for end-of-file, then take what was read
    async fn drain(mut self, grace: Duration) -> String {
        match tokio::time::timeout(grace, &mut self.reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Output reader failed: {}", e),
            Err(_) => {
                warn!("Output pipe still open after process exit");
                self.reader.abort();
            }
        }
        self.take()
    }

    fn abort(self) {
        self.reader.abort();
    }

    fn take(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Append to a capture buffer, dropping the oldest bytes past `CAPTURE_BYTES`
fn append(buf: &Mutex<Vec<u8>>, bytes: &[u8]) {
    let mut buf = buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    buf.extend_from_slice(bytes);
    if buf.len() > CAPTURE_BYTES * 2 {
        let excess = buf.len() - CAPTURE_BYTES;
        buf.drain(..excess);
    }
}

/// SIGKILL everything left in the tool's process group
fn kill_group(group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = group {
        // SAFETY: signalling a process group we created; no memory is touched.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!("killpg({}) failed: {}", pid, std::io::Error::last_os_error());
        }
    }
    #[cfg(not(unix))]
    let _ = group;
}

/// Kill the whole process group, then the child itself, and reap it
async fn terminate(child: &mut Child, group: Option<u32>) {
    kill_group(group);
    match child.kill().await {
        Ok(()) => info!("Terminated playbook process"),
        Err(e) => warn!("Failed to kill playbook process: {}", e),
    }
}
