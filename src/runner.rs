//! Child runner — spawns a single process with a hard timeout, a two-stage
//! graceful-then-forced kill, and bounded output capture.
//!
//! This is the only place in the engine that actually starts a process. It
//! never retries and never raises except when the spawn itself fails — a
//! non-zero exit, a timeout, or truncated output are all encoded on
//! [`ExecutorResult`], not as errors.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::{ClimbError, Result};
use crate::sandbox::sandbox_env;

/// Default cap on captured stdout bytes.
pub const DEFAULT_MAX_STDOUT_BYTES: usize = 100_000;

/// Grace period between SIGTERM and SIGKILL when a child exceeds its timeout.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// Options controlling a single [`run`] invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    pub max_stdout_bytes: usize,
    /// Environment to hand the child. Defaults to [`sandbox_env`] when absent.
    pub env: Option<HashMap<String, String>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_stdout_bytes: DEFAULT_MAX_STDOUT_BYTES,
            env: None,
        }
    }
}

/// The outcome of running one child process to completion (or to timeout).
#[derive(Debug, Clone)]
pub struct ExecutorResult {
    /// Captured stdout, truncated at `max_stdout_bytes`. Lossy UTF-8.
    pub stdout: String,
    /// Captured stderr. Always fully drained (never causes backpressure),
    /// but is not itself byte-capped since it's rarely the payload of interest.
    pub stderr: String,
    /// `None` when the process was killed rather than exiting normally.
    pub exit_code: Option<i32>,
    pub duration_ms: u128,
    pub timed_out: bool,
}

/// Run `path [args...]` to completion, subject to `opts.timeout`.
///
/// stdin is always closed. stdout and stderr are always piped, never
/// inherited — this process has no controlling terminal to share with its
/// children. On timeout, the child receives SIGTERM, is given a short grace
/// period, and is then SIGKILLed; `timed_out` is set and `exit_code` is
/// `None` in that case.
pub async fn run(path: &str, args: &[String], opts: &RunOptions) -> Result<ExecutorResult> {
    let start = Instant::now();

    let mut cmd = Command::new(path);
    cmd.args(args);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let env = opts.env.clone().unwrap_or_else(sandbox_env);
    cmd.env_clear();
    cmd.envs(&env);

    let mut child = cmd.spawn().map_err(|e| {
        tracing::warn!(path = %path, args = ?args, error = %e, "failed to spawn child");
        ClimbError::SpawnFailure(path.to_string(), e.to_string())
    })?;
    tracing::debug!(path = %path, args = ?args, pid = ?child.id(), "spawned child");

    let stdout_pipe = child.stdout.take().expect("stdout was piped");
    let stderr_pipe = child.stderr.take().expect("stderr was piped");

    let stdout_handle = tokio::spawn(read_capped(
        BufReader::new(stdout_pipe),
        opts.max_stdout_bytes,
    ));
    let stderr_handle = tokio::spawn(read_capped(BufReader::new(stderr_pipe), usize::MAX));

    let (exit_code, timed_out) = tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| ClimbError::SpawnFailure(path.to_string(), e.to_string()))?;
            (status.code(), false)
        }
        _ = tokio::time::sleep(opts.timeout) => {
            terminate(&mut child).await;
            (None, true)
        }
    };

    let stdout_bytes = stdout_handle.await.unwrap_or_default();
    let stderr_bytes = stderr_handle.await.unwrap_or_default();
    let duration_ms = start.elapsed().as_millis();

    if timed_out {
        tracing::warn!(path = %path, duration_ms = %duration_ms, "child timed out, killed");
    } else {
        tracing::info!(path = %path, ?exit_code, duration_ms = %duration_ms, "child exited");
    }

    Ok(ExecutorResult {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code,
        duration_ms,
        timed_out,
    })
}

/// Send SIGTERM, wait a short grace period, then SIGKILL if still alive.
///
/// On non-Unix targets there is no graceful signal to send, so this falls
/// straight through to a forced kill.
async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);

            tokio::select! {
                _ = child.wait() => return,
                _ = tokio::time::sleep(KILL_GRACE) => {}
            }

            if child.id().is_some() {
                let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
            }
        }
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Drain a reader to EOF, keeping only the first `max_bytes`.
///
/// Draining continues past the cap so the child never blocks on a full pipe
/// buffer; bytes beyond the cap are simply discarded.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
    let mut chunk = [0u8; 8192];
    let mut remaining = max_bytes;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        if remaining > 0 {
            let take = n.min(remaining);
            buf.extend_from_slice(&chunk[..take]);
            remaining -= take;
        }
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_echo_captures_stdout() {
        let result = run(
            "echo",
            &["hello".to_string(), "world".to_string()],
            &RunOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.stdout.trim(), "hello world");
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_spawn_failure_on_missing_binary() {
        let result = run(
            "climb-test-definitely-not-a-real-binary",
            &[],
            &RunOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(ClimbError::SpawnFailure(_, _))));
    }

    #[tokio::test]
    async fn test_timeout_on_hung_child() {
        let opts = RunOptions {
            timeout: Duration::from_millis(200),
            ..RunOptions::default()
        };
        let result = run("sleep", &["60".to_string()], &opts).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(result.duration_ms < 2000);
    }

    #[tokio::test]
    async fn test_stdout_capped() {
        let opts = RunOptions {
            max_stdout_bytes: 16,
            ..RunOptions::default()
        };
        // yes outputs "y\n" repeatedly; head bounds runtime, but we only read 16 bytes worth.
        let result = run(
            "sh",
            &["-c".to_string(), "for i in $(seq 1 10000); do echo line$i; done".to_string()],
            &opts,
        )
        .await
        .unwrap();
        assert!(result.stdout.len() <= 16);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let result = run("sh", &["-c".to_string(), "exit 7".to_string()], &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(7));
    }
}
