//! Out-of-process tool invocation with an optional deadline.

use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{PtoError, Result};

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl From<(Output, u64)> for ToolOutput {
    fn from((output, duration_ms): (Output, u64)) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        }
    }
}

/// Spawn `argv` and wait for it, killing it once `timeout_secs` elapse.
///
/// A `timeout_secs` of 0 waits indefinitely. `inherit_stdio` forwards the
/// child's output to ours instead of capturing it. The child stays in our
/// process group, so anything it starts is reached by an enclosing
/// [`run_isolated`] teardown.
pub async fn run_tool(
    operation: &str,
    argv: &[String],
    timeout_secs: u64,
    inherit_stdio: bool,
) -> Result<ToolOutput> {
    spawn_and_wait(operation, argv, timeout_secs, inherit_stdio, false).await
}

/// Like [`run_tool`], but the child leads a fresh process group.
///
/// When the child exits or the deadline passes, the whole group is killed,
/// so no process it started outlives the call.
pub async fn run_isolated(
    operation: &str,
    argv: &[String],
    timeout_secs: u64,
    inherit_stdio: bool,
) -> Result<ToolOutput> {
    spawn_and_wait(operation, argv, timeout_secs, inherit_stdio, true).await
}

async fn spawn_and_wait(
    operation: &str,
    argv: &[String],
    timeout_secs: u64,
    inherit_stdio: bool,
    isolate: bool,
) -> Result<ToolOutput> {
    let start = Instant::now();

    let (exe, args) = argv
        .split_first()
        .ok_or_else(|| PtoError::config(operation, "empty command"))?;

    debug!(operation, command = %argv.join(" "), isolate, "Spawning tool");

    let (stdout, stderr) = if inherit_stdio {
        (Stdio::inherit(), Stdio::inherit())
    } else {
        (Stdio::piped(), Stdio::piped())
    };

    let mut command = Command::new(exe);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        if isolate {
            command.process_group(0);
        }
    }

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PtoError::missing_path("executable", exe)
        } else {
            PtoError::Io(e)
        }
    })?;
    let group = if isolate { child.id() } else { None };

    let waited = if timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| PtoError::Timeout {
                operation: operation.to_string(),
                limit_secs: timeout_secs,
            })
    } else {
        Ok(child.wait_with_output().await)
    };

    if let Some(pgid) = group {
        kill_group(operation, pgid);
    }

    let output = waited??;
    let duration_ms = start.elapsed().as_millis() as u64;
    Ok(ToolOutput::from((output, duration_ms)))
}

#[cfg(unix)]
fn kill_group(operation: &str, pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!(operation, pgid, "Killed process group"),
        // Group already empty.
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(operation, pgid, "Failed to kill process group: {}", e),
    }
}

#[cfg(not(unix))]
fn kill_group(_operation: &str, _pgid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_tool_captures_stdout() {
        let out = run_tool("echo", &argv(&["echo", "hello"]), 60, false)
            .await
            .expect("run failed");
        assert!(out.success);
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_tool_reports_failure_exit() {
        let out = run_tool("false", &argv(&["false"]), 60, false)
            .await
            .expect("run failed");
        assert!(!out.success);
        assert_ne!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_run_tool_deadline() {
        let err = run_tool("sleep", &argv(&["sleep", "5"]), 1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, PtoError::Timeout { limit_secs: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_isolated_deadline_kills_background_work() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("(sleep 2; touch {}) & wait", marker.display());

        let err = run_isolated("bg", &argv(&["sh", "-c", &script]), 1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, PtoError::Timeout { limit_secs: 1, .. }));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_isolated_exit_reaps_leftover_children() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("(sleep 2; touch {}) & exit 0", marker.display());

        // Inherited stdio: a captured pipe would stay open until the sleeper ends
        let out = run_isolated("bg", &argv(&["sh", "-c", &script]), 10, true)
            .await
            .unwrap();
        assert!(out.success);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_run_tool_empty_command() {
        assert!(run_tool("nothing", &[], 0, false).await.is_err());
    }

    #[tokio::test]
    async fn test_run_tool_missing_executable() {
        let err = run_tool("ghost", &argv(&["/no/such/binary-xyz"]), 0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, PtoError::PathNotFound { .. }));
    }
}
