//! External Command Runner
//!
//! Executes privileged external commands with piped output, a hard timeout,
//! and cancellation of hung processes. Both output streams are drained
//! concurrently while waiting so a full pipe buffer can never deadlock the
//! child.

use crate::domain::ports::{render_command, CommandRunner, Fault, FaultNotifier, FaultNotifierRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the timed command runner
#[derive(Debug, Clone)]
pub struct CommandRunnerConfig {
    /// Hard limit on process runtime
    pub timeout: Duration,
    /// Privilege-escalation wrapper prepended to every command, if any
    pub root_wrap: Option<String>,
}

impl Default for CommandRunnerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            root_wrap: None,
        }
    }
}

// =============================================================================
// Timed Command Runner
// =============================================================================

/// Everything a completed child produced
struct CapturedOutput {
    code: i32,
    stdout: String,
    stderr: String,
}

/// Command runner enforcing the configured timeout on every execution
pub struct TimedCommandRunner {
    config: CommandRunnerConfig,
    notifier: FaultNotifierRef,
}

impl TimedCommandRunner {
    pub fn new(config: CommandRunnerConfig, notifier: FaultNotifierRef) -> Self {
        Self { config, notifier }
    }

    fn build_argv(&self, command: &[String]) -> Vec<String> {
        match &self.config.root_wrap {
            Some(wrapper) => std::iter::once(wrapper.clone())
                .chain(command.iter().cloned())
                .collect(),
            None => command.to_vec(),
        }
    }

    /// Spawn the child, drain both pipes, and race completion against the
    /// timeout. On timeout the child is killed, a fault is raised to the
    /// alerting subsystem, and the caller fails.
    async fn execute(&self, command: &[String]) -> Result<CapturedOutput> {
        let argv = self.build_argv(command);
        let rendered = render_command(&argv);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Internal("empty command".into()))?;

        debug!(command = %rendered, "executing external command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                warn!(command = %rendered, "command timed out and was cancelled");
                self.notifier
                    .notify(Fault::target_daemon_unresponsive(rendered.clone()));
                return Err(Error::CommandTimeout { command: rendered });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(CapturedOutput {
            code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

async fn drain<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buffer = String::new();
    let _ = pipe.read_to_string(&mut buffer).await;
    buffer
}

#[async_trait]
impl CommandRunner for TimedCommandRunner {
    async fn run(&self, command: &[String]) -> Result<String> {
        let rendered = render_command(command);
        let output = self.execute(command).await?;

        // Diagnostics on stderr signal failure even when the exit code is 0.
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            return Err(Error::CommandFailed {
                command: rendered,
                reason: stderr.to_string(),
            });
        }
        if output.code != 0 {
            return Err(Error::CommandFailed {
                command: rendered,
                reason: format!("non-zero exit code {}", output.code),
            });
        }
        Ok(output.stdout)
    }

    async fn run_and_get_code(&self, command: &[String]) -> Result<i32> {
        Ok(self.execute(command).await?.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::FaultNotifier;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingNotifier {
        faults: Mutex<Vec<Fault>>,
    }

    impl FaultNotifier for RecordingNotifier {
        fn notify(&self, fault: Fault) {
            self.faults.lock().push(fault);
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn runner(timeout: Duration) -> (TimedCommandRunner, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = TimedCommandRunner::new(
            CommandRunnerConfig {
                timeout,
                root_wrap: None,
            },
            notifier.clone(),
        );
        (runner, notifier)
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let (runner, _) = runner(Duration::from_secs(5));
        let out = runner.run(&sh("echo hello")).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_stderr_fails_even_on_zero_exit() {
        let (runner, _) = runner(Duration::from_secs(5));
        let err = runner.run(&sh("echo oops >&2; exit 0")).await.unwrap_err();
        assert_matches!(err, Error::CommandFailed { reason, .. } if reason == "oops");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let (runner, _) = runner(Duration::from_secs(5));
        let err = runner.run(&sh("exit 3")).await.unwrap_err();
        assert_matches!(err, Error::CommandFailed { reason, .. } if reason.contains('3'));
    }

    #[tokio::test]
    async fn test_run_and_get_code_ignores_stderr() {
        let (runner, _) = runner(Duration::from_secs(5));
        assert_eq!(
            runner
                .run_and_get_code(&sh("echo oops >&2; exit 0"))
                .await
                .unwrap(),
            0
        );
        assert_eq!(runner.run_and_get_code(&sh("exit 7")).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_timeout_cancels_and_raises_fault() {
        let (runner, notifier) = runner(Duration::from_millis(100));

        let started = Instant::now();
        let err = runner.run(&sh("sleep 5")).await.unwrap_err();

        assert_matches!(err, Error::CommandTimeout { .. });
        // the child was cancelled rather than waited to completion
        assert!(started.elapsed() < Duration::from_secs(2));

        let faults = notifier.faults.lock();
        assert_eq!(faults.len(), 1);
        assert_eq!(
            faults[0].fault_id,
            crate::domain::ports::FAULT_TARGET_DAEMON_UNRESPONSIVE
        );
    }

    #[tokio::test]
    async fn test_root_wrap_is_prepended() {
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = TimedCommandRunner::new(
            CommandRunnerConfig {
                timeout: Duration::from_secs(5),
                root_wrap: Some("echo".to_string()),
            },
            notifier,
        );

        // with "echo" as the wrapper the command itself is printed, not run
        let out = runner
            .run(&vec!["definitely-not-a-binary".to_string()])
            .await
            .unwrap();
        assert_eq!(out.trim(), "definitely-not-a-binary");
    }
}
