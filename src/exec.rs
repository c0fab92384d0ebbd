//! External command execution with a bounded timeout
//!
//! Used by the copilot's `kubectl_exec` tool, the kubectl resource backend,
//! and pass-through command-bar input. A timeout is reported as a failure
//! with whatever output was captured; the process is not retried.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Default timeout for pass-through and tool commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one external command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// stdout on success, stderr (or the failure description) otherwise
    pub output: String,
    pub failed: bool,
}

/// Runs external commands (kubectl and friends) off the UI task.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Executes `argv` and collects its output, failing after `timeout`.
    pub async fn execute(&self, argv: &[String], timeout: Duration) -> ExecOutput {
        let Some((program, args)) = argv.split_first() else {
            return ExecOutput {
                output: "empty command".to_string(),
                failed: true,
            };
        };
        tracing::debug!(command = %argv.join(" "), "executing external command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(out)) => {
                let stdout = String::from_utf8_lossy(&out.stdout).trim_end().to_string();
                let stderr = String::from_utf8_lossy(&out.stderr).trim_end().to_string();
                if out.status.success() {
                    ExecOutput {
                        output: stdout,
                        failed: false,
                    }
                } else {
                    ExecOutput {
                        output: if stderr.is_empty() { stdout } else { stderr },
                        failed: true,
                    }
                }
            }
            Ok(Err(err)) => ExecOutput {
                output: format!("failed to run {}: {}", program, err),
                failed: true,
            },
            Err(_) => ExecOutput {
                output: format!("{} timed out after {:?}", program, timeout),
                failed: true,
            },
        }
    }
}
