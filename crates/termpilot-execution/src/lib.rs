//! Shell command execution for the terminal agent.
//!
//! Commands run under `bash -c` (or a configured shell) with line-streamed
//! output, a wall-clock timeout, and cooperative cancellation. Cancellation
//! reports exit code 130 (the SIGINT convention) and timeout reports 124 (the
//! `timeout(1)` convention) so the agent loop can treat both as ordinary
//! failed completions.

use anyhow::Result;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Exit code reported when a command is cancelled mid-flight.
pub const CANCEL_EXIT_CODE: i32 = 130;

/// Exit code reported when a command exceeds its wall-clock timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Expand tilde (~) in a path to the user's home directory
fn expand_tilde(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = std::env::var_os("HOME") {
            let home_str = home.to_string_lossy();
            return path.replacen('~', &home_str, 1);
        }
    }
    path.to_string()
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl ExecutionResult {
    fn from_parts(stdout: Vec<String>, stderr: Vec<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.join("\n"),
            stderr: stderr.join("\n"),
            exit_code,
            success: exit_code == 0,
        }
    }

    /// Combined output as the agent loop sees it (stdout then stderr).
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Trait for receiving streaming output from command execution
pub trait OutputReceiver: Send + Sync {
    /// Called when a new line of output is available
    fn on_output_line(&self, line: &str);
}

/// Receiver that drops all output (for callers that only want the result).
pub struct NullReceiver;

impl OutputReceiver for NullReceiver {
    fn on_output_line(&self, _line: &str) {}
}

pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }

    pub fn with_shell(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }

    /// Execute a command with streaming output, a timeout, and a cancellation
    /// token. Cancellation and timeout both kill the child and report a
    /// synthetic exit code; they are not errors at this level.
    pub async fn execute<R: OutputReceiver>(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Duration,
        cancel: &CancellationToken,
        receiver: &R,
    ) -> Result<ExecutionResult> {
        debug!("Executing command: {}", command);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            let expanded_dir = expand_tilde(dir);
            debug!("Working directory: {}", expanded_dir);
            cmd.current_dir(&expanded_dir);
        }

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stderr was not captured"))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let mut stdout_output = Vec::new();
        let mut stderr_output = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        // Read output lines as they come, racing against cancel and timeout
        while !(stdout_done && stderr_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Command cancelled, killing child");
                    let _ = child.kill().await;
                    return Ok(ExecutionResult::from_parts(
                        stdout_output,
                        stderr_output,
                        CANCEL_EXIT_CODE,
                    ));
                }
                _ = &mut deadline => {
                    debug!("Command timed out after {:?}, killing child", timeout);
                    let _ = child.kill().await;
                    stderr_output.push(format!(
                        "command timed out after {} seconds",
                        timeout.as_secs()
                    ));
                    return Ok(ExecutionResult::from_parts(
                        stdout_output,
                        stderr_output,
                        TIMEOUT_EXIT_CODE,
                    ));
                }
                line = stdout_lines.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            receiver.on_output_line(&line);
                            stdout_output.push(line);
                        }
                        Ok(None) => stdout_done = true,
                        Err(e) => {
                            error!("Error reading stdout: {}", e);
                            stdout_done = true;
                        }
                    }
                }
                line = stderr_lines.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            receiver.on_output_line(&line);
                            stderr_output.push(line);
                        }
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            error!("Error reading stderr: {}", e);
                            stderr_done = true;
                        }
                    }
                }
            }
        }

        // Output streams are closed; the process may still be running
        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Ok(ExecutionResult::from_parts(
                    stdout_output,
                    stderr_output,
                    CANCEL_EXIT_CODE,
                ));
            }
            _ = &mut deadline => {
                let _ = child.kill().await;
                stderr_output.push(format!(
                    "command timed out after {} seconds",
                    timeout.as_secs()
                ));
                return Ok(ExecutionResult::from_parts(
                    stdout_output,
                    stderr_output,
                    TIMEOUT_EXIT_CODE,
                ));
            }
            status = child.wait() => status?,
        };

        let exit_code = status.code().unwrap_or(-1);
        debug!("Command finished with exit code {}", exit_code);

        Ok(ExecutionResult::from_parts(
            stdout_output,
            stderr_output,
            exit_code,
        ))
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}
