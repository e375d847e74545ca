//! Structured external-tool invocations and the runner seam.
//!
//! Every ffmpeg/ffprobe/yt-dlp call is a [`ToolCommand`]: a program plus an
//! explicit argument list. Nothing is ever passed through a shell. Commands
//! are executed through a [`ToolRunner`] so the pipeline can be driven by a
//! scripted runner in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A program and its argument list.
///
/// # Example
///
/// ```no_run
/// use smv_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> smv_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "error", "-show_entries", "format=duration"])
///     .arg("/path/to/song.mp3")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    pub fn path_arg(&mut self, p: &Path) -> &mut Self {
        self.args.push(p.to_string_lossy().into_owned());
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Bare program name, e.g. `ffmpeg` for `/usr/bin/ffmpeg`.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Human-readable rendering for logs. Not meant to be re-parsed.
    pub fn display(&self) -> String {
        let mut s = self.tool_name();
        for a in &self.args {
            s.push(' ');
            if a.contains(' ') {
                s.push('"');
                s.push_str(a);
                s.push('"');
            } else {
                s.push_str(a);
            }
        }
        s
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`smv_core::Error::Tool`] if spawning fails, if the process
    /// exits with a non-zero status (message includes the tail of stderr),
    /// or if the timeout expires. A timed-out child is killed.
    pub async fn execute(&self) -> smv_core::Result<ToolOutput> {
        let tool = self.tool_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| smv_core::Error::tool(&tool, format!("failed to spawn: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(smv_core::Error::tool(
                    tool,
                    format!("I/O error waiting for process: {e}"),
                ))
            }
            // The future owning the child is dropped here, which kills it.
            Err(_elapsed) => {
                return Err(smv_core::Error::tool(
                    tool,
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        };

        let out = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            return Err(smv_core::Error::tool(
                tool,
                format!("exited with status {}: {}", output.status, stderr_tail(&out.stderr)),
            ));
        }

        Ok(out)
    }
}

/// Last few lines of stderr; ffmpeg prints its banner first and the actual
/// error last.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(4);
    lines[start..].join(" | ")
}

/// Executes [`ToolCommand`]s.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the command to completion. A non-zero exit is an error.
    async fn run(&self, cmd: &ToolCommand) -> smv_core::Result<ToolOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, cmd: &ToolCommand) -> smv_core::Result<ToolOutput> {
        tracing::debug!(command = %cmd.display(), "running tool");
        cmd.execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_echo() {
        let output = ToolCommand::new(PathBuf::from("echo"))
            .arg("hello")
            .execute()
            .await;

        match output {
            Ok(out) => {
                assert!(out.success());
                assert!(out.stdout.trim().contains("hello"));
            }
            Err(_) => {
                // On some minimal environments echo may not exist; skip.
            }
        }
    }

    #[tokio::test]
    async fn execute_nonexistent_tool() {
        let err = ToolCommand::new(PathBuf::from("nonexistent_tool_xyz_12345"))
            .execute()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = SystemRunner
            .run(
                ToolCommand::new(PathBuf::from("sleep"))
                    .arg("10")
                    .timeout(Duration::from_millis(100)),
            )
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("timed out") || err.contains("failed to spawn"), "unexpected error: {err}");
    }

    #[test]
    fn display_quotes_spaced_args() {
        let mut cmd = ToolCommand::new(PathBuf::from("/usr/bin/ffmpeg"));
        cmd.args(["-vf", "drawtext=text=hello world"]).arg("out.mp4");
        assert_eq!(cmd.display(), "ffmpeg -vf \"drawtext=text=hello world\" out.mp4");
        assert_eq!(cmd.get_args().len(), 3);
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let tail = stderr_tail("banner\nconfig\na\nb\nc\nError opening output");
        assert_eq!(tail, "a | b | c | Error opening output");
    }
}
