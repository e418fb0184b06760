//! Builder for executing external tool commands with timeout support.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tf_core::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of stderr lines kept by [`ToolCommand::execute_streaming`].
const DEFAULT_STDERR_TAIL: usize = 30;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// Result of a streamed execution. Stdout went to the line callback.
#[derive(Debug, Clone)]
pub struct StreamOutput {
    pub status: ExitStatus,
    /// The last stderr lines, oldest first.
    pub stderr_tail: Vec<String>,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use tf_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> tf_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "error", "-print_format", "json"])
///     .arg("-show_format")
///     .arg("/music/track.m4a")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    stderr_tail: usize,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            stderr_tail: DEFAULT_STDERR_TAIL,
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

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// How many trailing stderr lines a streamed run keeps for diagnostics.
    pub fn stderr_tail(&mut self, lines: usize) -> &mut Self {
        self.stderr_tail = lines;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transcode`] if spawning fails, the process times out,
    /// or it exits with a non-zero status (message includes stderr).
    pub async fn execute(&self) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let child = self
            .command()
            .spawn()
            .map_err(|e| Error::transcode(&program_name, format!("failed to spawn: {e}")))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(Error::transcode(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(Error::transcode(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            // The child future was dropped; kill_on_drop reaps the process.
            Err(_elapsed) => Err(Error::transcode(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }

    /// Execute the command, handing each stdout line to `on_line` as it
    /// arrives while stderr is drained concurrently into a bounded tail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transcode`] on spawn failure, timeout, or non-zero
    /// exit. For a non-zero exit the message is the retained stderr tail, or
    /// a fixed fallback when the process wrote nothing to stderr.
    pub async fn execute_streaming(&self, mut on_line: impl FnMut(&str)) -> Result<StreamOutput> {
        let program_name = self.program_name();

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| Error::transcode(&program_name, format!("failed to spawn: {e}")))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(Error::transcode(program_name, "process pipes unavailable"));
        };

        let tail_len = self.stderr_tail;
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(tail_len);
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = next_lossy_line(&mut reader, &mut buf).await {
                if tail_len == 0 {
                    continue;
                }
                if tail.len() == tail_len {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let run = async {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            while let Some(line) = next_lossy_line(&mut reader, &mut buf).await? {
                on_line(&line);
            }
            child.wait().await
        };

        let outcome = tokio::time::timeout(self.timeout, run).await;
        let status = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(Error::transcode(
                    program_name,
                    format!("I/O error reading process output: {e}"),
                ))
            }
            Err(_elapsed) => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(Error::transcode(
                    program_name,
                    format!("timed out after {:?}", self.timeout),
                ));
            }
        };

        let stderr_tail: Vec<String> = stderr_task.await.map(Vec::from).unwrap_or_default();

        if !status.success() {
            let tail = stderr_tail.join("\n");
            let message = if tail.trim().is_empty() {
                format!("{program_name} failed with {status} (no stderr output)")
            } else {
                tail.trim().to_string()
            };
            return Err(Error::transcode(program_name, message));
        }

        Ok(StreamOutput {
            status,
            stderr_tail,
        })
    }
}

/// Read one `\n`-terminated line, decoding invalid UTF-8 lossily.
/// `None` at end of stream.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new(PathBuf::from("sh"));
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn execute_echo() {
        let output = ToolCommand::new(PathBuf::from("echo"))
            .arg("hello")
            .execute()
            .await;

        match output {
            Ok(out) => {
                assert!(out.status.success());
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
        assert_eq!(err.stage(), "transcode");
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn timeout_fires() {
        let result = ToolCommand::new(PathBuf::from("sleep"))
            .arg("10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("timed out"), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_delivers_stdout_lines_in_order() {
        let mut seen = Vec::new();
        let out = sh("printf 'a=1\\nb=2\\n\\nc=3\\n'")
            .execute_streaming(|line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(seen, ["a=1", "b=2", "", "c=3"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_failure_reports_stderr_tail() {
        let err = sh("i=0; while [ $i -lt 50 ]; do echo \"err $i\" >&2; i=$((i+1)); done; exit 3")
            .stderr_tail(5)
            .execute_streaming(|_| {})
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("err 49"), "{msg}");
        assert!(msg.contains("err 45"), "{msg}");
        assert!(!msg.contains("err 44"), "{msg}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_failure_without_stderr_uses_fallback() {
        let err = sh("exit 1").execute_streaming(|_| {}).await.unwrap_err();
        assert!(err.to_string().contains("no stderr output"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_survives_heavy_stderr() {
        // Far more than a pipe buffer; only works if stderr is drained.
        let mut lines = 0;
        let out = sh("i=0; while [ $i -lt 5000 ]; do echo \"noise line $i padding padding padding\" >&2; i=$((i+1)); done; echo done=1")
            .timeout(Duration::from_secs(30))
            .execute_streaming(|_| lines += 1)
            .await
            .unwrap();
        assert_eq!(lines, 1);
        assert_eq!(out.stderr_tail.len(), DEFAULT_STDERR_TAIL);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_keeps_draining_after_invalid_utf8() {
        let out = sh("printf 'bad \\377\\376 bytes\\n' >&2; printf 'out \\377\\n'; i=0; while [ $i -lt 8000 ]; do echo \"noise line $i padding padding padding\" >&2; i=$((i+1)); done; echo progress=end")
            .timeout(Duration::from_secs(30))
            .stderr_tail(3)
            .execute_streaming(|_| {})
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stderr_tail.last().map(String::as_str), Some("noise line 7999 padding padding padding"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_lines_are_decoded_lossily() {
        let mut seen = Vec::new();
        let err = sh("printf 'key=\\377\\nprogress=end\\n'; printf 'oops \\377\\n' >&2; exit 2")
            .execute_streaming(|line| seen.push(line.to_string()))
            .await
            .unwrap_err();
        assert_eq!(seen, ["key=\u{FFFD}", "progress=end"]);
        assert!(err.to_string().contains("oops \u{FFFD}"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_timeout_kills_process() {
        let err = sh("sleep 10")
            .timeout(Duration::from_millis(100))
            .execute_streaming(|_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
