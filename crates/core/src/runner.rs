//! Streaming child-process runner.
//!
//! Spawns a job executable with piped stdio and delivers its output as
//! complete lines, one [`OutputLine`] per line per stream, while the
//! process runs. Line framing is deliberate: pipe chunk boundaries do not
//! align with record boundaries, so downstream classification only ever
//! sees whole lines.
//!
//! Run parameters are piped to the child's stdin as a single JSON
//! document; identifiers travel in environment variables.

use std::os::unix::fs::PermissionsExt;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::job::JobSpec;

/// Which output stream a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One complete line of child-process output.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// Errors from spawning a job process.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The executable was not found at the configured path.
    #[error("Executable not found: {0}")]
    NotFound(String),

    /// The executable exists but lacks execute permissions.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Any other I/O error while spawning.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A spawned job process with its output streaming in.
///
/// Consume lines with [`next_line`](Self::next_line) until it returns
/// `None` (both streams reached EOF), then call [`wait`](Self::wait) for
/// the exit code. The child is killed if this is dropped early.
pub struct RunningJob {
    lines: mpsc::UnboundedReceiver<OutputLine>,
    child: Child,
}

impl RunningJob {
    /// Next line of output, in per-stream order. `None` once both
    /// streams are exhausted.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Wait for the process to exit and return its exit code
    /// (`-1` if killed by a signal).
    pub async fn wait(mut self) -> Result<i32, RunnerError> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Spawn the job described by `spec` and start streaming its output.
///
/// Verifies the executable exists and is executable before spawning, so
/// misconfigured jobs fail with a precise error instead of a raw spawn
/// failure. `env_vars` are set on the child; `stdin_payload` is written
/// to its stdin as JSON, then stdin is closed.
pub async fn spawn_streaming(
    spec: &JobSpec,
    env_vars: Vec<(String, String)>,
    stdin_payload: serde_json::Value,
) -> Result<RunningJob, RunnerError> {
    let metadata = tokio::fs::metadata(&spec.program)
        .await
        .map_err(|_| RunnerError::NotFound(spec.program.clone()))?;

    let mode = metadata.permissions().mode();
    if mode & 0o111 == 0 {
        return Err(RunnerError::PermissionDenied(format!(
            "{} is not executable (mode {mode:#o})",
            spec.program
        )));
    }

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &env_vars {
        cmd.env(key, value);
    }

    if let Some(dir) = &spec.working_directory {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RunnerError::NotFound(spec.program.clone()),
        std::io::ErrorKind::PermissionDenied => {
            RunnerError::PermissionDenied(spec.program.clone())
        }
        _ => RunnerError::Io(e),
    })?;

    // Write the parameter payload to stdin from a task so a child that
    // produces output before reading stdin cannot deadlock the spawn.
    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(&stdin_payload).unwrap_or_default();
        tokio::spawn(async move {
            // Best-effort: a child that closes stdin early is fine.
            let _ = stdin.write_all(&payload).await;
            drop(stdin);
        });
    }

    let (tx, rx) = mpsc::unbounded_channel();

    // One reader task per stream. The channel closes once both senders
    // are dropped, which is how `next_line` learns about EOF.
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_lines(stdout, OutputStream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_lines(stderr, OutputStream::Stderr, tx.clone()));
    }
    drop(tx);

    Ok(RunningJob { lines: rx, child })
}

/// Read a stream to EOF, forwarding each complete line.
async fn read_lines<R: AsyncRead + Unpin>(
    stream: R,
    kind: OutputStream,
    tx: mpsc::UnboundedSender<OutputLine>,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(OutputLine { stream: kind, line }).is_err() {
                    // Receiver dropped; the run is being torn down.
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(stream = ?kind, error = %e, "Output stream read error");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Write an executable temp script with the given body.
    fn write_script(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/sh").expect("write shebang");
        write!(f, "{body}").expect("write body");
        let mut perms = f.as_file().metadata().expect("metadata").permissions();
        perms.set_mode(0o755);
        f.as_file().set_permissions(perms).expect("chmod");
        f
    }

    fn spec_for(script: &tempfile::NamedTempFile) -> JobSpec {
        JobSpec {
            id: "test".to_string(),
            program: script.path().to_str().expect("path").to_string(),
            args: vec![],
            working_directory: None,
            total_steps: None,
        }
    }

    async fn collect(job: &mut RunningJob) -> Vec<OutputLine> {
        let mut out = Vec::new();
        while let Some(line) = job.next_line().await {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn streams_stdout_lines_in_order() {
        let script = write_script("echo one\necho two\necho three\n");
        let mut job = spawn_streaming(&spec_for(&script), vec![], serde_json::json!({}))
            .await
            .expect("spawn");

        let lines = collect(&mut job).await;
        let texts: Vec<&str> = lines.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(lines.iter().all(|l| l.stream == OutputStream::Stdout));

        assert_eq!(job.wait().await.expect("wait"), 0);
    }

    #[tokio::test]
    async fn tags_stderr_lines() {
        let script = write_script("echo out\necho err 1>&2\n");
        let mut job = spawn_streaming(&spec_for(&script), vec![], serde_json::json!({}))
            .await
            .expect("spawn");

        let lines = collect(&mut job).await;
        let stderr: Vec<&OutputLine> = lines
            .iter()
            .filter(|l| l.stream == OutputStream::Stderr)
            .collect();
        assert_eq!(stderr.len(), 1);
        assert_eq!(stderr[0].line, "err");

        job.wait().await.expect("wait");
    }

    #[tokio::test]
    async fn reports_nonzero_exit_code() {
        let script = write_script("exit 42\n");
        let mut job = spawn_streaming(&spec_for(&script), vec![], serde_json::json!({}))
            .await
            .expect("spawn");

        collect(&mut job).await;
        assert_eq!(job.wait().await.expect("wait"), 42);
    }

    #[tokio::test]
    async fn pipes_parameters_to_stdin() {
        let script = write_script("cat\n");
        let mut job = spawn_streaming(
            &spec_for(&script),
            vec![],
            serde_json::json!({"sample": "s-17"}),
        )
        .await
        .expect("spawn");

        let lines = collect(&mut job).await;
        assert!(lines.iter().any(|l| l.line.contains("s-17")));
        job.wait().await.expect("wait");
    }

    #[tokio::test]
    async fn sets_env_vars() {
        let script = write_script("echo $LABSTREAM_RUN_ID\n");
        let mut job = spawn_streaming(
            &spec_for(&script),
            vec![("LABSTREAM_RUN_ID".to_string(), "r-1".to_string())],
            serde_json::json!({}),
        )
        .await
        .expect("spawn");

        let lines = collect(&mut job).await;
        assert_eq!(lines[0].line, "r-1");
        job.wait().await.expect("wait");
    }

    #[tokio::test]
    async fn missing_executable_is_not_found() {
        let spec = JobSpec {
            id: "ghost".to_string(),
            program: "/nonexistent/job.sh".to_string(),
            args: vec![],
            working_directory: None,
            total_steps: None,
        };
        let result = spawn_streaming(&spec, vec![], serde_json::json!({})).await;
        assert!(matches!(result, Err(RunnerError::NotFound(_))));
    }

    #[tokio::test]
    async fn non_executable_file_is_permission_denied() {
        let f = tempfile::NamedTempFile::new().expect("create temp file");
        let spec = JobSpec {
            id: "locked".to_string(),
            program: f.path().to_str().expect("path").to_string(),
            args: vec![],
            working_directory: None,
            total_steps: None,
        };
        let result = spawn_streaming(&spec, vec![], serde_json::json!({})).await;
        assert!(matches!(result, Err(RunnerError::PermissionDenied(_))));
    }
}
