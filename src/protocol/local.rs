//! Local Executor
//!
//! Runs a configured program as a stand-in data service. The query command
//! is written to the child's stdin as one JSON line; whatever the child
//! prints on stdout is streamed to the caller unchanged.

use std::process::{ExitStatus, Stdio};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::descriptor::QueryCommand;
use super::error::{BridgeError, BridgeResult};
use super::responder::{GuardedSink, PumpOutcome, WireSink};

/// Read size for stdout chunks
const READ_CHUNK: usize = 8 * 1024;

/// Upper bound on captured stderr
const STDERR_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct LocalExecutor {
    program: String,
    args: Vec<String>,
}

impl LocalExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start the program and hand it `command` on stdin.
    pub fn spawn(&self, command: &QueryCommand) -> BridgeResult<LocalRun> {
        let mut line = serde_json::to_vec(command)?;
        line.push(b'\n');

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::LocalProcess {
                message: format!("failed to start '{}': {e}", self.program),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| process_error("stdout not captured"))?;

        // Feed stdin from its own task so a chatty child cannot block on a full
        // stdout pipe while we are still writing.
        let stdin_task = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&line).await {
                    tracing::debug!(error = %e, "local_stdin_write_failed");
                }
                // Dropping stdin closes it.
            })
        });

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut captured = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let room = STDERR_LIMIT.saturating_sub(captured.len());
                            captured.extend_from_slice(&buf[..n.min(room)]);
                        }
                    }
                }
                captured
            })
        });

        tracing::debug!(program = %self.program, pid = ?child.id(), "local_executor_spawned");
        Ok(LocalRun {
            program: self.program.clone(),
            child,
            stdout,
            stdin_task,
            stderr_task,
        })
    }
}

fn process_error(message: impl Into<String>) -> BridgeError {
    BridgeError::LocalProcess {
        message: message.into(),
    }
}

/// A running local executor process.
#[derive(Debug)]
pub struct LocalRun {
    program: String,
    child: Child,
    stdout: ChildStdout,
    stdin_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
}

impl LocalRun {
    /// Stream stdout into `sink` until the process exits or the consumer leaves.
    pub async fn pump<S: WireSink>(mut self, sink: &mut GuardedSink<S>) -> PumpOutcome {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut bytes_out = 0usize;

        loop {
            buf.reserve(READ_CHUNK);
            let read = tokio::select! {
                biased;
                () = sink.revoked() => None,
                read = self.stdout.read_buf(&mut buf) => Some(read),
            };

            match read {
                None => {
                    sink.mark_revoked();
                    self.kill().await;
                    return PumpOutcome::Cancelled;
                }
                Some(Ok(0)) => break,
                Some(Ok(n)) => {
                    bytes_out += n;
                    if !sink.enqueue(buf.split().freeze()).await {
                        self.kill().await;
                        return PumpOutcome::Cancelled;
                    }
                }
                Some(Err(e)) => {
                    self.kill().await;
                    sink.error(e.into()).await;
                    return PumpOutcome::Failed;
                }
            }
        }

        match self.finish().await {
            Ok(()) => {
                sink.close().await;
                tracing::debug!(bytes = bytes_out, "local_executor_completed");
                PumpOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(error = %e, "local_executor_failed");
                sink.error(e).await;
                PumpOutcome::Failed
            }
        }
    }

    async fn finish(&mut self) -> BridgeResult<()> {
        let status = self.child.wait().await?;
        if let Some(task) = self.stdin_task.take() {
            let _ = task.await;
        }
        if status.success() {
            return Ok(());
        }
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        Err(exit_error(&self.program, status, &stderr))
    }

    async fn kill(&mut self) {
        tracing::debug!(program = %self.program, "local_executor_killed");
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "local_executor_kill_failed");
        }
    }
}

fn exit_error(program: &str, status: ExitStatus, stderr: &[u8]) -> BridgeError {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        process_error(format!("'{program}' exited with {status}"))
    } else {
        process_error(format!("'{program}' exited with {status}: {stderr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::responder::{BufferSink, ChannelSink, SinkState};

    fn shell(script: &str) -> LocalExecutor {
        LocalExecutor::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    async fn run_buffered(executor: &LocalExecutor, query: &str) -> BridgeResult<bytes::Bytes> {
        let run = executor.spawn(&QueryCommand::new(query))?;
        let mut sink = GuardedSink::new(BufferSink::new());
        run.pump(&mut sink).await;
        sink.into_inner().into_result()
    }

    #[tokio::test]
    async fn test_command_is_written_to_stdin() {
        let out = run_buffered(&shell("cat"), "SELECT 1").await.unwrap();
        let line: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(line["query"], "SELECT 1");
        assert_eq!(line["criteria"], serde_json::json!({}));
        assert!(out.ends_with(b"\n"));
    }

    #[tokio::test]
    async fn test_stdout_is_streamed_unchanged() {
        let out = run_buffered(&shell("cat >/dev/null; printf 'a\\nb\\n'"), "q")
            .await
            .unwrap();
        assert_eq!(out.as_ref(), b"a\nb\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let err = run_buffered(&shell("cat >/dev/null; echo broken >&2; exit 3"), "q")
            .await
            .unwrap_err();
        match err {
            BridgeError::LocalProcess { message } => {
                assert!(message.contains("broken"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let executor = LocalExecutor::new("/nonexistent/flightgate-executor", vec![]);
        assert!(matches!(
            executor.spawn(&QueryCommand::new("q")),
            Err(BridgeError::LocalProcess { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_consumer_kills_process() {
        let executor = shell("while true; do echo row; done");
        let run = executor.spawn(&QueryCommand::new("q")).unwrap();
        let (sink, mut rx) = ChannelSink::channel(1);
        let mut sink = GuardedSink::new(sink);

        let handle = tokio::spawn(async move {
            let outcome = run.pump(&mut sink).await;
            (outcome, sink.state())
        });
        assert!(rx.recv().await.unwrap().is_ok());
        drop(rx);

        let (outcome, state) = handle.await.unwrap();
        assert_eq!(outcome, PumpOutcome::Cancelled);
        assert_eq!(state, SinkState::Revoked);
    }
}
