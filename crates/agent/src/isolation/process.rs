//! Child-process boundary. The worker is an executable that reads one
//! command line on stdin and writes one reply line on stdout; its stderr
//! is inherited so worker logs reach the caller's terminal.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;
use turngraph_core::error::{BoundaryKind, IsolationError, Result};

use super::protocol::ProcessMessage;
use super::{Boundary, RunFactory, handle_envelope};

const KIND: BoundaryKind = BoundaryKind::Process;

fn channel_error(message: String) -> IsolationError {
    IsolationError::Channel {
        boundary: KIND,
        message,
    }
}

pub struct ProcessBoundary {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl ProcessBoundary {
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| channel_error(format!("failed to spawn {}: {e}", program.display())))?;

        debug!(program = %program.display(), pid = ?child.id(), "Spawned worker process");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| channel_error("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| channel_error("worker stdout unavailable".into()))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

#[async_trait]
impl Boundary for ProcessBoundary {
    fn kind(&self) -> BoundaryKind {
        KIND
    }

    async fn send(&mut self, message: &ProcessMessage) -> Result<()> {
        let mut line = message.encode()?;
        line.push('\n');

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| channel_error("worker stdin already closed".into()))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| channel_error(format!("write failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| channel_error(format!("flush failed: {e}")))?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<ProcessMessage> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| channel_error(format!("read failed: {e}")))?;

            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return ProcessMessage::decode(&line, KIND),
                None => {
                    let status = self
                        .child
                        .wait()
                        .await
                        .map_err(|e| channel_error(format!("wait failed: {e}")))?;
                    return Err(IsolationError::Exited {
                        boundary: KIND,
                        exit_code: status.code(),
                        message: "process exited without a reply".into(),
                    }
                    .into());
                }
            }
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stdin.take();
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| channel_error(format!("wait failed: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(IsolationError::Exited {
                boundary: KIND,
                exit_code: status.code(),
                message: "process exited abnormally".into(),
            }
            .into())
        }
    }
}

/// Worker entry point: answer a single command read from stdin.
///
/// Returns once the reply is written; run failures travel inside the reply
/// envelope, so an `Err` here means the channel itself broke.
pub async fn serve_stdio(factory: &dyn RunFactory) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let line = loop {
        match lines
            .next_line()
            .await
            .map_err(|e| channel_error(format!("read failed: {e}")))?
        {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => break line,
            None => return Err(channel_error("stdin closed before a command arrived".into()).into()),
        }
    };

    let reply = handle_envelope(factory, &line).await;
    let mut out = reply.encode()?;
    out.push('\n');

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(out.as_bytes())
        .await
        .map_err(|e| channel_error(format!("write failed: {e}")))?;
    stdout
        .flush()
        .await
        .map_err(|e| channel_error(format!("flush failed: {e}")))?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::isolation::MessageType;

    fn shell(script: &str) -> ProcessBoundary {
        ProcessBoundary::spawn(Path::new("sh"), &["-c".into(), script.into()]).unwrap()
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let mut boundary = shell(r#"printf '\n\n{"type":"error","run_id":"r","data":{"message":"m"}}\n'"#);
        let reply = boundary.receive().await.unwrap();
        assert_eq!(reply.kind, MessageType::Error);
        boundary.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_fails_shutdown() {
        let mut boundary = shell(r#"echo '{"type":"result","run_id":"r","data":{}}'; exit 2"#);
        boundary.receive().await.unwrap();
        let err = boundary.shutdown().await.unwrap_err();
        assert!(err.to_string().contains("process stopped with exit code 2"));
    }

    #[tokio::test]
    async fn send_after_shutdown_fails() {
        let mut boundary = shell("exit 0");
        boundary.shutdown().await.unwrap();
        let err = boundary
            .send(&ProcessMessage::error("r", "x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stdin already closed"));
    }
}
