//! Worker-thread boundary: a dedicated OS thread with its own
//! single-threaded tokio runtime, fed envelopes over channels.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use turngraph_core::error::{BoundaryKind, IsolationError, Result};

use super::protocol::ProcessMessage;
use super::{Boundary, RunFactory, handle_envelope};

const KIND: BoundaryKind = BoundaryKind::Worker;

pub struct ThreadBoundary {
    to_worker: Option<mpsc::UnboundedSender<String>>,
    from_worker: mpsc::UnboundedReceiver<String>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadBoundary {
    pub fn spawn(factory: Arc<dyn RunFactory>) -> Result<Self> {
        let (to_worker, mut inbox) = mpsc::unbounded_channel::<String>();
        let (outbox, from_worker) = mpsc::unbounded_channel::<String>();

        let handle = std::thread::Builder::new()
            .name("turngraph-worker".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        warn!(error = %e, "Worker runtime failed to start");
                        return;
                    }
                };

                runtime.block_on(async move {
                    while let Some(line) = inbox.recv().await {
                        let reply = handle_envelope(factory.as_ref(), &line).await;
                        match reply.encode() {
                            Ok(text) => {
                                if outbox.send(text).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Worker reply could not be encoded");
                                break;
                            }
                        }
                    }
                });
                debug!("Worker thread exiting");
            })
            .map_err(|e| IsolationError::Channel {
                boundary: KIND,
                message: format!("failed to spawn worker thread: {e}"),
            })?;

        Ok(Self {
            to_worker: Some(to_worker),
            from_worker,
            handle: Some(handle),
        })
    }

    /// Wait for the thread. A panic is reported as an abnormal exit.
    async fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let joined = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| IsolationError::Channel {
                boundary: KIND,
                message: format!("join task failed: {e}"),
            })?;

        joined.map_err(|payload| {
            IsolationError::Exited {
                boundary: KIND,
                exit_code: None,
                message: format!("worker panicked: {}", panic_message(payload.as_ref())),
            }
            .into()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[async_trait]
impl Boundary for ThreadBoundary {
    fn kind(&self) -> BoundaryKind {
        KIND
    }

    async fn send(&mut self, message: &ProcessMessage) -> Result<()> {
        let line = message.encode()?;
        let sender = self.to_worker.as_ref().ok_or_else(|| IsolationError::Channel {
            boundary: KIND,
            message: "worker channel already closed".into(),
        })?;
        sender.send(line).map_err(|_| IsolationError::Channel {
            boundary: KIND,
            message: "worker is no longer receiving".into(),
        })?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<ProcessMessage> {
        match self.from_worker.recv().await {
            Some(line) => ProcessMessage::decode(&line, KIND),
            None => {
                self.join().await?;
                Err(IsolationError::Exited {
                    boundary: KIND,
                    exit_code: None,
                    message: "worker ended without a reply".into(),
                }
                .into())
            }
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.to_worker.take();
        self.join().await
    }
}
