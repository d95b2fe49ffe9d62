//! Bridges a streaming model invocation onto an SSE response.
//!
//! A spawned producer task owns the vendor stream and pushes [`OutboundFrame`]s
//! into a bounded channel; the HTTP response drains the receiver. The producer
//! always finishes with exactly one `done` or `error` frame and then drops the
//! sender, so the channel closing marks the end of the response.

use crate::bedrock::ModelClient;
use crate::chunk_decoder::{StreamEvent, decode_event};
use crate::error::ModelError;
use crate::prompt::ModelRequest;
use axum::response::sse::Event;
use futures_util::{Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

const FRAME_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Chunk(String),
    Done,
    Error(String),
}

impl OutboundFrame {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OutboundFrame::Chunk(text) => json!({ "chunk": text }),
            OutboundFrame::Done => json!({ "done": true }),
            OutboundFrame::Error(message) => json!({ "error": message }),
        }
    }

    pub fn into_event(self) -> Event {
        Event::default().data(self.to_json().to_string())
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboundFrame::Chunk(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Invoking,
    Streaming,
    Completed,
    Failed,
}

pub struct StreamRelay {
    client: Arc<dyn ModelClient>,
    request: ModelRequest,
    timeout: Duration,
    state: RelayState,
}

impl StreamRelay {
    pub fn new(client: Arc<dyn ModelClient>, request: ModelRequest, timeout: Duration) -> Self {
        Self {
            client,
            request,
            timeout,
            state: RelayState::Idle,
        }
    }

    /// Starts the producer task and returns the frame stream for the response.
    pub fn spawn(self) -> impl Stream<Item = OutboundFrame> + Send + 'static {
        let (tx, rx) = mpsc::channel::<OutboundFrame>(FRAME_BUFFER);
        tokio::spawn(async move {
            let outcome = self.run(tx).await;
            let label = match outcome {
                RelayState::Completed => "completed",
                _ => "failed",
            };
            metrics::counter!("jomkaya_stream_relays_total", "outcome" => label).increment(1);
        });
        tokio_stream::wrappers::ReceiverStream::new(rx)
    }

    fn transition(&mut self, next: RelayState) {
        tracing::debug!(from = ?self.state, to = ?next, "relay state");
        self.state = next;
    }

    async fn fail(mut self, tx: &mpsc::Sender<OutboundFrame>, err: ModelError) -> RelayState {
        tracing::warn!(kind = err.kind(), error = %err, "stream relay failed");
        self.transition(RelayState::Failed);
        let _ = tx.send(OutboundFrame::Error(err.to_string())).await;
        self.state
    }

    /// The client stopped reading and the buffer stayed full past the deadline.
    /// The error frame is only delivered if room has opened up since.
    fn stall(mut self, tx: &mpsc::Sender<OutboundFrame>, timeout_ms: u64) -> RelayState {
        tracing::warn!(timeout_ms, "client stopped reading, abandoning relay");
        self.transition(RelayState::Failed);
        let _ = tx.try_send(OutboundFrame::Error(ModelError::Timeout(timeout_ms).to_string()));
        self.state
    }

    fn cancel(mut self) -> RelayState {
        tracing::info!(state = ?self.state, "client disconnected, stopping relay");
        self.transition(RelayState::Failed);
        self.state
    }

    /// Drives the relay to a terminal state, sending frames into `tx`.
    pub async fn run(mut self, tx: mpsc::Sender<OutboundFrame>) -> RelayState {
        let deadline = Instant::now() + self.timeout;
        let timeout_ms = self.timeout.as_millis() as u64;
        self.transition(RelayState::Invoking);

        let body = self.request.to_body();
        let opened = tokio::select! {
            biased;
            _ = tx.closed() => return self.cancel(),
            opened = timeout_at(deadline, self.client.invoke_stream(&body)) => opened,
        };
        let mut events = match opened {
            Ok(Ok(events)) => events,
            Ok(Err(err)) => return self.fail(&tx, err).await,
            Err(_) => return self.fail(&tx, ModelError::Timeout(timeout_ms)).await,
        };
        self.transition(RelayState::Streaming);

        let mut chunks = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => return self.cancel(),
                next = timeout_at(deadline, events.next()) => next,
            };
            let event = match next {
                Err(_) => return self.fail(&tx, ModelError::Timeout(timeout_ms)).await,
                Ok(None) => break,
                Ok(Some(Err(err))) => return self.fail(&tx, err).await,
                Ok(Some(Ok(event))) => event,
            };
            match decode_event(&event) {
                Err(err) => return self.fail(&tx, ModelError::Decode(err.to_string())).await,
                Ok(Some(StreamEvent::TextDelta { text })) => {
                    if text.is_empty() {
                        continue;
                    }
                    chunks += 1;
                    match timeout_at(deadline, tx.send(OutboundFrame::Chunk(text))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => return self.cancel(),
                        Err(_) => return self.stall(&tx, timeout_ms),
                    }
                }
                Ok(Some(StreamEvent::Completion { stop_reason })) => {
                    tracing::debug!(stop_reason = ?stop_reason, "model reported completion");
                }
                Ok(Some(StreamEvent::Unrecognized)) | Ok(None) => {}
            }
        }

        tracing::info!(chunks, "stream relay completed");
        self.transition(RelayState::Completed);
        let _ = tx.send(OutboundFrame::Done).await;
        self.state
    }
}
