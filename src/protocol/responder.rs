//! Streaming Responder
//!
//! Pumps an upstream `DoGet` call through the [`FrameReassembler`] into a
//! push-based byte sink.
//!
//! Terminal transitions are guarded: once the sink is closed, errored or
//! revoked by the consumer, every later `enqueue`, `close` or `error` is
//! dropped. A late upstream event therefore cannot complete the outbound
//! stream twice.

use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use super::client::UpstreamCall;
use super::error::{BridgeError, BridgeResult};
use super::wire::FrameReassembler;

/// Outbound push sink for an assembled byte stream.
#[async_trait]
pub trait WireSink: Send + Sync {
    /// Push one chunk; `false` once the consumer has gone away.
    async fn enqueue(&mut self, chunk: Bytes) -> bool;

    async fn close(&mut self);

    async fn error(&mut self, err: BridgeError);

    /// Resolves when the consumer revokes the sink.
    async fn revoked(&self);
}

/// Lifecycle of a [`GuardedSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Open,
    Closed,
    Errored,
    Revoked,
}

/// Makes `enqueue`/`close`/`error` idempotent and mutually exclusive.
#[derive(Debug)]
pub struct GuardedSink<S> {
    inner: S,
    state: SinkState,
}

impl<S: WireSink> GuardedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: SinkState::Open,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != SinkState::Open
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Returns whether the chunk was delivered.
    pub async fn enqueue(&mut self, chunk: Bytes) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self.inner.enqueue(chunk).await {
            true
        } else {
            self.state = SinkState::Revoked;
            false
        }
    }

    /// Returns whether this call performed the terminal transition.
    pub async fn close(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = SinkState::Closed;
        self.inner.close().await;
        true
    }

    /// Returns whether this call performed the terminal transition.
    pub async fn error(&mut self, err: BridgeError) -> bool {
        if self.is_terminal() {
            tracing::debug!(error = %err, state = ?self.state, "late_error_dropped");
            return false;
        }
        self.state = SinkState::Errored;
        self.inner.error(err).await;
        true
    }

    pub async fn revoked(&self) {
        self.inner.revoked().await;
    }

    pub(crate) fn mark_revoked(&mut self) {
        if self.state == SinkState::Open {
            self.state = SinkState::Revoked;
        }
    }
}

/// How a [`pump`] run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Upstream completed and the terminator was delivered
    Completed,
    /// Upstream failed; the sink was errored without a terminator
    Failed,
    /// Consumer went away; upstream was cancelled
    Cancelled,
}

/// Forward every upstream frame into `sink` as IPC stream bytes.
pub async fn pump<S: WireSink>(mut call: UpstreamCall, sink: &mut GuardedSink<S>) -> PumpOutcome {
    let mut reassembler = FrameReassembler::new();
    let mut frames = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            () = sink.revoked() => None,
            item = call.next() => Some(item),
        };

        let item = match next {
            Some(item) => item,
            None => {
                tracing::debug!(frames, "consumer_revoked");
                sink.mark_revoked();
                call.cancel();
                return PumpOutcome::Cancelled;
            }
        };

        let segments = match item {
            Some(Ok(frame)) => {
                frames += 1;
                match reassembler.push(&frame) {
                    Ok(segments) => segments,
                    Err(e) => {
                        call.cancel();
                        sink.error(e).await;
                        return PumpOutcome::Failed;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(frames, error = %e, "upstream_stream_failed");
                sink.error(e).await;
                return PumpOutcome::Failed;
            }
            None => {
                for segment in reassembler.finish() {
                    if !sink.enqueue(segment.into_bytes()).await {
                        return PumpOutcome::Cancelled;
                    }
                }
                sink.close().await;
                tracing::debug!(frames, "upstream_completed");
                return PumpOutcome::Completed;
            }
        };

        for segment in segments {
            if !sink.enqueue(segment.into_bytes()).await {
                tracing::debug!(frames, "consumer_revoked");
                call.cancel();
                return PumpOutcome::Cancelled;
            }
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Item type of the HTTP body channel
pub type BodyChunk = Result<Bytes, io::Error>;

/// Feeds a bounded channel read by the HTTP response body.
///
/// Dropping the receiver (client disconnect) revokes the sink.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::Sender<BodyChunk>>,
}

impl ChannelSink {
    /// Sink plus the receiving half for the response body.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BodyChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl WireSink for ChannelSink {
    async fn enqueue(&mut self, chunk: Bytes) -> bool {
        match &self.tx {
            Some(tx) => tx.send(Ok(chunk)).await.is_ok(),
            None => false,
        }
    }

    async fn close(&mut self) {
        self.tx = None;
    }

    async fn error(&mut self, err: BridgeError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(io::Error::other(err.to_string()))).await;
        }
    }

    async fn revoked(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}

/// Buffers the whole stream in memory; never revoked.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: BytesMut,
    closed: bool,
    error: Option<BridgeError>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered bytes, or the error the stream ended with.
    pub fn into_result(self) -> BridgeResult<Bytes> {
        match self.error {
            Some(err) => Err(err),
            None if self.closed => Ok(self.buf.freeze()),
            None => Err(BridgeError::Cancelled),
        }
    }
}

#[async_trait]
impl WireSink for BufferSink {
    async fn enqueue(&mut self, chunk: Bytes) -> bool {
        self.buf.extend_from_slice(&chunk);
        true
    }

    async fn close(&mut self) {
        self.closed = true;
    }

    async fn error(&mut self, err: BridgeError) {
        self.error = Some(err);
    }

    async fn revoked(&self) {
        std::future::pending().await
    }
}

/// Run `call` to completion and return the assembled IPC stream.
pub async fn collect_stream(call: UpstreamCall) -> BridgeResult<Bytes> {
    let mut sink = GuardedSink::new(BufferSink::new());
    pump(call, &mut sink).await;
    sink.into_inner().into_result()
}
