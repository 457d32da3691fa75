//! Frame transport for worker sessions
//!
//! Sessions read and write through [`FrameSource`] and [`FrameSink`] so the
//! same session loop runs over an axum WebSocket or an in-memory pipe.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::protocol::{CoordinatorMessage, WorkerMessage};

/// One inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping or pong; answered by the transport itself
    Control,
    Close,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(String),
}

/// Inbound half of a worker connection
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the peer is gone
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Outbound half of a worker connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

// ============================================================================
// WebSocket
// ============================================================================

#[async_trait]
impl FrameSource for SplitStream<WebSocket> {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let message = match StreamExt::next(self).await? {
            Ok(message) => message,
            Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
        };

        Some(Ok(match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(_) | Message::Pong(_) => Frame::Control,
            Message::Close(_) => Frame::Close,
        }))
    }
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        SinkExt::send(self, Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Create a connected in-memory transport
///
/// The session side gets a source and sink; the returned [`WorkerEnd`]
/// plays the worker.
pub fn memory_transport() -> (MemorySource, MemorySink, WorkerEnd) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    (
        MemorySource { rx: inbound_rx },
        MemorySink {
            tx: Some(outbound_tx),
        },
        WorkerEnd {
            tx: Some(inbound_tx),
            rx: outbound_rx,
        },
    )
}

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(text).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Worker side of an in-memory connection
pub struct WorkerEnd {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl WorkerEnd {
    /// Send a protocol message; false once disconnected
    pub fn send(&self, message: &WorkerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.send_raw(text),
            Err(_) => false,
        }
    }

    /// Send an arbitrary text frame
    pub fn send_raw(&self, text: impl Into<String>) -> bool {
        self.send_frame(Frame::Text(text.into()))
    }

    pub fn send_frame(&self, frame: Frame) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Next decoded coordinator message, `None` once the session closed
    ///
    /// Frames that do not decode are skipped.
    pub async fn recv(&mut self) -> Option<CoordinatorMessage> {
        loop {
            let text = self.rx.recv().await?;
            if let Ok(message) = serde_json::from_str(&text) {
                return Some(message);
            }
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<CoordinatorMessage> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }

    /// Drop the connection as a vanished worker would
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Wait until the coordinator side has closed the connection
    pub async fn closed(&mut self) {
        while self.rx.recv().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_carries_frames() {
        let (mut source, mut sink, mut worker) = memory_transport();

        assert!(worker.send(&WorkerMessage::Heartbeat));
        let frame = source.next_frame().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Text(r#"{"type":"heartbeat"}"#.to_string()));

        let reply = CoordinatorMessage::HeartbeatAck.to_frame().unwrap();
        sink.send_text(reply).await.unwrap();
        assert_eq!(worker.recv().await, Some(CoordinatorMessage::HeartbeatAck));
    }

    #[tokio::test]
    async fn test_memory_transport_disconnect() {
        let (mut source, mut sink, mut worker) = memory_transport();

        worker.disconnect();
        assert!(!worker.send(&WorkerMessage::Heartbeat));
        assert!(source.next_frame().await.is_none());

        sink.close().await.unwrap();
        assert_eq!(
            sink.send_text("late".to_string()).await,
            Err(TransportError::Closed)
        );
        assert!(worker.recv().await.is_none());
    }
}
