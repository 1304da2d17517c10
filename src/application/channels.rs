// Channel traits for report data access - one pull (request/response), one push (realtime)
use crate::application::connection::DisconnectReason;
use crate::domain::query::ReportRequest;
use crate::domain::report::DataKind;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid frame: {0}")]
    Frame(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("channel closed")]
    Closed,
}

#[async_trait]
pub trait PullClient: Send + Sync {
    /// Fetch one logical request and return its raw payload
    async fn fetch(&self, request: &ReportRequest) -> Result<Value, ChannelError>;
}

/// Something that happened on an open push session
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Data { kind: DataKind, payload: Value },
    Disconnected(DisconnectReason),
    Failed(String),
}

#[async_trait]
pub trait PushEmitter: Send + Sync {
    async fn emit(&self, request: &ReportRequest) -> Result<(), ChannelError>;

    /// Close the session from the client side
    async fn close(&self);
}

/// An established push session. The event stream ending means the transport closed.
pub struct PushSession {
    pub events: mpsc::Receiver<PushEvent>,
    pub emitter: Arc<dyn PushEmitter>,
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a new session; resolves once the handshake completed
    async fn connect(&self) -> Result<PushSession, ChannelError>;
}
