// Realtime reports channel - the push channel over a streamed HTTP response
use crate::application::channels::{
    ChannelError, PushEmitter, PushEvent, PushSession, PushTransport,
};
use crate::application::connection::DisconnectReason;
use crate::domain::query::ReportRequest;
use crate::domain::report::DataKind;
use crate::infrastructure::frame_codec::{FrameDecoder, decode_payload};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

const EVENT_BUFFER: usize = 64;

type MessageStream = Pin<Box<dyn Stream<Item = Result<WireMessage, ChannelError>> + Send>>;

#[derive(Debug, Deserialize)]
struct WireMessage {
    event: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default, rename = "sessionId")]
    session_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamingPushTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    compress: bool,
    handshake_timeout: Duration,
}

impl StreamingPushTransport {
    pub fn new(
        base_url: String,
        token: Option<String>,
        compress: bool,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            compress,
            handshake_timeout,
        }
    }

    async fn handshake(&self, messages: &mut MessageStream) -> Result<String, ChannelError> {
        let first = tokio::time::timeout(self.handshake_timeout, messages.next())
            .await
            .map_err(|_| ChannelError::Handshake("timed out waiting for connect".to_string()))?;

        match first {
            Some(Ok(WireMessage {
                event,
                session_id: Some(session_id),
                ..
            })) if event == "connect" => Ok(session_id),
            Some(Ok(message)) => Err(ChannelError::Handshake(format!(
                "expected connect, got {}",
                message.event
            ))),
            Some(Err(e)) => Err(e),
            None => Err(ChannelError::Handshake(
                "stream ended before connect".to_string(),
            )),
        }
    }
}

#[async_trait]
impl PushTransport for StreamingPushTransport {
    async fn connect(&self) -> Result<PushSession, ChannelError> {
        let url = format!("{}/realtime/stream?compress={}", self.base_url, self.compress);
        let mut builder = self.client.get(&url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status { status, body });
        }

        let mut messages = message_stream(response.bytes_stream(), self.compress);
        let session_id = self.handshake(&mut messages).await?;
        tracing::debug!("Realtime session {} established", session_id);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(pump(messages, tx));

        let emitter = StreamingEmitter {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            session_id,
            reader: reader.abort_handle(),
        };
        Ok(PushSession {
            events: rx,
            emitter: Arc::new(emitter),
        })
    }
}

struct StreamingEmitter {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    session_id: String,
    reader: AbortHandle,
}

#[async_trait]
impl PushEmitter for StreamingEmitter {
    async fn emit(&self, request: &ReportRequest) -> Result<(), ChannelError> {
        let body = json!({
            "sessionId": self.session_id,
            "event": request.event_name(),
            "params": request.emit_params(),
        });
        let mut builder = self
            .client
            .post(format!("{}/realtime/emit", self.base_url))
            .json(&body);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status { status, body });
        }
        Ok(())
    }

    /// Dropping the response body is what closes the session server side
    async fn close(&self) {
        self.reader.abort();
    }
}

/// Turn a chunked body into a stream of decoded messages. The stream ends after
/// the first error.
fn message_stream<S, E>(body: S, compressed: bool) -> MessageStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ChannelError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            decoder.push(&chunk);
            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) => {
                        let message = parse_message(frame, compressed).await;
                        let failed = message.is_err();
                        yield message;
                        if failed {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    })
}

async fn parse_message(frame: Bytes, compressed: bool) -> Result<WireMessage, ChannelError> {
    let payload = decode_payload(frame, compressed).await?;
    Ok(serde_json::from_slice(&payload)?)
}

fn to_event(message: WireMessage) -> Option<PushEvent> {
    match message.event.as_str() {
        "disconnect" => Some(PushEvent::Disconnected(DisconnectReason::from_wire(
            message.reason.as_deref().unwrap_or("transport close"),
        ))),
        "error" | "connect_error" => Some(PushEvent::Failed(
            message.message.unwrap_or_else(|| "unknown error".to_string()),
        )),
        name => match DataKind::from_response_event(name) {
            Some(kind) => Some(PushEvent::Data {
                kind,
                payload: message.data.unwrap_or(Value::Null),
            }),
            None => {
                tracing::debug!("Ignoring realtime event {}", name);
                None
            }
        },
    }
}

/// Forward decoded events until the stream ends, a read fails or the session
/// is told to disconnect. Dropping `events` afterwards signals the close.
async fn pump(mut messages: MessageStream, events: mpsc::Sender<PushEvent>) {
    while let Some(message) = messages.next().await {
        let event = match message {
            Ok(message) => match to_event(message) {
                Some(event) => event,
                None => continue,
            },
            Err(e) => {
                tracing::warn!("Realtime stream read failed: {}", e);
                PushEvent::Disconnected(DisconnectReason::TransportClose)
            }
        };
        let terminal = matches!(event, PushEvent::Disconnected(_));
        if events.send(event).await.is_err() || terminal {
            return;
        }
    }
}
