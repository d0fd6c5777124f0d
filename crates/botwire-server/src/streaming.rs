// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The streaming response driver.
//!
//! Pumps a query handler's event stream onto an open SSE response while a
//! heartbeat runs and a close watcher observes peer disconnect and process
//! shutdown. Only the emitter writes response bytes; heartbeats queue
//! through the same writer. The first task to finish wins and the others
//! stop cooperatively.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::HeaderMap;
use axum::response::Response;
use botwire_core::types::{BotEvent, ErrorResponse, PartialResponse};
use botwire_core::BotwireError;
use botwire_sse::{encode_event, Separator, ServerSentEvent};
use bytes::Bytes;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::attachments::AttachmentUploader;
use crate::bot::{BotReply, EventStream};

/// Default heartbeat period.
pub const DEFAULT_PING: Duration = Duration::from_secs(15);

/// Synthetic trailer written when a send timeout interrupts the stream.
const TIMEOUT_TRAILER: &str = r#"{"text":"error sse write timeout","allow_retry":false}"#;

const CHANNEL_CAPACITY: usize = 16;

/// Secondary producer run alongside the emitter; its events merge into the
/// handler's stream.
pub type DataSender =
    Arc<dyn Fn(mpsc::Sender<BotReply>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Factory for custom heartbeat events.
pub type PingMessageFactory = Arc<dyn Fn() -> ServerSentEvent + Send + Sync>;

/// Configuration for one streamed response.
#[derive(Clone)]
pub struct EventStreamOptions {
    /// Heartbeat period.
    pub ping: Duration,
    /// Line separator on the wire.
    pub sep: Separator,
    /// Per-event write timeout; expiry marks the stream interrupted.
    pub send_timeout: Option<Duration>,
    /// Custom heartbeat event; the default is a comment-style ping with an
    /// ISO-8601 timestamp.
    pub ping_message_factory: Option<PingMessageFactory>,
    /// Additional response headers. Same-name values take precedence over
    /// the driver defaults; the content type is always an event stream.
    pub headers: HeaderMap,
    /// Optional producer task run alongside the emitter.
    pub data_sender: Option<DataSender>,
}

impl Default for EventStreamOptions {
    fn default() -> Self {
        Self {
            ping: DEFAULT_PING,
            sep: Separator::CrLf,
            send_timeout: None,
            ping_message_factory: None,
            headers: HeaderMap::new(),
            data_sender: None,
        }
    }
}

impl std::fmt::Debug for EventStreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamOptions")
            .field("ping", &self.ping)
            .field("sep", &self.sep)
            .field("send_timeout", &self.send_timeout)
            .field(
                "ping_message_factory",
                &self.ping_message_factory.as_ref().map(|_| "<fn>"),
            )
            .field("headers", &self.headers)
            .field("data_sender", &self.data_sender.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Drives a handler's event stream as an SSE response.
///
/// Before the response finishes, all pending attachment uploads for
/// `message_id` are drained; a terminal `done` event is always the last
/// record written when the stream completes without transport failure.
pub fn stream_response(
    events: EventStream,
    options: EventStreamOptions,
    uploader: Option<Arc<AttachmentUploader>>,
    message_id: String,
    shutdown: CancellationToken,
) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(CHANNEL_CAPACITY);

    let merged: EventStream = match &options.data_sender {
        Some(factory) => {
            let (data_tx, data_rx) = mpsc::channel::<BotReply>(CHANNEL_CAPACITY);
            tokio::spawn(factory(data_tx));
            Box::pin(futures::stream::select(
                events,
                ReceiverStream::new(data_rx).map(Ok),
            ))
        }
        None => events,
    };

    let driver = Driver {
        sep: options.sep,
        ping: options.ping,
        send_timeout: options.send_timeout,
        ping_message_factory: options.ping_message_factory.clone(),
        uploader,
        message_id,
        shutdown,
        tx,
    };
    tokio::spawn(driver.run(merged));

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    let headers = response.headers_mut();
    for (name, value) in &options.headers {
        headers.insert(name.clone(), value.clone());
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers
        .entry(header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static("no-cache"));
    headers
        .entry(header::CONNECTION)
        .or_insert(HeaderValue::from_static("keep-alive"));
    headers
        .entry(HeaderName::from_static("x-accel-buffering"))
        .or_insert(HeaderValue::from_static("no"));
    response
}

enum PumpEnd {
    /// Handler stream finished (normally or with a reported error).
    Completed,
    /// The peer went away; nothing more can be written.
    PeerGone,
    /// Send timeout or shutdown signal; a trailer is owed.
    Interrupted,
}

enum SendStatus {
    Sent,
    PeerGone,
    TimedOut,
}

struct Driver {
    sep: Separator,
    ping: Duration,
    send_timeout: Option<Duration>,
    ping_message_factory: Option<PingMessageFactory>,
    uploader: Option<Arc<AttachmentUploader>>,
    message_id: String,
    shutdown: CancellationToken,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl Driver {
    async fn run(self, mut events: EventStream) {
        match self.pump(&mut events).await {
            PumpEnd::PeerGone => {
                debug!(message_id = %self.message_id, "peer disconnected, stream abandoned");
            }
            PumpEnd::Interrupted => {
                let trailer = ServerSentEvent::named("error", TIMEOUT_TRAILER);
                let _ = self
                    .tx
                    .try_send(Ok(Bytes::from(encode_event(&trailer, &[], self.sep))));
            }
            PumpEnd::Completed => self.finalize().await,
        }
    }

    async fn pump(&self, events: &mut EventStream) -> PumpEnd {
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + self.ping, self.ping);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return PumpEnd::Interrupted,
                _ = self.tx.closed() => return PumpEnd::PeerGone,
                _ = heartbeat.tick() => {
                    let frame = match &self.ping_message_factory {
                        Some(factory) => encode_event(&factory(), &[], self.sep),
                        None => encode_event(
                            &ServerSentEvent::default(),
                            &[&format!("ping - {}", Utc::now().to_rfc3339())],
                            self.sep,
                        ),
                    };
                    match self.send(frame).await {
                        SendStatus::Sent => {}
                        SendStatus::PeerGone => return PumpEnd::PeerGone,
                        SendStatus::TimedOut => return PumpEnd::Interrupted,
                    }
                }
                item = events.next() => match item {
                    Some(Ok(reply)) => {
                        let frame = encode_event(&translate_reply(reply), &[], self.sep);
                        match self.send(frame).await {
                            SendStatus::Sent => {}
                            SendStatus::PeerGone => return PumpEnd::PeerGone,
                            SendStatus::TimedOut => return PumpEnd::Interrupted,
                        }
                    }
                    Some(Err(error)) => {
                        warn!(error = %error, "query handler failed");
                        let event = handler_error_event(&error);
                        return match self.send(encode_event(&event, &[], self.sep)).await {
                            SendStatus::Sent => PumpEnd::Completed,
                            SendStatus::PeerGone => PumpEnd::PeerGone,
                            SendStatus::TimedOut => PumpEnd::Interrupted,
                        };
                    }
                    None => return PumpEnd::Completed,
                },
            }
        }
    }

    /// Drains pending attachment uploads and writes the terminal `done`.
    async fn finalize(&self) {
        if let Some(uploader) = &self.uploader {
            if let Err(error) = uploader.drain(&self.message_id).await {
                warn!(
                    message_id = %self.message_id,
                    error = %error,
                    "attachment drain failed"
                );
                let event = handler_error_event(&error);
                if !matches!(
                    self.send(encode_event(&event, &[], self.sep)).await,
                    SendStatus::Sent
                ) {
                    return;
                }
            }
        }
        let done = ServerSentEvent::named("done", "{}");
        let _ = self.send(encode_event(&done, &[], self.sep)).await;
    }

    async fn send(&self, frame: String) -> SendStatus {
        let bytes = Ok(Bytes::from(frame));
        match self.send_timeout {
            None => match self.tx.send(bytes).await {
                Ok(()) => SendStatus::Sent,
                Err(_) => SendStatus::PeerGone,
            },
            Some(limit) => match tokio::time::timeout(limit, self.tx.send(bytes)).await {
                Ok(Ok(())) => SendStatus::Sent,
                Ok(Err(_)) => SendStatus::PeerGone,
                Err(_) => SendStatus::TimedOut,
            },
        }
    }
}

/// Maps a handler item onto the wire event it becomes.
fn translate_reply(reply: BotReply) -> ServerSentEvent {
    let event = match reply {
        BotReply::Raw(event) => return event,
        BotReply::Event(event) => event,
    };
    match event {
        BotEvent::Error(error) => error_event(&error),
        BotEvent::Meta(meta) => {
            let data = serde_json::json!({
                "content_type": meta.content_type,
                "linkify": meta.linkify,
                "refetch_settings": meta.refetch_settings,
                "suggested_replies": meta.suggested_replies,
            });
            ServerSentEvent::named("meta", data.to_string())
        }
        BotEvent::Partial(partial) => {
            if let Some(data) = partial.data {
                ServerSentEvent::named("json", serde_json::Value::Object(data).to_string())
            } else {
                let name = if partial.is_suggested_reply {
                    "suggested_reply"
                } else if partial.is_replace_response {
                    "replace_response"
                } else {
                    "text"
                };
                ServerSentEvent::named(
                    name,
                    serde_json::json!({ "text": partial.text }).to_string(),
                )
            }
        }
    }
}

fn error_event(error: &ErrorResponse) -> ServerSentEvent {
    let mut data = serde_json::Map::new();
    data.insert("allowRetry".to_string(), error.allow_retry.into());
    if let Some(error_type) = &error.error_type {
        data.insert("errorType".to_string(), error_type.clone().into());
    }
    data.insert("text".to_string(), error.partial.text.clone().into());
    ServerSentEvent::named("error", serde_json::Value::Object(data).to_string())
}

/// A failed handler or drain becomes one terminal `error` event with
/// retries disallowed.
fn handler_error_event(error: &BotwireError) -> ServerSentEvent {
    error_event(&ErrorResponse {
        partial: PartialResponse::text(error_text(error)),
        allow_retry: false,
        error_type: None,
    })
}

fn error_text(error: &BotwireError) -> String {
    match error {
        BotwireError::Bot { message }
        | BotwireError::BotNoRetry { message }
        | BotwireError::Http { message, .. }
        | BotwireError::AttachmentUpload { message, .. }
        | BotwireError::Transport { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
