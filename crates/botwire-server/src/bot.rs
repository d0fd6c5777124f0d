// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`Bot`] trait and per-bot configuration.

use std::sync::Arc;

use async_trait::async_trait;
use botwire_core::types::{
    BotEvent, ErrorResponse, MetaResponse, PartialResponse, QueryRequest, ReportErrorRequest,
    ReportFeedbackRequest, SettingsRequest, SettingsResponse,
};
use botwire_core::BotwireError;
use botwire_sse::ServerSentEvent;
use futures::stream::BoxStream;
use tracing::{error, info};

use crate::attachments::AttachmentUploader;

/// One item a query handler emits: a protocol-level response event, or a
/// raw SSE record passed through to the wire untouched.
#[derive(Debug, Clone)]
pub enum BotReply {
    Event(BotEvent),
    Raw(ServerSentEvent),
}

impl From<BotEvent> for BotReply {
    fn from(event: BotEvent) -> Self {
        Self::Event(event)
    }
}

impl From<PartialResponse> for BotReply {
    fn from(partial: PartialResponse) -> Self {
        Self::Event(BotEvent::Partial(partial))
    }
}

impl From<MetaResponse> for BotReply {
    fn from(meta: MetaResponse) -> Self {
        Self::Event(BotEvent::Meta(meta))
    }
}

impl From<ErrorResponse> for BotReply {
    fn from(error: ErrorResponse) -> Self {
        Self::Event(BotEvent::Error(error))
    }
}

impl From<ServerSentEvent> for BotReply {
    fn from(event: ServerSentEvent) -> Self {
        Self::Raw(event)
    }
}

/// The stream a query handler returns. An `Err` item terminates the
/// response with an `error` event followed by `done`.
pub type EventStream = BoxStream<'static, Result<BotReply, BotwireError>>;

/// A bot bound to a URL path, answering query, settings, feedback, and
/// error requests.
///
/// Only [`Bot::get_response`] is mandatory; the other handlers come with
/// protocol-default implementations.
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// Answers a `query` request with a stream of response events.
    async fn get_response(&self, request: QueryRequest) -> EventStream;

    /// Answers a `settings` request.
    async fn get_settings(
        &self,
        _request: SettingsRequest,
    ) -> Result<SettingsResponse, BotwireError> {
        Ok(SettingsResponse::default())
    }

    /// Called when the platform reports user feedback on a message.
    async fn on_feedback(&self, feedback: ReportFeedbackRequest) -> Result<(), BotwireError> {
        info!(
            message_id = %feedback.message_id,
            feedback = ?feedback.feedback_type,
            "feedback received"
        );
        Ok(())
    }

    /// Called when a remote client reports a protocol violation in one of
    /// this bot's streams.
    async fn on_error(&self, report: ReportErrorRequest) -> Result<(), BotwireError> {
        error!(message = %report.message, "client reported an error");
        Ok(())
    }

    /// Invoked once at registration when the bot has an access key; hands
    /// the bot the uploader used for scheduling attachment uploads.
    fn bind_uploader(&mut self, _uploader: Arc<AttachmentUploader>) {}
}

/// Per-bot registration options.
#[derive(Clone)]
pub struct BotOptions {
    /// Access key protecting this bot's endpoint. Falls back to the
    /// `POE_ACCESS_KEY` environment variable when unset.
    pub access_key: Option<String>,
    /// Deprecated alias for `access_key`; logs a warning when used.
    pub api_key: Option<String>,
    /// Inject parsed attachment content as separate messages ahead of the
    /// message carrying the attachments.
    pub should_insert_attachment_messages: bool,
    /// Deprecated: append parsed attachment content to the message body
    /// instead. Ignored when `should_insert_attachment_messages` is set.
    pub concat_attachments_to_message: bool,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            access_key: None,
            api_key: None,
            should_insert_attachment_messages: true,
            concat_attachments_to_message: false,
        }
    }
}

impl std::fmt::Debug for BotOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotOptions")
            .field(
                "access_key",
                &self.access_key.as_ref().map(|_| "[redacted]"),
            )
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field(
                "should_insert_attachment_messages",
                &self.should_insert_attachment_messages,
            )
            .field(
                "concat_attachments_to_message",
                &self.concat_attachments_to_message,
            )
            .finish()
    }
}

impl BotOptions {
    /// Options with an explicit access key.
    pub fn with_access_key(key: impl Into<String>) -> Self {
        Self {
            access_key: Some(key.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal;

    #[async_trait]
    impl Bot for Minimal {
        async fn get_response(&self, _request: QueryRequest) -> EventStream {
            Box::pin(futures::stream::empty())
        }
    }

    #[tokio::test]
    async fn default_settings_handler() {
        let bot = Minimal;
        let settings = bot
            .get_settings(SettingsRequest {
                version: "1.0".into(),
            })
            .await
            .unwrap();
        assert!(settings.expand_text_attachments);
        assert!(!settings.allow_attachments);
    }

    #[test]
    fn bot_reply_conversions() {
        let reply: BotReply = PartialResponse::text("hi").into();
        assert!(matches!(reply, BotReply::Event(BotEvent::Partial(_))));

        let reply: BotReply = ServerSentEvent::named("custom", "{}").into();
        assert!(matches!(reply, BotReply::Raw(_)));
    }

    #[test]
    fn default_options_prefer_insertion() {
        let options = BotOptions::default();
        assert!(options.should_insert_attachment_messages);
        assert!(!options.concat_attachments_to_message);
        assert!(options.access_key.is_none());
    }

    #[test]
    fn options_debug_redacts_keys() {
        let mut options = BotOptions::with_access_key("super-secret-key");
        options.api_key = Some("legacy-secret".to_string());
        let debug = format!("{options:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("legacy-secret"));
        assert!(debug.contains("[redacted]"));
    }
}
