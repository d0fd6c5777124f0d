// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot registration and request dispatch.
//!
//! [`BotAppBuilder`] assembles one axum [`Router`] hosting any number of
//! bots, each at its own path. A GET serves a static landing page; a POST
//! is dispatched by the JSON body's `type` field to the bot's handlers.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use botwire_core::types::{
    QueryRequest, ReportErrorRequest, ReportFeedbackRequest, SettingsRequest,
};
use botwire_core::BotwireError;

use crate::attachments::AttachmentUploader;
use crate::auth;
use crate::bot::{Bot, BotOptions};
use crate::messages;
use crate::streaming::{self, EventStreamOptions};

const LANDING_PAGE: &str = "<html>\n<body>\n<h1>Bot server</h1>\n\
<p>This is a bot server endpoint. Point the platform at this URL to \
exchange query, settings, and feedback requests with the bot hosted \
here.</p>\n</body>\n</html>\n";

/// Builds the router hosting one or more bots.
pub struct BotAppBuilder {
    bots: Vec<(String, Box<dyn Bot>, BotOptions)>,
    access_key: Option<String>,
    allow_without_key: bool,
    stream_options: EventStreamOptions,
    shutdown: CancellationToken,
}

impl Default for BotAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BotAppBuilder {
    pub fn new() -> Self {
        Self {
            bots: Vec::new(),
            access_key: None,
            allow_without_key: false,
            stream_options: EventStreamOptions::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers a bot at `path` with default options.
    pub fn bot(self, path: impl Into<String>, bot: impl Bot) -> Self {
        self.bot_with_options(path, bot, BotOptions::default())
    }

    /// Registers a bot at `path` with explicit options.
    pub fn bot_with_options(
        mut self,
        path: impl Into<String>,
        bot: impl Bot,
        options: BotOptions,
    ) -> Self {
        self.bots.push((path.into(), Box::new(bot), options));
        self
    }

    /// Top-level access key; only permitted with a single bot.
    pub fn access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    /// Permits bots with no resolvable key to accept unauthenticated
    /// requests.
    pub fn allow_without_key(mut self, allow: bool) -> Self {
        self.allow_without_key = allow;
        self
    }

    /// Streaming options applied to every query response.
    pub fn stream_options(mut self, options: EventStreamOptions) -> Self {
        self.stream_options = options;
        self
    }

    /// Token observed by the streaming driver's close watcher; cancel it
    /// on process termination.
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Resolves keys, checks path uniqueness, and assembles the router.
    pub fn build(self) -> Result<Router, BotwireError> {
        if self.bots.is_empty() {
            return Err(BotwireError::InvalidParameter(
                "at least one bot must be registered".to_string(),
            ));
        }
        if self.access_key.is_some() && self.bots.len() > 1 {
            return Err(BotwireError::InvalidParameter(
                "a top-level access key is ambiguous with multiple bots; set one per bot"
                    .to_string(),
            ));
        }

        let mut paths = HashSet::new();
        let mut router = Router::new();

        for (path, mut bot, mut options) in self.bots {
            if !paths.insert(path.clone()) {
                return Err(BotwireError::InvalidParameter(format!(
                    "duplicate bot path: {path}"
                )));
            }
            if options.access_key.is_none() {
                options.access_key = self.access_key.clone();
            }

            let access_key = auth::resolve_access_key(&options);
            if access_key.is_none() && !self.allow_without_key {
                return Err(BotwireError::InvalidParameter(format!(
                    "no access key found for bot at {path}; set one or enable allow_without_key"
                )));
            }

            let uploader = access_key
                .as_deref()
                .map(|key| Arc::new(AttachmentUploader::new(key)));
            if let Some(uploader) = &uploader {
                bot.bind_uploader(Arc::clone(uploader));
            }

            let service = Arc::new(BotService {
                bot: Arc::from(bot),
                access_key,
                options,
                stream_options: self.stream_options.clone(),
                uploader,
                shutdown: self.shutdown.clone(),
            });
            info!(path = %path, "bot registered");
            router = router.merge(
                Router::new()
                    .route(&path, get(landing_page).post(dispatch))
                    .with_state(service),
            );
        }
        Ok(router)
    }
}

/// Per-bot state shared by the route handlers.
pub(crate) struct BotService {
    pub(crate) bot: Arc<dyn Bot>,
    pub(crate) access_key: Option<String>,
    pub(crate) options: BotOptions,
    pub(crate) stream_options: EventStreamOptions,
    pub(crate) uploader: Option<Arc<AttachmentUploader>>,
    pub(crate) shutdown: CancellationToken,
}

async fn landing_page() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// Routes a POST by its `type` field.
async fn dispatch(
    State(service): State<Arc<BotService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = auth::authenticate(service.access_key.as_deref(), &headers) {
        return response;
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("invalid request body: {error}")})),
            )
                .into_response();
        }
    };
    let request_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match request_type.as_str() {
        "query" => match parse_request::<QueryRequest>(value) {
            Ok(request) => handle_query(service, request).await,
            Err(response) => response,
        },
        "settings" => match parse_request::<SettingsRequest>(value) {
            Ok(request) => match service.bot.get_settings(request).await {
                Ok(settings) => Json(settings).into_response(),
                Err(error) => error_response(error),
            },
            Err(response) => response,
        },
        "report_feedback" => match parse_request::<ReportFeedbackRequest>(value) {
            Ok(request) => match service.bot.on_feedback(request).await {
                Ok(()) => Json(json!({})).into_response(),
                Err(error) => error_response(error),
            },
            Err(response) => response,
        },
        "report_error" => match parse_request::<ReportErrorRequest>(value) {
            Ok(request) => match service.bot.on_error(request).await {
                Ok(()) => Json(json!({})).into_response(),
                Err(error) => error_response(error),
            },
            Err(response) => response,
        },
        other => (
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({"error": format!("Unsupported request type: {other}")})),
        )
            .into_response(),
    }
}

async fn handle_query(service: Arc<BotService>, mut request: QueryRequest) -> Response {
    if service.options.should_insert_attachment_messages {
        if service.options.concat_attachments_to_message {
            warn!(
                "concat_attachments_to_message is deprecated and ignored because \
                 should_insert_attachment_messages is set"
            );
        }
        messages::insert_attachment_messages(&mut request);
    } else if service.options.concat_attachments_to_message {
        messages::concat_attachments_to_message(&mut request);
    }

    let settings = service
        .bot
        .get_settings(SettingsRequest {
            version: request.version.clone(),
        })
        .await
        .unwrap_or_default();
    if settings.enforce_author_role_alternation {
        request.query = messages::normalize_role_alternation(std::mem::take(&mut request.query));
    }

    let message_id = request.message_id.clone();
    let events = service.bot.get_response(request).await;
    streaming::stream_response(
        events,
        service.stream_options.clone(),
        service.uploader.clone(),
        message_id,
        service.shutdown.clone(),
    )
}

fn parse_request<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, Response> {
    serde_json::from_value(value).map_err(|error| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("invalid request: {error}")})),
        )
            .into_response()
    })
}

fn error_response(error: BotwireError) -> Response {
    let (status, message) = match &error {
        BotwireError::Http { status, message } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message.clone(),
        ),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    };
    (status, Json(json!({"error": message}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::EventStream;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl Bot for Silent {
        async fn get_response(&self, _request: QueryRequest) -> EventStream {
            Box::pin(futures::stream::empty())
        }
    }

    #[tokio::test]
    async fn duplicate_paths_are_rejected() {
        let result = BotAppBuilder::new()
            .allow_without_key(true)
            .bot("/bot", Silent)
            .bot("/bot", Silent)
            .build();
        match result {
            Err(BotwireError::InvalidParameter(message)) => {
                assert!(message.contains("duplicate"), "got {message}");
            }
            Err(other) => panic!("expected InvalidParameter, got {other:?}"),
            Ok(_) => panic!("expected InvalidParameter, got a router"),
        }
    }

    #[tokio::test]
    async fn top_level_key_rejected_with_multiple_bots() {
        let result = BotAppBuilder::new()
            .access_key("k".repeat(32))
            .bot("/a", Silent)
            .bot("/b", Silent)
            .build();
        assert!(matches!(result, Err(BotwireError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn missing_key_without_allowance_is_rejected() {
        let result = BotAppBuilder::new().bot("/bot", Silent).build();
        assert!(matches!(result, Err(BotwireError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn empty_builder_is_rejected() {
        assert!(matches!(
            BotAppBuilder::new().build(),
            Err(BotwireError::InvalidParameter(_))
        ));
    }
}
