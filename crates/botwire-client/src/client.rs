// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound bot client.
//!
//! [`BotClient`] POSTs a query to a remote bot endpoint, consumes its SSE
//! stream through the codec, and applies the per-event client state machine.
//! [`BotClient::stream_request`] layers the retry policy (and, when tools
//! and executables are supplied, the two-round tool orchestration) on top of
//! single-attempt [`BotClient::perform_query`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use botwire_core::types::{
    BotEvent, BotRequest, MetaResponse, PartialResponse, QueryRequest, ReportErrorRequest,
    SettingsRequest, SettingsResponse, ToolCallDefinition, ToolDefinition, ToolResultDefinition,
    MAX_EVENT_COUNT, MESSAGE_LENGTH_LIMIT, PROTOCOL_VERSION,
};
use botwire_core::BotwireError;
use botwire_sse::decode_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::tools::{self, ToolCallAccumulator, ToolExecutable, ToolOutput};

/// Default endpoint prefix for platform-hosted bots.
pub const BASE_URL: &str = "https://api.poe.com/bot/";

/// Default number of attempts made by [`BotClient::stream_request`].
pub const DEFAULT_NUM_TRIES: u32 = 2;

/// Default sleep between attempts.
pub const DEFAULT_RETRY_SLEEP: Duration = Duration::from_millis(500);

/// Options for one [`BotClient::stream_request`] call.
#[derive(Clone)]
pub struct StreamOptions {
    /// Sent as `Authorization: Bearer <api_key>` when present.
    pub api_key: Option<String>,
    pub num_tries: u32,
    pub retry_sleep: Duration,
    /// Tool definitions offered to the bot.
    pub tools: Vec<ToolDefinition>,
    /// Local executables; tool orchestration runs only when both `tools`
    /// and `executables` are non-empty.
    pub executables: Vec<Arc<dyn ToolExecutable>>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            num_tries: DEFAULT_NUM_TRIES,
            retry_sleep: DEFAULT_RETRY_SLEEP,
            tools: Vec::new(),
            executables: Vec::new(),
        }
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("num_tries", &self.num_tries)
            .field("retry_sleep", &self.retry_sleep)
            .field("tools", &self.tools.len())
            .field("executables", &self.executables.len())
            .finish()
    }
}

/// HTTP client for remote bot queries.
#[derive(Debug, Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for BotClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BotClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Overrides the endpoint prefix, e.g. to talk to a locally hosted bot.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn context(&self, bot_name: &str, api_key: Option<String>) -> QueryContext {
        QueryContext {
            http: self.http.clone(),
            url: format!("{}{}", self.base_url, bot_name),
            bot_name: bot_name.to_string(),
            api_key,
        }
    }

    /// Executes a single query attempt: one POST, one SSE stream, no
    /// retries and no tool rounds. The returned stream is finite and not
    /// restartable.
    pub fn perform_query(
        &self,
        request: QueryRequest,
        bot_name: &str,
        api_key: Option<String>,
    ) -> BoxStream<'static, Result<BotEvent, BotwireError>> {
        self.context(bot_name, api_key)
            .perform_query(request, None, None, None)
    }

    /// Queries a bot with retry, or with tool orchestration when both
    /// `tools` and `executables` are supplied in `options` (tool rounds
    /// run as single attempts).
    pub fn stream_request(
        &self,
        request: QueryRequest,
        bot_name: &str,
        options: StreamOptions,
    ) -> BoxStream<'static, Result<BotEvent, BotwireError>> {
        let ctx = self.context(bot_name, options.api_key.clone());
        if !options.tools.is_empty() && !options.executables.is_empty() {
            return stream_with_tools(ctx, request, options);
        }
        ctx.stream_with_retries(
            request,
            options.num_tries,
            options.retry_sleep,
            None,
            None,
            None,
        )
    }

    /// Fetches a bot's settings response.
    pub async fn fetch_settings(
        &self,
        bot_name: &str,
        api_key: Option<&str>,
    ) -> Result<SettingsResponse, BotwireError> {
        let request = BotRequest::Settings(SettingsRequest {
            version: PROTOCOL_VERSION.to_string(),
        });
        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, bot_name))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotwireError::bot(format!(
                "Bot {bot_name} returned HTTP {status}"
            )));
        }
        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|error| {
            BotwireError::InvalidBotSettings(format!("invalid settings response: {error}"))
        })
    }

    /// Drives [`BotClient::stream_request`] to completion and returns the
    /// accumulated text, honoring replace semantics and skipping suggested
    /// replies.
    pub async fn get_final_response(
        &self,
        request: QueryRequest,
        bot_name: &str,
        options: StreamOptions,
    ) -> Result<String, BotwireError> {
        let mut stream = self.stream_request(request, bot_name, options);
        let mut chunks: Vec<String> = Vec::new();
        while let Some(event) = stream.next().await {
            if let BotEvent::Partial(partial) = event? {
                if partial.is_suggested_reply || partial.data.is_some() {
                    continue;
                }
                if partial.is_replace_response {
                    chunks.clear();
                }
                chunks.push(partial.text);
            }
        }
        let text = chunks.concat();
        if text.chars().count() > MESSAGE_LENGTH_LIMIT {
            return Err(BotwireError::bot_no_retry(
                "Bot returned too much text in response",
            ));
        }
        Ok(text)
    }
}

/// Per-query state shared between the attempt stream and the back-channel.
#[derive(Clone)]
struct QueryContext {
    http: reqwest::Client,
    url: String,
    bot_name: String,
    api_key: Option<String>,
}

impl QueryContext {
    /// Wraps [`QueryContext::perform_query`] with the retry policy:
    /// `BotNoRetry` is never retried; any other failure is retried only
    /// when no event was yielded yet on the current attempt, or when the
    /// transport error is connection-aborted/read-timeout.
    fn stream_with_retries(
        &self,
        request: QueryRequest,
        num_tries: u32,
        retry_sleep: Duration,
        tools: Option<Vec<ToolDefinition>>,
        tool_calls: Option<Vec<ToolCallDefinition>>,
        tool_results: Option<Vec<ToolResultDefinition>>,
    ) -> BoxStream<'static, Result<BotEvent, BotwireError>> {
        let ctx = self.clone();
        let num_tries = num_tries.max(1);
        Box::pin(async_stream::stream! {
            for attempt in 0..num_tries {
                if attempt > 0 {
                    tokio::time::sleep(retry_sleep).await;
                }
                let mut yielded = false;
                let mut failure = None;
                {
                    let mut attempt_stream = ctx.perform_query(
                        request.clone(),
                        tools.clone(),
                        tool_calls.clone(),
                        tool_results.clone(),
                    );
                    while let Some(item) = attempt_stream.next().await {
                        match item {
                            Ok(event) => {
                                yielded = true;
                                yield Ok(event);
                            }
                            Err(error) => {
                                failure = Some(error);
                                break;
                            }
                        }
                    }
                }
                let Some(error) = failure else {
                    return;
                };
                if matches!(error, BotwireError::BotNoRetry { .. }) {
                    yield Err(error);
                    return;
                }
                if (!yielded || error.retry_safe_after_partial()) && attempt + 1 < num_tries {
                    warn!(
                        bot = %ctx.bot_name,
                        attempt = attempt + 1,
                        error = %error,
                        "query attempt failed, retrying"
                    );
                    continue;
                }
                warn!(bot = %ctx.bot_name, error = %error, "query failed");
                yield Err(BotwireError::bot(format!(
                    "Error communicating with bot {}",
                    ctx.bot_name
                )));
                return;
            }
        })
    }

    /// One POST plus the client state machine over the decoded SSE stream.
    fn perform_query(
        &self,
        request: QueryRequest,
        tools: Option<Vec<ToolDefinition>>,
        tool_calls: Option<Vec<ToolCallDefinition>>,
        tool_results: Option<Vec<ToolResultDefinition>>,
    ) -> BoxStream<'static, Result<BotEvent, BotwireError>> {
        let ctx = self.clone();
        let tools_in_play = tools.is_some();
        Box::pin(async_stream::stream! {
            let payload = match build_payload(&request, tools, tool_calls, tool_results) {
                Ok(payload) => payload,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            let response = match ctx.send_query(&payload).await {
                Ok(response) => response,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            let bytes = response.bytes_stream().map(|item| item.map_err(transport_error));
            let events = decode_stream(bytes);
            futures::pin_mut!(events);

            // Running text chunks; replace_response resets them. Used for
            // the terminal no-text check.
            let mut chunks: Vec<String> = Vec::new();
            let mut reported = false;
            let mut event_count = 0usize;

            while let Some(item) = events.next().await {
                let sse = match item {
                    Ok(sse) => sse,
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                };
                event_count += 1;
                if event_count > MAX_EVENT_COUNT {
                    yield Err(BotwireError::bot_no_retry(format!(
                        "Bot produced more than {MAX_EVENT_COUNT} events"
                    )));
                    return;
                }
                let first_event = event_count == 1;
                let name = sse.event.as_deref().unwrap_or("message").to_string();
                let data = sse.data.unwrap_or_default();

                match name.as_str() {
                    "ping" => continue,
                    "text" | "replace_response" | "suggested_reply" => {
                        let text = match parse_text_payload(&name, &data) {
                            Ok(text) => text,
                            Err(error) => {
                                yield Err(error);
                                return;
                            }
                        };
                        match name.as_str() {
                            "text" => {
                                chunks.push(text.clone());
                                yield Ok(BotEvent::Partial(PartialResponse::text(text)));
                            }
                            "replace_response" => {
                                chunks.clear();
                                chunks.push(text.clone());
                                yield Ok(BotEvent::Partial(PartialResponse::replace(text)));
                            }
                            _ => {
                                yield Ok(BotEvent::Partial(PartialResponse::suggested_reply(
                                    text,
                                )));
                            }
                        }
                    }
                    "json" => match serde_json::from_str::<Value>(&data) {
                        Ok(Value::Object(map)) => {
                            yield Ok(BotEvent::Partial(PartialResponse::data(map)));
                        }
                        Ok(other) => {
                            yield Err(BotwireError::bot_no_retry(format!(
                                "Expected a JSON object in 'json' event, got: {other}"
                            )));
                            return;
                        }
                        Err(error) => {
                            yield Err(BotwireError::bot_no_retry(format!(
                                "Malformed JSON in 'json' event: {error}"
                            )));
                            return;
                        }
                    },
                    "meta" => {
                        // Authoritative only as the first event of the stream.
                        if !first_event {
                            continue;
                        }
                        match ctx.parse_meta(&data).await {
                            Some(meta) => {
                                yield Ok(BotEvent::Meta(meta));
                            }
                            None => reported = true,
                        }
                    }
                    "error" => {
                        let value = match serde_json::from_str::<Value>(&data) {
                            Ok(value) => value,
                            Err(error) => {
                                yield Err(BotwireError::bot_no_retry(format!(
                                    "Malformed JSON in 'error' event: {error}"
                                )));
                                return;
                            }
                        };
                        let allow_retry = value
                            .get("allow_retry")
                            .and_then(Value::as_bool)
                            .unwrap_or(true);
                        if allow_retry {
                            yield Err(BotwireError::bot(data));
                        } else {
                            yield Err(BotwireError::bot_no_retry(data));
                        }
                        return;
                    }
                    "done" => {
                        if chunks.is_empty() && !reported && !tools_in_play {
                            ctx.report_error("Bot returned no text in response", Value::Null)
                                .await;
                        }
                        return;
                    }
                    other => {
                        let name_trunc: String = other.chars().take(100).collect();
                        let data_trunc: String = data.chars().take(500).collect();
                        ctx.report_error(
                            &format!("Unknown event type: {name_trunc}"),
                            json!({ "event_data": data_trunc }),
                        )
                        .await;
                        reported = true;
                    }
                }
            }

            ctx.report_error("Bot exited without sending 'done' event", Value::Null)
                .await;
        })
    }

    async fn send_query(&self, payload: &Value) -> Result<reqwest::Response, BotwireError> {
        let mut builder = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotwireError::bot(format!(
                "Bot {} returned HTTP {status}",
                self.bot_name
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(BotwireError::InvalidContentType(content_type));
        }
        Ok(response)
    }

    /// Validates a `meta` payload. Returns `None` when a field failed
    /// validation and the violation was reported over the back-channel.
    async fn parse_meta(&self, data: &str) -> Option<MetaResponse> {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(_) => {
                self.report_error("Invalid JSON in 'meta' event", Value::Null)
                    .await;
                return None;
            }
        };

        let linkify = value.get("linkify").cloned().unwrap_or(Value::Bool(false));
        let Some(linkify) = linkify.as_bool() else {
            self.report_error(
                &format!("Invalid linkify value in 'meta' event: {linkify}"),
                Value::Null,
            )
            .await;
            return None;
        };

        let suggested = value
            .get("suggested_replies")
            .cloned()
            .unwrap_or(Value::Bool(false));
        let Some(suggested_replies) = suggested.as_bool() else {
            self.report_error(
                &format!("Invalid suggested_replies value in 'meta' event: {suggested}"),
                Value::Null,
            )
            .await;
            return None;
        };

        let content_type = value
            .get("content_type")
            .cloned()
            .unwrap_or_else(|| Value::String("text/markdown".to_string()));
        let Some(content_type) = content_type.as_str().map(str::to_string) else {
            self.report_error(
                &format!("Invalid content_type value in 'meta' event: {content_type}"),
                Value::Null,
            )
            .await;
            return None;
        };

        let refetch_settings = value
            .get("refetch_settings")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Some(MetaResponse {
            partial: PartialResponse::default(),
            linkify,
            suggested_replies,
            content_type,
            refetch_settings,
        })
    }

    /// Best-effort protocol-violation report to the same endpoint. Failures
    /// are logged, never raised.
    async fn report_error(&self, message: &str, metadata: Value) {
        let request = BotRequest::ReportError(ReportErrorRequest {
            version: PROTOCOL_VERSION.to_string(),
            message: message.to_string(),
            metadata,
        });
        let mut builder = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    bot = %self.bot_name,
                    status = %response.status(),
                    message,
                    "bot rejected error report"
                );
            }
            Ok(_) => {}
            Err(error) => {
                warn!(bot = %self.bot_name, error = %error, message, "failed to report error to bot");
            }
        }
    }
}

/// Two-round tool orchestration: collect calls, execute, re-query.
///
/// Each round is one bare `perform_query` attempt; the retry wrapper
/// applies to plain streams only. A retried round would re-dispatch
/// already-executed tool calls.
fn stream_with_tools(
    ctx: QueryContext,
    request: QueryRequest,
    options: StreamOptions,
) -> BoxStream<'static, Result<BotEvent, BotwireError>> {
    let StreamOptions {
        tools, executables, ..
    } = options;
    Box::pin(async_stream::stream! {
        // Round 1: run to completion, gathering tool-call deltas from
        // `json` events. Nothing is forwarded upstream.
        let mut accumulator = ToolCallAccumulator::new();
        {
            let mut round_one = ctx.perform_query(
                request.clone(),
                Some(tools.clone()),
                None,
                None,
            );
            while let Some(item) = round_one.next().await {
                match item {
                    Ok(BotEvent::Partial(partial)) => {
                        if let Some(data) = &partial.data {
                            accumulator.feed(data);
                        }
                    }
                    Ok(_) => {}
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                }
            }
        }
        let tool_calls = accumulator.finish();
        if tool_calls.is_empty() {
            debug!(bot = %ctx.bot_name, "bot requested no tool calls");
            return;
        }

        // Execution: dispatch each call in order; status partials are
        // forwarded upstream live, terminal results are collected.
        let map = tools::executable_map(&executables);
        let mut tool_results = Vec::new();
        for call in &tool_calls {
            let Some(executable) = map.get(&call.function.name) else {
                continue;
            };
            let arguments: Value = match serde_json::from_str(&call.function.arguments) {
                Ok(value) => value,
                Err(error) => {
                    warn!(
                        tool = %call.function.name,
                        error = %error,
                        "tool call arguments are not valid JSON, skipping"
                    );
                    continue;
                }
            };
            let mut outputs = executable.call(arguments);
            while let Some(output) = outputs.next().await {
                match output {
                    ToolOutput::Status(partial) => {
                        yield Ok(BotEvent::Partial(partial));
                    }
                    ToolOutput::Done(value) => {
                        match tools::tool_result(call, &value) {
                            Ok(result) => tool_results.push(result),
                            Err(error) => warn!(
                                tool = %call.function.name,
                                error = %error,
                                "tool result is not serializable, skipping"
                            ),
                        }
                        break;
                    }
                }
            }
        }

        // Round 2: final answer, forwarded verbatim.
        let mut round_two = ctx.perform_query(
            request,
            Some(tools),
            Some(tool_calls),
            Some(tool_results),
        );
        while let Some(item) = round_two.next().await {
            yield item;
        }
    })
}

/// Serializes the query body, folding in the optional tool fields.
fn build_payload(
    request: &QueryRequest,
    tools: Option<Vec<ToolDefinition>>,
    tool_calls: Option<Vec<ToolCallDefinition>>,
    tool_results: Option<Vec<ToolResultDefinition>>,
) -> Result<Value, BotwireError> {
    let mut body = serde_json::to_value(BotRequest::Query(request.clone()))
        .map_err(|error| BotwireError::bot(format!("failed to serialize query: {error}")))?;
    if let Some(object) = body.as_object_mut() {
        if let Some(tools) = tools {
            object.insert("tools".to_string(), serde_json::json!(tools));
        }
        if let Some(tool_calls) = tool_calls {
            object.insert("tool_calls".to_string(), serde_json::json!(tool_calls));
        }
        if let Some(tool_results) = tool_results {
            object.insert("tool_results".to_string(), serde_json::json!(tool_results));
        }
    }
    Ok(body)
}

/// Requires a JSON object with a string `text` field; anything else is a
/// structural protocol error.
fn parse_text_payload(event: &str, data: &str) -> Result<String, BotwireError> {
    let value: Value = serde_json::from_str(data).map_err(|error| {
        BotwireError::bot_no_retry(format!("Malformed JSON in '{event}' event: {error}"))
    })?;
    value
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            BotwireError::bot_no_retry(format!("Expected string 'text' field in '{event}' event"))
        })
}

/// Maps a reqwest failure into [`BotwireError::Transport`], marking
/// connection-aborted and read-timeout failures retry-safe.
fn transport_error(error: reqwest::Error) -> BotwireError {
    let retry_safe = error.is_timeout() || io_connection_lost(&error);
    BotwireError::Transport {
        message: error.to_string(),
        retry_safe,
    }
}

fn io_connection_lost(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        source = inner.source();
    }
    false
}
