// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol data model shared by the client and server crates.
//!
//! Field names are snake_case on the wire; the serde attributes on each
//! type pin the wire spelling so the in-process names stay free.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version sent on all client-originated requests.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Upper bound on the final accumulated response text.
pub const MESSAGE_LENGTH_LIMIT: usize = 10_000;

/// Soft guard on the number of events a client accepts from one stream.
pub const MAX_EVENT_COUNT: usize = 1_000;

/// Exact length of a platform access key.
pub const IDENTIFIER_LENGTH: usize = 32;

/// Opaque ASCII identifier assigned by the platform.
pub type Identifier = String;

/// Author of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Bot,
}

/// Rendering hint for message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "text/markdown")]
    TextMarkdown,
    #[serde(rename = "text/plain")]
    TextPlain,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::TextMarkdown
    }
}

/// User reaction attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Like,
    Dislike,
}

/// A single feedback entry on a protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFeedback {
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A file attached to a protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub content_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_content: Option<String>,
}

/// One message in a conversation. Ordering is significant and duplicates
/// are permitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub message_id: Identifier,
    #[serde(default)]
    pub feedback: Vec<MessageFeedback>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

impl ProtocolMessage {
    /// Bare message with the given role and content; everything else takes
    /// protocol defaults.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            content_type: ContentType::default(),
            timestamp: 0,
            message_id: String::new(),
            feedback: Vec::new(),
            attachments: Vec::new(),
            sender_id: None,
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

/// A `query` request: the conversation so far plus sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub version: String,
    pub query: Vec<ProtocolMessage>,
    pub user_id: Identifier,
    pub conversation_id: Identifier,
    pub message_id: Identifier,
    /// Opaque platform string, preserved verbatim.
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub skip_system_prompt: bool,
    #[serde(default)]
    pub logit_bias: HashMap<String, f64>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

/// A `settings` request. Carries nothing beyond the protocol version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsRequest {
    pub version: String,
}

/// A `report_feedback` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFeedbackRequest {
    pub version: String,
    pub message_id: Identifier,
    pub user_id: Identifier,
    pub conversation_id: Identifier,
    pub feedback_type: FeedbackType,
}

/// A `report_error` request: the back-channel for protocol violations a
/// client discovered while consuming a bot's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportErrorRequest {
    pub version: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Inbound request union, tagged by the wire-level `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotRequest {
    Query(QueryRequest),
    Settings(SettingsRequest),
    ReportFeedback(ReportFeedbackRequest),
    ReportError(ReportErrorRequest),
}

/// Bot capabilities and platform behavior toggles returned from a
/// `settings` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub server_bot_dependencies: HashMap<String, u32>,
    #[serde(default)]
    pub allow_attachments: bool,
    #[serde(default)]
    pub introduction_message: String,
    #[serde(default = "default_true")]
    pub expand_text_attachments: bool,
    #[serde(default)]
    pub enable_image_comprehension: bool,
    #[serde(default)]
    pub enforce_author_role_alternation: bool,
    #[serde(default)]
    pub enable_multi_bot_chat_prompting: bool,
    /// Deprecated: accepted on the wire, ignored by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_clear_window_secs: Option<u64>,
    /// Deprecated: accepted on the wire, ignored by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_user_context_clear: Option<bool>,
}

impl Default for SettingsResponse {
    fn default() -> Self {
        Self {
            server_bot_dependencies: HashMap::new(),
            allow_attachments: false,
            introduction_message: String::new(),
            expand_text_attachments: true,
            enable_image_comprehension: false,
            enforce_author_role_alternation: false,
            enable_multi_bot_chat_prompting: false,
            context_clear_window_secs: None,
            allow_user_context_clear: None,
        }
    }
}

/// One streamed response fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialResponse {
    pub text: String,
    /// Arbitrary JSON payload; emitted as a `json` event on the wire.
    pub data: Option<serde_json::Map<String, Value>>,
    pub raw_response: Option<Value>,
    pub full_prompt: Option<String>,
    pub request_id: Option<String>,
    pub is_suggested_reply: bool,
    pub is_replace_response: bool,
}

impl PartialResponse {
    /// A plain appending text fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A fragment that replaces all previously accumulated text.
    pub fn replace(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_replace_response: true,
            ..Self::default()
        }
    }

    /// A suggested follow-up reply for the user.
    pub fn suggested_reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_suggested_reply: true,
            ..Self::default()
        }
    }

    /// A data-only fragment, emitted as a `json` event.
    pub fn data(data: serde_json::Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

/// One-shot stream header conveying linkification, suggested-replies, and
/// content type. Authoritative only as the first event on a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaResponse {
    pub partial: PartialResponse,
    pub linkify: bool,
    pub suggested_replies: bool,
    pub content_type: String,
    pub refetch_settings: bool,
}

impl Default for MetaResponse {
    fn default() -> Self {
        Self {
            partial: PartialResponse::default(),
            linkify: true,
            suggested_replies: true,
            content_type: "text/markdown".to_string(),
            refetch_settings: false,
        }
    }
}

/// A streamed error. `allow_retry=false` marks the failure terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub partial: PartialResponse,
    pub allow_retry: bool,
    pub error_type: Option<String>,
}

impl ErrorResponse {
    /// Terminal error carrying the given message text.
    pub fn no_retry(text: impl Into<String>) -> Self {
        Self {
            partial: PartialResponse::text(text),
            allow_retry: false,
            error_type: None,
        }
    }
}

/// The tagged response-event union. `MetaResponse` and `ErrorResponse`
/// specialise `PartialResponse` by composition; consumers dispatch on the
/// variant.
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    Partial(PartialResponse),
    Meta(MetaResponse),
    Error(ErrorResponse),
}

impl From<PartialResponse> for BotEvent {
    fn from(partial: PartialResponse) -> Self {
        Self::Partial(partial)
    }
}

impl From<MetaResponse> for BotEvent {
    fn from(meta: MetaResponse) -> Self {
        Self::Meta(meta)
    }
}

impl From<ErrorResponse> for BotEvent {
    fn from(error: ErrorResponse) -> Self {
        Self::Error(error)
    }
}

/// A callable tool offered to a bot, mirroring the OpenAI function-calling
/// shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Name, description, and JSON-schema parameters of a tool function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

/// A fully aggregated tool invocation requested by a bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionCallDefinition,
}

/// The function half of a tool call: name plus JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDefinition {
    pub name: String,
    pub arguments: String,
}

/// Result of executing one tool call, fed back in the second query round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultDefinition {
    pub role: String,
    pub name: String,
    pub tool_call_id: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_defaults() {
        let json = r#"{
            "version": "1.0",
            "type": "query",
            "query": [{"role": "user", "content": "hi"}],
            "user_id": "u1",
            "conversation_id": "c1",
            "message_id": "m1"
        }"#;
        let request: BotRequest = serde_json::from_str(json).unwrap();
        let BotRequest::Query(query) = request else {
            panic!("expected query variant");
        };
        assert_eq!(query.temperature, 0.7);
        assert!(!query.skip_system_prompt);
        assert!(query.logit_bias.is_empty());
        assert!(query.stop_sequences.is_empty());
        assert_eq!(query.metadata, "");
        assert_eq!(query.query[0].content_type, ContentType::TextMarkdown);
    }

    #[test]
    fn request_union_routes_by_type_tag() {
        let feedback: BotRequest = serde_json::from_str(
            r#"{
                "version": "1.0",
                "type": "report_feedback",
                "message_id": "m1",
                "user_id": "u1",
                "conversation_id": "c1",
                "feedback_type": "like"
            }"#,
        )
        .unwrap();
        assert!(matches!(feedback, BotRequest::ReportFeedback(_)));

        let error: BotRequest = serde_json::from_str(
            r#"{"version": "1.0", "type": "report_error", "message": "boom"}"#,
        )
        .unwrap();
        let BotRequest::ReportError(report) = error else {
            panic!("expected report_error variant");
        };
        assert_eq!(report.message, "boom");
    }

    #[test]
    fn unknown_request_type_fails_to_parse() {
        let result: Result<BotRequest, _> =
            serde_json::from_str(r#"{"version": "1.0", "type": "subscribe"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn settings_response_defaults_and_deprecated_fields() {
        let settings: SettingsResponse = serde_json::from_str(
            r#"{
                "context_clear_window_secs": 60,
                "allow_user_context_clear": true
            }"#,
        )
        .unwrap();
        assert!(settings.expand_text_attachments);
        assert!(!settings.allow_attachments);
        // Deprecated fields are accepted but never acted on.
        assert_eq!(settings.context_clear_window_secs, Some(60));

        let default = SettingsResponse::default();
        let json = serde_json::to_value(&default).unwrap();
        assert_eq!(json["expand_text_attachments"], Value::Bool(true));
        assert!(json.get("server_bot_dependencies").is_none());
    }

    #[test]
    fn protocol_message_round_trips_with_feedback() {
        let mut message = ProtocolMessage::new(Role::User, "hello");
        message.feedback.push(MessageFeedback {
            feedback_type: FeedbackType::Dislike,
            reason: Some("too vague".into()),
        });

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""role":"user""#));
        assert!(json.contains(r#""type":"dislike""#));

        let back: ProtocolMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn content_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ContentType::TextMarkdown).unwrap(),
            r#""text/markdown""#
        );
        assert_eq!(
            serde_json::to_string(&ContentType::TextPlain).unwrap(),
            r#""text/plain""#
        );
    }

    #[test]
    fn partial_response_constructors() {
        let replace = PartialResponse::replace("X");
        assert!(replace.is_replace_response);
        assert!(!replace.is_suggested_reply);

        let suggested = PartialResponse::suggested_reply("try this");
        assert!(suggested.is_suggested_reply);

        let mut map = serde_json::Map::new();
        map.insert("k".into(), Value::from(1));
        let data = PartialResponse::data(map);
        assert!(data.text.is_empty());
        assert!(data.data.is_some());
    }

    #[test]
    fn tool_call_serializes_openai_shape() {
        let call = ToolCallDefinition {
            id: "call_1".into(),
            tool_type: "function".into(),
            function: FunctionCallDefinition {
                name: "add".into(),
                arguments: r#"{"a":1,"b":2}"#.into(),
            },
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "add");
    }
}
