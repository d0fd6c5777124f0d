// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core protocol types and errors for the botwire framework.
//!
//! This crate defines the wire-level data model of the bot protocol (query,
//! settings, feedback, and error requests; streamed response events; tool
//! call shapes) and the shared [`BotwireError`] type. The client and server
//! crates build on these definitions.

pub mod case;
pub mod error;
pub mod types;

pub use error::BotwireError;
pub use types::{
    Attachment, BotEvent, BotRequest, ContentType, ErrorResponse, FeedbackType,
    FunctionCallDefinition, FunctionDefinition, Identifier, MessageFeedback, MetaResponse,
    PartialResponse, ProtocolMessage, QueryRequest, ReportErrorRequest, ReportFeedbackRequest,
    Role, SettingsRequest, SettingsResponse, ToolCallDefinition, ToolDefinition,
    ToolResultDefinition, IDENTIFIER_LENGTH, MAX_EVENT_COUNT, MESSAGE_LENGTH_LIMIT,
    PROTOCOL_VERSION,
};
