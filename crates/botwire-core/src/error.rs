// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the botwire framework.

use thiserror::Error;

/// The primary error type used across the botwire crates.
#[derive(Debug, Error)]
pub enum BotwireError {
    /// Construction-time misuse (duplicate bot paths, inconsistent keys,
    /// bad separator). Never reaches the wire.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Handler-signalled HTTP fault. Translated to a response with the
    /// carried status code verbatim.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transient failure talking to a remote bot. Retried subject to the
    /// client retry policy.
    #[error("bot error: {message}")]
    Bot { message: String },

    /// Terminal failure talking to a remote bot (bad protocol framing,
    /// structural JSON errors in events, explicit `allow_retry=false`).
    /// Never retried.
    #[error("bot error (no retry): {message}")]
    BotNoRetry { message: String },

    /// The remote bot's response was not an event stream.
    #[error("invalid content type: expected text/event-stream, got {0}")]
    InvalidContentType(String),

    /// A settings response failed validation.
    #[error("invalid bot settings: {0}")]
    InvalidBotSettings(String),

    /// An attachment upload request failed. Surfaced as a final `error`
    /// event in the streaming response.
    #[error("attachment upload failed: {message}")]
    AttachmentUpload {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Underlying transport failure (connect, read, write). `retry_safe`
    /// is true for connection-aborted and read-timeout failures, the one
    /// class the client may retry even after a partial response.
    #[error("transport error: {message}")]
    Transport { message: String, retry_safe: bool },
}

impl BotwireError {
    /// Shorthand for a transient bot error.
    pub fn bot(message: impl Into<String>) -> Self {
        Self::Bot {
            message: message.into(),
        }
    }

    /// Shorthand for a terminal bot error.
    pub fn bot_no_retry(message: impl Into<String>) -> Self {
        Self::BotNoRetry {
            message: message.into(),
        }
    }

    /// Whether the client retry loop may attempt again after at least one
    /// event was already yielded on the current attempt.
    pub fn retry_safe_after_partial(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                retry_safe: true,
                ..
            }
        )
    }
}
