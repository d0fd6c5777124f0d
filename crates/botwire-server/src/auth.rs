// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access-key resolution and request authentication.
//!
//! Key resolution runs once at app construction, in preference order:
//! explicit per-bot key, `POE_ACCESS_KEY`, deprecated explicit `api_key`,
//! deprecated `POE_API_KEY`. Request authentication distinguishes a
//! missing/malformed `Authorization` header (403) from a wrong key (401
//! with `WWW-Authenticate: Bearer`).

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use botwire_core::IDENTIFIER_LENGTH;
use serde_json::json;
use tracing::warn;

use crate::bot::BotOptions;

/// Environment variable holding the access key.
pub const ACCESS_KEY_ENV: &str = "POE_ACCESS_KEY";

/// Deprecated environment variable; accepted with a warning.
pub const API_KEY_ENV: &str = "POE_API_KEY";

/// Resolves the access key for one bot. Returns `None` when no source
/// provides one.
pub(crate) fn resolve_access_key(options: &BotOptions) -> Option<String> {
    if let Some(key) = non_empty(options.access_key.as_deref()) {
        return Some(check_length(key));
    }
    if let Some(key) = non_empty(std::env::var(ACCESS_KEY_ENV).ok().as_deref()) {
        return Some(check_length(key));
    }
    if let Some(key) = non_empty(options.api_key.as_deref()) {
        warn!("the api_key option is deprecated, set access_key instead");
        return Some(check_length(key));
    }
    if let Some(key) = non_empty(std::env::var(API_KEY_ENV).ok().as_deref()) {
        warn!("{API_KEY_ENV} is deprecated, set {ACCESS_KEY_ENV} instead");
        return Some(check_length(key));
    }
    None
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn check_length(key: String) -> String {
    if key.len() != IDENTIFIER_LENGTH {
        warn!(
            length = key.len(),
            "access key does not look like a platform key ({IDENTIFIER_LENGTH} characters)"
        );
    }
    key
}

/// Checks the `Authorization` header against the bot's key, if any.
pub(crate) fn authenticate(expected: Option<&str>, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Not authenticated"})),
        )
            .into_response());
    };

    if token != expected {
        return Err((
            StatusCode::UNAUTHORIZED,
            [("www-authenticate", "Bearer")],
            Json(json!({"error": "Invalid access key"})),
        )
            .into_response());
    }
    Ok(())
}
