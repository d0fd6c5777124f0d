// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query preprocessing helpers.
//!
//! Attachment expansion turns parsed attachment content into prompt text
//! the bot can see; role-alternation merging collapses consecutive
//! same-role messages for models that require strict user/bot turns.

use std::collections::HashSet;

use botwire_core::types::{ProtocolMessage, QueryRequest, Role};
use tracing::warn;

/// Injects parsed attachment content as separate user messages ahead of
/// the final query message carrying the attachments.
pub fn insert_attachment_messages(request: &mut QueryRequest) {
    let Some(last) = request.query.last() else {
        return;
    };

    let mut inserted = Vec::new();
    for attachment in &last.attachments {
        let Some(parsed) = &attachment.parsed_content else {
            continue;
        };
        let content = if attachment.content_type.starts_with("image/") {
            format!(
                "I have attached an image ({name}). Assume you can see it. \
                 A description of the image follows:\n\n{parsed}",
                name = attachment.name
            )
        } else {
            format!(
                "The content of the attached file {name} follows:\n\n{parsed}",
                name = attachment.name
            )
        };
        inserted.push(ProtocolMessage::new(Role::User, content));
    }
    if inserted.is_empty() {
        return;
    }

    let position = request.query.len() - 1;
    request.query.splice(position..position, inserted);
}

/// Deprecated expansion path: appends parsed attachment content to the
/// final message body.
pub fn concat_attachments_to_message(request: &mut QueryRequest) {
    warn!("concat_attachments_to_message is deprecated, use attachment message insertion");
    let Some(last) = request.query.last_mut() else {
        return;
    };
    for attachment in &last.attachments {
        if let Some(parsed) = &attachment.parsed_content {
            last.content
                .push_str(&format!("\n\n{}: {parsed}", attachment.name));
        }
    }
}

/// Merges consecutive same-role messages. Content joins with a blank line;
/// attachments are carried over deduplicated by `url`, first occurrence
/// winning.
pub fn normalize_role_alternation(messages: Vec<ProtocolMessage>) -> Vec<ProtocolMessage> {
    let mut merged: Vec<ProtocolMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        match merged.last_mut() {
            Some(previous) if previous.role == message.role => {
                if !message.content.is_empty() {
                    if !previous.content.is_empty() {
                        previous.content.push_str("\n\n");
                    }
                    previous.content.push_str(&message.content);
                }
                previous.attachments.extend(message.attachments);
            }
            _ => merged.push(message),
        }
    }

    for message in &mut merged {
        let mut seen = HashSet::new();
        message
            .attachments
            .retain(|attachment| seen.insert(attachment.url.clone()));
    }
    merged
}
