// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE record encoding.

use crate::event::{Separator, ServerSentEvent};

/// Splits on any line terminator (`\r\n`, `\r`, or `\n`).
fn split_terminators(value: &str) -> impl Iterator<Item = &str> {
    value.split("\r\n").flat_map(|part| {
        part.split(['\r', '\n'])
    })
}

/// Removes embedded line terminators so a single-line field value cannot
/// break record framing.
fn strip_terminators(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// Encodes one SSE record.
///
/// Comment lines come first, prefixed `": "`. The `id` and `event` values
/// have embedded terminators stripped; `data` is split on any terminator
/// with one `data:` line per fragment. The record is terminated by one
/// additional separator (the blank line).
pub fn encode_event(event: &ServerSentEvent, comments: &[&str], sep: Separator) -> String {
    let sep = sep.as_str();
    let mut out = String::new();

    for comment in comments {
        for fragment in split_terminators(comment) {
            out.push_str(": ");
            out.push_str(fragment);
            out.push_str(sep);
        }
    }
    if let Some(id) = &event.id {
        out.push_str("id: ");
        out.push_str(&strip_terminators(id));
        out.push_str(sep);
    }
    if let Some(name) = &event.event {
        out.push_str("event: ");
        out.push_str(&strip_terminators(name));
        out.push_str(sep);
    }
    if let Some(data) = &event.data {
        for fragment in split_terminators(data) {
            out.push_str("data: ");
            out.push_str(fragment);
            out.push_str(sep);
        }
    }
    if let Some(retry) = event.retry {
        out.push_str("retry: ");
        out.push_str(&retry.to_string());
        out.push_str(sep);
    }

    out.push_str(sep);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_event_and_data() {
        let event = ServerSentEvent::named("text", r#"{"text":"hi"}"#);
        let encoded = encode_event(&event, &[], Separator::CrLf);
        assert_eq!(
            encoded,
            "event: text\r\ndata: {\"text\":\"hi\"}\r\n\r\n"
        );
    }

    #[test]
    fn multiline_data_becomes_one_line_per_fragment() {
        let event = ServerSentEvent::data_only("a\nb\r\nc\rd");
        let encoded = encode_event(&event, &[], Separator::Lf);
        assert_eq!(encoded, "data: a\ndata: b\ndata: c\ndata: d\n\n");
    }

    #[test]
    fn id_and_event_terminators_are_stripped() {
        let event = ServerSentEvent {
            event: Some("na\r\nme".into()),
            id: Some("i\nd".into()),
            data: None,
            retry: None,
        };
        let encoded = encode_event(&event, &[], Separator::Lf);
        assert_eq!(encoded, "id: id\nevent: name\n\n");
    }

    #[test]
    fn comment_only_record() {
        let encoded = encode_event(
            &ServerSentEvent::default(),
            &["ping - 2026-01-01T00:00:00Z"],
            Separator::CrLf,
        );
        assert_eq!(encoded, ": ping - 2026-01-01T00:00:00Z\r\n\r\n");
    }

    #[test]
    fn retry_is_emitted_as_integer() {
        let event = ServerSentEvent {
            retry: Some(1500),
            ..ServerSentEvent::default()
        };
        let encoded = encode_event(&event, &[], Separator::Lf);
        assert_eq!(encoded, "retry: 1500\n\n");
    }

    #[test]
    fn field_order_is_comment_id_event_data_retry() {
        let event = ServerSentEvent {
            event: Some("update".into()),
            data: Some("x".into()),
            id: Some("7".into()),
            retry: Some(10),
        };
        let encoded = encode_event(&event, &["note"], Separator::Lf);
        assert_eq!(
            encoded,
            ": note\nid: 7\nevent: update\ndata: x\nretry: 10\n\n"
        );
    }

    #[test]
    fn empty_data_still_emits_one_line() {
        let event = ServerSentEvent::data_only("");
        let encoded = encode_event(&event, &[], Separator::Lf);
        assert_eq!(encoded, "data: \n\n");
    }
}
