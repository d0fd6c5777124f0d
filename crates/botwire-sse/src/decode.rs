// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE record decoding: a per-line accumulator plus a byte-stream adapter
//! that handles line splitting across chunk boundaries.

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;

use crate::event::ServerSentEvent;

/// Stateful SSE decoder. Feed it one line at a time; a blank line
/// dispatches the accumulated record.
///
/// `last_event_id` survives dispatch, so later records inherit the most
/// recent `id` until the wire replaces it.
#[derive(Debug, Default)]
pub struct EventDecoder {
    event: Option<String>,
    data: Option<String>,
    retry: Option<u64>,
    last_event_id: String,
    saw_field: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one line (without its terminator). Returns an event when
    /// the line is blank and at least one field was accumulated.
    pub fn feed_line(&mut self, line: &str) -> Option<ServerSentEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            // A line without a colon is a field with an empty value.
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event = Some(value.to_string());
                self.saw_field = true;
            }
            "data" => {
                match &mut self.data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                }
                self.saw_field = true;
            }
            "id" => {
                // Ids containing a NUL are discarded.
                if !value.contains('\0') {
                    self.last_event_id = value.to_string();
                    self.saw_field = true;
                }
            }
            "retry" => {
                // Unparseable retry values are ignored.
                if let Ok(retry) = value.parse::<u64>() {
                    self.retry = Some(retry);
                    self.saw_field = true;
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<ServerSentEvent> {
        if !self.saw_field {
            return None;
        }
        let event = ServerSentEvent {
            event: Some(self.event.take().unwrap_or_else(|| "message".to_string())),
            data: self.data.take(),
            id: if self.last_event_id.is_empty() {
                None
            } else {
                Some(self.last_event_id.clone())
            },
            retry: self.retry.take(),
        };
        self.saw_field = false;
        Some(event)
    }
}

/// Adapts a byte stream into a stream of decoded SSE records.
///
/// Accepts `\r\n`, `\r`, and `\n` terminators, including terminators split
/// across chunk boundaries: a chunk-final `\r` is held back until the next
/// chunk shows whether it heads a `\r\n` pair. Transport errors pass
/// through and end the stream.
pub fn decode_stream<S, E>(input: S) -> impl Stream<Item = Result<ServerSentEvent, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    async_stream::stream! {
        futures::pin_mut!(input);
        let mut decoder = EventDecoder::new();
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = input.next().await {
            match chunk {
                Ok(bytes) => {
                    buf.extend_from_slice(&bytes);
                    for event in drain_lines(&mut buf, &mut decoder, false) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        for event in drain_lines(&mut buf, &mut decoder, true) {
            yield Ok(event);
        }
    }
}

/// Extracts complete lines from `buf` and feeds them to the decoder. At
/// end of input a chunk-final `\r` counts as a terminator; an unterminated
/// final line is fed too (it can never dispatch without its blank line).
fn drain_lines(buf: &mut Vec<u8>, decoder: &mut EventDecoder, eof: bool) -> Vec<ServerSentEvent> {
    let mut events = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < buf.len() {
        match buf[i] {
            b'\n' => {
                if let Some(event) = feed(decoder, &buf[start..i]) {
                    events.push(event);
                }
                i += 1;
                start = i;
            }
            b'\r' => {
                if i + 1 == buf.len() && !eof {
                    // Terminator may continue in the next chunk.
                    break;
                }
                if let Some(event) = feed(decoder, &buf[start..i]) {
                    events.push(event);
                }
                i += 1;
                if i < buf.len() && buf[i] == b'\n' {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }

    if eof && start < buf.len() {
        if let Some(event) = feed(decoder, &buf[start..]) {
            events.push(event);
        }
        start = buf.len();
    }
    buf.drain(..start);
    events
}

fn feed(decoder: &mut EventDecoder, line: &[u8]) -> Option<ServerSentEvent> {
    decoder.feed_line(&String::from_utf8_lossy(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn decode_chunks(chunks: &[&str]) -> Vec<ServerSentEvent> {
        let items: Vec<Result<Bytes, Infallible>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect();
        let stream = decode_stream(futures::stream::iter(items));
        futures::executor::block_on(async {
            stream.map(|r| r.unwrap()).collect::<Vec<_>>().await
        })
    }

    #[test]
    fn decodes_named_event() {
        let events = decode_chunks(&["event: text\ndata: {\"text\":\"hi\"}\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("text"));
        assert_eq!(events[0].data.as_deref(), Some("{\"text\":\"hi\"}"));
    }

    #[test]
    fn absent_event_name_decodes_as_message() {
        let events = decode_chunks(&["data: hello\n\n"]);
        assert_eq!(events[0].event.as_deref(), Some("message"));
    }

    #[test]
    fn comment_lines_produce_no_event() {
        let events = decode_chunks(&[": ping - now\n\n", ":another comment\n\n"]);
        assert!(events.is_empty());
    }

    #[test]
    fn empty_record_produces_no_event() {
        let events = decode_chunks(&["\n\n\n"]);
        assert!(events.is_empty());
    }

    #[test]
    fn multiline_data_joins_with_newline() {
        let events = decode_chunks(&["data: a\ndata: b\n\n"]);
        assert_eq!(events[0].data.as_deref(), Some("a\nb"));
    }

    #[test]
    fn space_after_colon_is_stripped_once() {
        let events = decode_chunks(&["data:  two spaces\n\n"]);
        assert_eq!(events[0].data.as_deref(), Some(" two spaces"));

        let events = decode_chunks(&["data:none\n\n"]);
        assert_eq!(events[0].data.as_deref(), Some("none"));
    }

    #[test]
    fn last_event_id_survives_dispatch() {
        let events = decode_chunks(&["id: 7\ndata: a\n\ndata: b\n\n"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[1].id.as_deref(), Some("7"));
    }

    #[test]
    fn nul_id_is_discarded() {
        let events = decode_chunks(&["id: a\0b\ndata: x\n\n"]);
        assert_eq!(events[0].id, None);
    }

    #[test]
    fn bad_retry_is_ignored() {
        let events = decode_chunks(&["retry: soon\ndata: x\n\n"]);
        assert_eq!(events[0].retry, None);

        let events = decode_chunks(&["retry: 250\ndata: x\n\n"]);
        assert_eq!(events[0].retry, Some(250));
    }

    #[test]
    fn crlf_split_across_chunks() {
        let events = decode_chunks(&["data: a\r", "\ndata: b\r\n\r", "\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some("a\nb"));
    }

    #[test]
    fn bare_cr_terminates_lines() {
        let events = decode_chunks(&["data: a\r\r"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some("a"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let events = decode_chunks(&["custom: x\ndata: y\n\n"]);
        assert_eq!(events[0].data.as_deref(), Some("y"));
        assert_eq!(events[0].event.as_deref(), Some("message"));
    }

    #[test]
    fn unterminated_final_record_is_dropped() {
        let events = decode_chunks(&["data: complete\n\ndata: partial"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some("complete"));
    }

    #[test]
    fn transport_error_ends_stream() {
        #[derive(Debug, PartialEq)]
        struct Boom;
        let items: Vec<Result<Bytes, Boom>> = vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err(Boom),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let stream = decode_stream(futures::stream::iter(items));
        let collected =
            futures::executor::block_on(async { stream.collect::<Vec<_>>().await });
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }
}
