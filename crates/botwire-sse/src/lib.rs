// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events codec.
//!
//! Implements the SSE line format both directions: [`encode_event`] renders
//! a record with a configurable line separator, [`EventDecoder`] accumulates
//! wire lines into records, and [`decode_stream`] adapts a byte stream
//! (chunked arbitrarily) into decoded records. The decoder follows SSE
//! semantics: absent event names decode as `message`, `last_event_id` is
//! retained across records, NUL-bearing ids and unparseable retry values
//! are dropped.

pub mod decode;
pub mod encode;
pub mod event;

pub use decode::{decode_stream, EventDecoder};
pub use encode::encode_event;
pub use event::{Separator, ServerSentEvent};
