// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side of the bot protocol.
//!
//! [`BotClient`] invokes remote bots over HTTP, consumes their SSE streams,
//! reports protocol violations over the back-channel, retries transient
//! failures, and optionally orchestrates tool-call rounds through local
//! [`ToolExecutable`]s.

pub mod client;
pub mod tools;

pub use client::{BotClient, StreamOptions, BASE_URL, DEFAULT_NUM_TRIES, DEFAULT_RETRY_SLEEP};
pub use tools::{ToolCallAccumulator, ToolExecutable, ToolOutput};
