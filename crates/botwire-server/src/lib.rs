// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server side of the bot protocol.
//!
//! Host one or more [`Bot`]s behind a single HTTP listener: each bot gets
//! a path serving a landing page on GET and the protocol's query,
//! settings, feedback, and error requests on POST. Query responses stream
//! as Server-Sent Events through the driver in [`streaming`], which runs
//! the heartbeat, honors send timeouts, and reacts to peer disconnect and
//! process shutdown.
//!
//! ```no_run
//! # use botwire_server::{BotAppBuilder, install_signal_handler, serve};
//! # async fn run(bot: impl botwire_server::Bot) -> Result<(), botwire_core::BotwireError> {
//! let shutdown = install_signal_handler();
//! let app = BotAppBuilder::new()
//!     .bot("/mybot", bot)
//!     .shutdown(shutdown.clone())
//!     .build()?;
//! let code = serve(app, "0.0.0.0:8080".parse().unwrap(), shutdown).await?;
//! std::process::exit(code);
//! # }
//! ```

pub mod app;
pub mod attachments;
pub mod auth;
pub mod bot;
pub mod messages;
pub mod serve;
pub mod streaming;

pub use app::BotAppBuilder;
pub use attachments::{AttachmentUploader, AttachmentUploadResponse, ATTACHMENT_UPLOAD_URL};
pub use auth::{ACCESS_KEY_ENV, API_KEY_ENV};
pub use bot::{Bot, BotOptions, BotReply, EventStream};
pub use serve::{install_signal_handler, serve};
pub use streaming::{stream_response, DataSender, EventStreamOptions, DEFAULT_PING};
