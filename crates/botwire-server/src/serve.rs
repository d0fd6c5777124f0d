// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local runner with graceful shutdown.
//!
//! Installs SIGTERM/SIGINT handlers wired to a [`CancellationToken`],
//! serves the router, and drains connections for a bounded grace period
//! when a signal arrives.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use botwire_core::BotwireError;

/// How long in-flight responses get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Installs handlers for SIGTERM and SIGINT (Ctrl+C).
///
/// Returns a token cancelled when either signal is received. Register this
/// only at the outermost server entrypoint; pass the same token to
/// [`crate::BotAppBuilder::shutdown`] so streaming responses observe it.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(error) => {
                    warn!(error = %error, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT, initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Serves the router until `shutdown` fires, then drains for up to the
/// grace period. Returns the process exit code: 0 after a clean drain, 1
/// when the grace period expired and connections were cut.
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<i32, BotwireError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|error| BotwireError::InvalidParameter(format!(
            "failed to bind {addr}: {error}"
        )))?;
    info!("bot server listening on {addr}");

    let graceful = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { graceful.cancelled().await })
            .await
    });

    tokio::select! {
        result = &mut server => finish(result),
        _ = shutdown.cancelled() => {
            info!("draining connections");
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(result) => finish(result),
                Err(_) => {
                    warn!("grace period expired, forcing shutdown");
                    server.abort();
                    Ok(1)
                }
            }
        }
    }
}

fn finish(
    result: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<i32, BotwireError> {
    match result {
        Ok(Ok(())) => Ok(0),
        Ok(Err(error)) => Err(BotwireError::Transport {
            message: format!("server error: {error}"),
            retry_safe: false,
        }),
        Err(join_error) => Err(BotwireError::Transport {
            message: format!("server task failed: {join_error}"),
            retry_safe: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_handler_token_starts_uncancelled() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }

    #[tokio::test]
    async fn serve_returns_zero_after_clean_shutdown() {
        use crate::bot::{Bot, EventStream};
        use async_trait::async_trait;
        use botwire_core::types::QueryRequest;

        struct Silent;

        #[async_trait]
        impl Bot for Silent {
            async fn get_response(&self, _request: QueryRequest) -> EventStream {
                Box::pin(futures::stream::empty())
            }
        }

        let router = crate::BotAppBuilder::new()
            .allow_without_key(true)
            .bot("/bot", Silent)
            .build()
            .unwrap();
        let shutdown = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let task = tokio::spawn(serve(router, addr, shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let code = task.await.unwrap().unwrap();
        assert_eq!(code, 0);
    }
}
