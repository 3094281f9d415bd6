//! HTTP server.
//!
//! Serves a [`Router`] over HTTP/1.1 with hyper. Each connection runs on its
//! own tokio task.

use crate::config::ServerConfig;
use crate::router::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Server startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Binds a listener for `config`.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let address = config.address();
    TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind { address, source })
}

/// Serves `router` until Ctrl-C.
pub async fn serve(router: Router, config: &ServerConfig) -> Result<(), ServerError> {
    let listener = bind(config).await?;
    serve_with_shutdown(listener, router, shutdown_signal()).await
}

/// Serves `router` on `listener` until `shutdown` completes.
///
/// Connections already accepted keep running on their own tasks.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let router = Arc::new(router);
    info!("Listening on http://{}", listener.local_addr()?);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(%err, "failed to accept connection");
                        continue;
                    }
                };
                debug!(%peer, "connection accepted");

                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let service = service_fn(move |request: Request<Incoming>| {
                        let router = Arc::clone(&router);
                        async move { Ok::<_, Infallible>(router.handle(request).await) }
                    });
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        if !err.is_incomplete_message() {
                            error!(%peer, "Connection error: {:?}", err);
                        }
                    }
                });
            }
        }
    }
}

/// Completes on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
